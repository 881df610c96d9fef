//! A deliberately tiny PostgreSQL wire-protocol client.
//!
//! The teacher's `backend::Server` (`pgdog/src/backend/server.rs`, 3000+
//! lines) implements the full client-facing wire protocol: prepared
//! statements, pooler-mode bookkeeping, TLS, replication streaming. None
//! of that belongs to the supervisor core (spec.md §1 excludes wire
//! protocol handling, TLS init). What the health checker (§4.F) and
//! primary discovery (§4.G) actually need is narrower: connect, run one
//! query, read one row, disconnect — so `probe` reimplements only that
//! slice, in the same message-oriented shape as the teacher's client.

pub mod probe;

pub use probe::{Probe, ProbeError};
