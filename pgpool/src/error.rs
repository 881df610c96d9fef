use std::path::PathBuf;

use thiserror::Error;

/// Top-level error taxonomy (§7). Fatal-bootstrap variants cause the
/// binary to log and exit non-zero; everything else is handled closer
/// to where it occurs and never constructed here.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("configuration error: {0}")]
    Config(#[from] pgpool_config::ConfigError),

    #[error("failed to bind listening socket: {0}")]
    SocketBind(#[source] std::io::Error),

    #[error("failed to install signal handlers: {0}")]
    Signals(#[source] std::io::Error),

    #[error("PID file `{0}` exists and its process ({1}) is still running")]
    AlreadyRunning(PathBuf, i32),

    #[error("PID file I/O error on `{0}`: {1}")]
    PidFile(PathBuf, #[source] std::io::Error),

    #[error("daemonization failed: {0}")]
    Daemonize(#[source] std::io::Error),

    #[error("no running instance found (PID file `{0}` missing or stale)")]
    NotRunning(PathBuf),
}
