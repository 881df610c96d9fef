//! Backend descriptor (spec §3).

use pgpool_config::BackendConfig;
use std::fmt;

/// Status of one backend as tracked by the supervisor (§3).
///
/// `UNUSED` slots are ignored by every algorithm; `DOWN` backends remain
/// in the array but are neither health-checked nor eligible as
/// master/primary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum BackendStatus {
    Unused,
    ConnectWait,
    Up,
    Down,
}

impl fmt::Display for BackendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use BackendStatus::*;
        match self {
            Unused => write!(f, "unused"),
            ConnectWait => write!(f, "connect wait"),
            Up => write!(f, "up"),
            Down => write!(f, "down"),
        }
    }
}

impl BackendStatus {
    /// `VALID_BACKEND`: eligible as master/primary outside raw mode.
    pub fn is_valid(self) -> bool {
        matches!(self, BackendStatus::ConnectWait | BackendStatus::Up)
    }

    /// `VALID_BACKEND_RAW`: eligible as master in raw mode. Raw mode has
    /// no connection pooling handshake, so a backend is valid the moment
    /// it isn't explicitly down or unused.
    pub fn is_valid_raw(self) -> bool {
        matches!(self, BackendStatus::ConnectWait | BackendStatus::Up)
    }

    /// Eligible for health-checking (§4.F: "For each backend with status
    /// in {CONNECT_WAIT, UP}").
    pub fn is_health_checkable(self) -> bool {
        matches!(self, BackendStatus::ConnectWait | BackendStatus::Up)
    }
}

/// One configured backend: static config plus supervisor-owned mutable
/// status and failover flag bits (§3 "Backend descriptor").
#[derive(Debug, Clone)]
pub struct Backend {
    pub index: usize,
    pub hostname: String,
    pub port: u16,
    pub data_directory: String,
    pub weight: f64,
    pub status: BackendStatus,
    pub disallow_to_failover: bool,
}

impl Backend {
    pub fn from_config(index: usize, config: &BackendConfig, status: BackendStatus) -> Self {
        Self {
            index,
            hostname: config.hostname.clone(),
            port: config.port,
            data_directory: config.data_directory.clone(),
            weight: config.weight,
            status,
            disallow_to_failover: config.disallow_to_failover,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_status_predicates() {
        assert!(BackendStatus::Up.is_valid());
        assert!(BackendStatus::ConnectWait.is_valid());
        assert!(!BackendStatus::Down.is_valid());
        assert!(!BackendStatus::Unused.is_valid());
    }
}
