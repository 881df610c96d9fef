use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Replication topology the cluster is running under.
///
/// Determines which validity predicate the failover engine uses
/// (`VALID_BACKEND_RAW` vs `VALID_BACKEND`, spec §4.H step 4) and whether
/// primary discovery (§4.G) is meaningful at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicationMode {
    /// No cross-node coordination; every backend is independent.
    #[default]
    Raw,
    /// Master-slave with streaming replication. Primary discovery and
    /// follow-master degeneration (§4.H step 7) apply.
    StreamingReplication,
    /// Master-slave with a non-streaming submode (e.g. external trigger
    /// file based replication). Primary discovery does not apply.
    MasterSlaveOther,
}

impl ReplicationMode {
    /// Whether this mode is a streaming-replication topology (§4.G, §4.H.5/7).
    pub fn is_streaming_replication(self) -> bool {
        matches!(self, ReplicationMode::StreamingReplication)
    }

    /// Whether backends are validated under `VALID_BACKEND_RAW` (raw mode)
    /// rather than `VALID_BACKEND` (§4.H step 4, §4.H step 1).
    pub fn is_raw(self) -> bool {
        matches!(self, ReplicationMode::Raw)
    }
}

impl FromStr for ReplicationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "raw" => Ok(ReplicationMode::Raw),
            "streaming_replication" => Ok(ReplicationMode::StreamingReplication),
            "master_slave_other" => Ok(ReplicationMode::MasterSlaveOther),
            other => Err(format!("unknown replication mode: {other}")),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_from_str() {
        assert_eq!(
            ReplicationMode::from_str("streaming_replication").unwrap(),
            ReplicationMode::StreamingReplication
        );
        assert!(ReplicationMode::from_str("bogus").is_err());
    }

    #[test]
    fn test_predicates() {
        assert!(ReplicationMode::Raw.is_raw());
        assert!(ReplicationMode::StreamingReplication.is_streaming_replication());
        assert!(!ReplicationMode::MasterSlaveOther.is_streaming_replication());
    }
}
