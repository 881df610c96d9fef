//! Primary-node discovery for streaming replication (spec §4.G).

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::net::Probe;
use pgpool_config::GeneralConfig;

use super::cluster::ClusterState;

pub struct PrimaryDiscovery {
    cluster: Arc<ClusterState>,
    config: GeneralConfig,
}

impl PrimaryDiscovery {
    pub fn new(cluster: Arc<ClusterState>, config: GeneralConfig) -> Self {
        Self { cluster, config }
    }

    /// One sweep: the first backend (in index order) that answers
    /// `pg_is_in_recovery() = f` is the primary. `-1` if none qualifies
    /// (§4.G).
    pub async fn find_primary_once(&self) -> i32 {
        let candidates: Vec<(usize, String, u16)> = self.cluster.with_backends(|backends| {
            backends
                .iter()
                .filter(|b| b.status.is_valid())
                .map(|b| (b.index, b.hostname.clone(), b.port))
                .collect()
        });

        for (index, hostname, port) in candidates {
            match self.is_in_recovery(&hostname, port).await {
                Ok(false) => return index as i32,
                Ok(true) => continue,
                Err(err) => {
                    warn!(index, error = %err, "primary discovery probe failed, skipping node");
                    continue;
                }
            }
        }

        -1
    }

    async fn is_in_recovery(&self, hostname: &str, port: u16) -> Result<bool, String> {
        let user = self.config.health_check_user.clone();
        let password = self.config.health_check_password.clone();
        let timeout = self.config.health_check_timeout().unwrap_or(Duration::from_secs(30));

        let mut probe = Probe::connect(hostname, port, &user, password.as_deref(), "postgres", timeout)
            .await
            .map_err(|e| e.to_string())?;

        let row = probe
            .simple_query("SELECT pg_is_in_recovery()")
            .await
            .map_err(|e| e.to_string())?;

        Ok(row.as_deref() == Some("t"))
    }

    /// §4.G "A wrapping routine retries once per second for up to
    /// `search_primary_node_timeout` seconds (0 = indefinite)."
    pub async fn find_primary_repeatedly(&self) -> i32 {
        let deadline_secs = self.config.search_primary_node_timeout_secs;
        let start = Instant::now();

        loop {
            let found = self.find_primary_once().await;
            if found >= 0 {
                return found;
            }

            if deadline_secs != 0 && start.elapsed() >= Duration::from_secs(deadline_secs) {
                return -1;
            }

            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::supervisor::backend::{Backend, BackendStatus};

    fn backend(index: usize, status: BackendStatus) -> Backend {
        Backend {
            index,
            hostname: format!("db{index}"),
            port: 5432,
            data_directory: String::new(),
            weight: 1.0,
            status,
            disallow_to_failover: false,
        }
    }

    #[tokio::test]
    async fn test_find_primary_once_returns_minus_one_with_no_backends() {
        let cluster = Arc::new(ClusterState::new(
            pgpool_config::ReplicationMode::StreamingReplication,
            vec![backend(0, BackendStatus::Down)],
            10,
        ));
        let discovery = PrimaryDiscovery::new(cluster, GeneralConfig::default());
        assert_eq!(discovery.find_primary_once().await, -1);
    }
}
