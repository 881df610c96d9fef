//! Health-check engine (spec §4.F).

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::net::Probe;
use pgpool_config::GeneralConfig;

use super::backend::BackendStatus;
use super::cluster::{ClusterState, RecoveryState};
use super::queue::RequestKind;

const FIRST_DATABASE: &str = "postgres";
const FALLBACK_DATABASE: &str = "template1";

/// Retry-failure logging cadence: log the first failure and then every
/// `LOG_EVERY_NTH_RETRY`th one, rather than every single attempt. A
/// tight `health_check_retry_delay_secs` against a down backend would
/// otherwise flood the log at the same rate as the retry loop.
const LOG_EVERY_NTH_RETRY: u32 = 5;

pub struct HealthChecker {
    cluster: Arc<ClusterState>,
    config: GeneralConfig,
}

impl HealthChecker {
    pub fn new(cluster: Arc<ClusterState>, config: GeneralConfig) -> Self {
        Self { cluster, config }
    }

    /// §4.F "In parallel mode the retry ceiling is NUM_BACKENDS".
    fn max_retries(&self, num_backends: usize) -> u32 {
        if self.config.parallel_mode {
            num_backends as u32
        } else {
            self.config.health_check_max_retries
        }
    }

    /// §4.F "the inter-retry sleep is health_check_period / NUM_BACKENDS".
    fn retry_delay(&self, num_backends: usize) -> Duration {
        if self.config.parallel_mode && num_backends > 0 {
            self.config.health_check_period() / num_backends as u32
        } else {
            self.config.health_check_retry_delay()
        }
    }

    /// Runs one sweep over every health-checkable backend (§4.F).
    /// Skipped entirely while `in_recovery != Init`.
    pub async fn run_sweep(&self) {
        if self.cluster.in_recovery() != RecoveryState::Init {
            return;
        }

        let num_backends = self.cluster.num_backends();
        let candidates: Vec<(usize, bool)> = self.cluster.with_backends(|backends| {
            backends
                .iter()
                .filter(|b| b.status.is_health_checkable())
                .map(|b| (b.index, b.disallow_to_failover))
                .collect()
        });

        for (index, disallow_to_failover) in candidates {
            self.check_one(index, disallow_to_failover, num_backends).await;
        }
    }

    async fn check_one(&self, index: usize, disallow_to_failover: bool, num_backends: usize) {
        let max_retries = self.max_retries(num_backends);
        let delay = self.retry_delay(num_backends);
        let mut retrycnt = 0u32;

        loop {
            match self.probe_node(index).await {
                Ok(()) => return,
                Err(err) => {
                    if retrycnt == 0 || retrycnt.is_multiple_of(LOG_EVERY_NTH_RETRY) {
                        warn!(index, error = %err, retrycnt, "health check failed");
                    }
                    self.cluster.counters.record_health_check_failure();

                    if retrycnt < max_retries {
                        retrycnt += 1;
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    if disallow_to_failover {
                        info!(index, "health check exhausted retries but node disallows failover, suppressing NODE_DOWN");
                        return;
                    }

                    info!(index, "health check exhausted retries, enqueueing NODE_DOWN");
                    self.cluster.queue.enqueue(RequestKind::NodeDown, vec![index]);
                    return;
                }
            }
        }
    }

    /// §4.F steps 1-3: connect with `postgres`, retry once with
    /// `template1` on the first failure only, respecting the configured
    /// timeout.
    async fn probe_node(&self, index: usize) -> Result<(), String> {
        let (hostname, port) = match self
            .cluster
            .with_backends(|backends| backends.get(index).map(|b| (b.hostname.clone(), b.port)))
        {
            Some(v) => v,
            None => return Err("unknown backend index".into()),
        };

        let timeout = self
            .config
            .health_check_timeout()
            .unwrap_or(Duration::from_secs(30));
        let user = self.config.health_check_user.clone();
        let password = self.config.health_check_password.clone();

        let first = self
            .connect_attempt(&hostname, port, &user, password.as_deref(), FIRST_DATABASE, timeout)
            .await;

        match first {
            Ok(()) => Ok(()),
            Err(_) => {
                self.connect_attempt(
                    &hostname,
                    port,
                    &user,
                    password.as_deref(),
                    FALLBACK_DATABASE,
                    timeout,
                )
                .await
            }
        }
    }

    async fn connect_attempt(
        &self,
        hostname: &str,
        port: u16,
        user: &str,
        password: Option<&str>,
        database: &str,
        timeout: Duration,
    ) -> Result<(), String> {
        Probe::connect(hostname, port, user, password, database, timeout)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

/// Whether a backend should even be considered by the health checker
/// (§4.F "For each backend with status in {CONNECT_WAIT, UP}").
pub fn is_checkable(status: BackendStatus) -> bool {
    status.is_health_checkable()
}

#[cfg(test)]
mod test {
    use super::*;

    fn config(parallel_mode: bool, max_retries: u32, period_secs: u64) -> GeneralConfig {
        let mut cfg = GeneralConfig::default();
        cfg.parallel_mode = parallel_mode;
        cfg.health_check_max_retries = max_retries;
        cfg.health_check_period_secs = period_secs;
        cfg
    }

    fn checker(cfg: GeneralConfig) -> HealthChecker {
        let cluster = Arc::new(ClusterState::new(
            pgpool_config::ReplicationMode::Raw,
            vec![],
            10,
        ));
        HealthChecker::new(cluster, cfg)
    }

    #[test]
    fn test_parallel_mode_retry_ceiling_is_num_backends() {
        let checker = checker(config(true, 0, 10));
        assert_eq!(checker.max_retries(4), 4);
    }

    #[test]
    fn test_non_parallel_mode_uses_configured_retries() {
        let checker = checker(config(false, 7, 10));
        assert_eq!(checker.max_retries(4), 7);
    }

    #[test]
    fn test_parallel_mode_retry_delay_divides_period() {
        let checker = checker(config(true, 0, 10));
        assert_eq!(checker.retry_delay(5), Duration::from_secs(2));
    }
}
