use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use crate::error::ConfigError;
use crate::mode::ReplicationMode;
use crate::MIN_REQUEST_QUEUE_SIZE;

/// Scalar, cluster-wide settings (§3, §4.E, §4.F, §4.G, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneralConfig {
    #[serde(default = "default_listen_addresses")]
    pub listen_addresses: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_socket_dir")]
    pub socket_dir: String,

    #[serde(default = "default_pcp_port")]
    pub pcp_port: u16,
    #[serde(default = "default_socket_dir")]
    pub pcp_socket_dir: String,

    #[serde(default = "default_num_init_children")]
    pub num_init_children: usize,

    #[serde(default)]
    pub replication_mode: ReplicationMode,

    #[serde(default)]
    pub use_watchdog: bool,

    /// §4.D: bounded FIFO capacity, must be >= MIN_REQUEST_QUEUE_SIZE.
    #[serde(default = "default_request_queue_size")]
    pub request_queue_size: usize,

    #[serde(default = "default_health_check_period_secs")]
    pub health_check_period_secs: u64,
    #[serde(default)]
    pub health_check_timeout_secs: u64,
    #[serde(default = "default_health_check_user")]
    pub health_check_user: String,
    #[serde(default)]
    pub health_check_password: Option<String>,
    #[serde(default = "default_health_check_max_retries")]
    pub health_check_max_retries: u32,
    #[serde(default = "default_health_check_retry_delay_secs")]
    pub health_check_retry_delay_secs: u64,
    /// §4.F: in parallel mode the retry ceiling becomes `num_backends` and
    /// the inter-retry sleep becomes `health_check_period / num_backends`.
    #[serde(default)]
    pub parallel_mode: bool,

    /// 0 = indefinite (§4.G).
    #[serde(default)]
    pub search_primary_node_timeout_secs: u64,

    #[serde(default)]
    pub failover_command: String,
    #[serde(default)]
    pub failback_command: String,
    #[serde(default)]
    pub follow_master_command: String,

    #[serde(default = "default_logdir")]
    pub logdir: String,
    #[serde(default = "default_pid_file_name")]
    pub pid_file_name: String,

    /// §2 component K: read-only cluster-status HTTP endpoint. `None`
    /// disables it.
    #[serde(default)]
    pub status_http_port: Option<u16>,
}

fn default_listen_addresses() -> String {
    "localhost".into()
}

fn default_port() -> u16 {
    9999
}

fn default_socket_dir() -> String {
    "/tmp".into()
}

fn default_pcp_port() -> u16 {
    9898
}

fn default_num_init_children() -> usize {
    32
}

fn default_request_queue_size() -> usize {
    10
}

fn default_health_check_period_secs() -> u64 {
    0
}

fn default_health_check_user() -> String {
    "postgres".into()
}

fn default_health_check_max_retries() -> u32 {
    0
}

fn default_health_check_retry_delay_secs() -> u64 {
    1
}

fn default_logdir() -> String {
    "/tmp".into()
}

fn default_pid_file_name() -> String {
    "pgpool.pid".into()
}

impl GeneralConfig {
    pub fn health_check_period(&self) -> Duration {
        Duration::from_secs(self.health_check_period_secs)
    }

    pub fn health_check_timeout(&self) -> Option<Duration> {
        if self.health_check_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.health_check_timeout_secs))
        }
    }

    pub fn health_check_retry_delay(&self) -> Duration {
        Duration::from_secs(self.health_check_retry_delay_secs)
    }

    pub fn search_primary_node_timeout(&self) -> Duration {
        Duration::from_secs(self.search_primary_node_timeout_secs)
    }

    /// Non-fatal sanity checks, logged but never failing config load
    /// (mirrors `pgdog-config::core::Config::check`'s warn-only posture).
    pub fn check(&self) {
        if self.num_init_children == 0 {
            warn!("num_init_children is 0; no workers will be supervised");
        }
        if self.replication_mode.is_streaming_replication() && self.follow_master_command.is_empty()
        {
            warn!("streaming_replication mode configured without a follow_master_command");
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_queue_size < MIN_REQUEST_QUEUE_SIZE {
            return Err(ConfigError::QueueTooSmall(
                MIN_REQUEST_QUEUE_SIZE,
                self.request_queue_size,
            ));
        }
        Ok(())
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        toml::from_str("").expect("GeneralConfig defaults must parse")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = GeneralConfig::default();
        assert_eq!(cfg.port, 9999);
        assert_eq!(cfg.num_init_children, 32);
        assert_eq!(cfg.request_queue_size, 10);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_queue_too_small() {
        let mut cfg = GeneralConfig::default();
        cfg.request_queue_size = 1;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::QueueTooSmall(10, 1))
        ));
    }
}
