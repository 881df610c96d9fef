use serde::{Deserialize, Serialize};

/// Static, config-file-derived description of one PostgreSQL backend node
/// (§3 "Backend descriptor"). Index into the containing `Vec` is the
/// backend's stable lifetime index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub hostname: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub data_directory: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub application_name: Option<String>,
    /// If true, this backend is never the target of an automatic failover
    /// (§3 `DISALLOW_TO_FAILOVER`, §4.F, §4.H step 1).
    #[serde(default)]
    pub disallow_to_failover: bool,
}

fn default_port() -> u16 {
    5432
}

fn default_weight() -> f64 {
    1.0
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_deserialize_defaults() {
        let cfg: BackendConfig = toml::from_str(
            r#"
            hostname = "db0.internal"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.port, 5432);
        assert_eq!(cfg.weight, 1.0);
        assert!(!cfg.disallow_to_failover);
    }
}
