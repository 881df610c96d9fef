use std::fs::read_to_string;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::backend::BackendConfig;
use crate::error::ConfigError;
use crate::general::GeneralConfig;
use crate::watchdog::WatchdogConfig;
use crate::MAX_NUM_BACKENDS;

/// Top-level configuration file shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub watchdog: WatchdogConfig,
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.general.validate()?;
        self.general.check();

        if self.backends.is_empty() {
            return Err(ConfigError::NoBackends);
        }
        if self.backends.len() > MAX_NUM_BACKENDS {
            return Err(ConfigError::TooManyBackends(
                self.backends.len(),
                MAX_NUM_BACKENDS,
            ));
        }

        Ok(())
    }
}

/// A `Config` paired with the path it was loaded from, so reload (SIGHUP)
/// can re-read the same file (§4.E, §6 `reload`).
#[derive(Debug, Clone)]
pub struct ConfigAndUsers {
    pub config: Config,
    pub config_path: PathBuf,
}

impl ConfigAndUsers {
    /// Loads the config file at `path`. A missing file is not fatal: falls
    /// back to `Config::default()` with a warning, mirroring
    /// `pgdog-config`'s own `ConfigAndUsers::load`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();

        let config = match read_to_string(&path) {
            Ok(contents) => {
                let config: Config =
                    toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.clone(), e))?;
                info!(path = %path.display(), "loaded configuration");
                config
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "config file not found, using defaults");
                Config::default()
            }
        };

        config.validate()?;

        Ok(Self {
            config,
            config_path: path,
        })
    }

    /// Re-reads the config file at the same path (§6 `reload`).
    pub fn reload(&self) -> Result<Config, ConfigError> {
        let contents =
            read_to_string(&self.config_path).map_err(|e| ConfigError::Io(self.config_path.clone(), e))?;
        let config: Config =
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(self.config_path.clone(), e))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let result = ConfigAndUsers::load("/nonexistent/path/pgpool.toml");
        // No backends configured by default -> validation fails, which is
        // expected; the *read* itself must not error.
        assert!(matches!(result, Err(ConfigError::NoBackends)));
    }

    #[test]
    fn test_load_valid_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [general]
            num_init_children = 4

            [[backends]]
            hostname = "db0"
            port = 5432
            "#
        )
        .unwrap();

        let loaded = ConfigAndUsers::load(file.path()).unwrap();
        assert_eq!(loaded.config.general.num_init_children, 4);
        assert_eq!(loaded.config.backends.len(), 1);
    }

    #[test]
    fn test_too_many_backends() {
        let mut config = Config::default();
        config.backends = (0..200)
            .map(|i| BackendConfig {
                hostname: format!("db{i}"),
                port: 5432,
                data_directory: String::new(),
                weight: 1.0,
                application_name: None,
                disallow_to_failover: false,
            })
            .collect();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TooManyBackends(200, MAX_NUM_BACKENDS))
        ));
    }
}
