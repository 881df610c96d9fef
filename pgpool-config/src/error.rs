use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading `{0}`: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("TOML parse error in `{0}`: {1}")]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("backend index {0} exceeds MAX_NUM_BACKENDS ({1})")]
    TooManyBackends(usize, usize),

    #[error("request_queue_size must be at least {0}, got {1}")]
    QueueTooSmall(usize, usize),

    #[error("no backends configured")]
    NoBackends,
}
