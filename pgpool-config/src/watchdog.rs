use serde::{Deserialize, Serialize};

/// Configuration for the watchdog lock client (§4.I).
///
/// The peer daemon's wire protocol is out of scope (§1); this only
/// carries the bit that decides whether the core consults a real
/// watchdog or falls back to the no-op implementation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchdogConfig {
    #[serde(default)]
    pub use_watchdog: bool,
}
