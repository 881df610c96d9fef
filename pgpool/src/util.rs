//! Small shared helpers.

/// Version string reported by `--version` (§6).
pub fn version() -> String {
    format!("v{}", env!("CARGO_PKG_VERSION"))
}
