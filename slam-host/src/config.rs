//! Host-side configuration loading.
//!
//! The plugin must start even with a broken or missing `slam.toml`, so every
//! failure here falls back to defaults with a warning.

use std::path::Path;

use slam_core::SlamConfig;
use tracing::warn;

/// File name looked up next to the plugin binary.
pub const CONFIG_FILE_NAME: &str = "slam.toml";

/// Read `path`, or return defaults when it is absent or invalid.
#[must_use]
pub fn load_or_default(path: Option<&Path>) -> SlamConfig {
    let Some(path) = path else {
        return SlamConfig::default();
    };
    if !path.exists() {
        return SlamConfig::default();
    }
    match SlamConfig::from_file(path) {
        Ok(config) => config,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring invalid config, using defaults");
            SlamConfig::default()
        }
    }
}
