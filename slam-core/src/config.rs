//! Configuration for the SLAM effect engine.
//!
//! Maps directly to `slam.toml`. Every field has a serde default, so an empty
//! file yields the stock behaviour.

use serde::{Deserialize, Serialize};

/// Top-level SLAM configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlamConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Update engine tuning.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Save / load settings.
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl SlamConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `SlamError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        toml::from_str(toml_str).map_err(|e| crate::SlamError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General system settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit JSON log lines instead of the human-readable format.
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Update engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Mean of the normal distribution used to back-date a fresh entity's
    /// first update (absolute value is taken).
    #[serde(default = "default_0_5")]
    pub seed_jitter_mean: f64,
    /// Standard deviation of the first-update back-dating distribution.
    #[serde(default = "default_2_0")]
    pub seed_jitter_std_dev: f64,
    /// Fixed RNG seed. `None` seeds from entropy.
    #[serde(default)]
    pub rng_seed: Option<u64>,
    /// Number of advisory lock flags exposed to callers.
    #[serde(default = "default_3")]
    pub lock_count: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed_jitter_mean: 0.5,
            seed_jitter_std_dev: 2.0,
            rng_seed: None,
            lock_count: 3,
        }
    }
}

/// Save / load configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Maximum tolerated drift between stored and recomputed arousal before
    /// the mismatch is logged.
    #[serde(default = "default_0_5_f32")]
    pub arousal_tolerance: f32,
    /// Group values with a larger magnitude are treated as corrupted.
    #[serde(default = "default_10000")]
    pub max_group_magnitude: f32,
    /// Use WAL mode for the save store.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// Number of save store backups to keep.
    #[serde(default = "default_3_u32")]
    pub backup_count: u32,
    /// Store a CRC-32 next to every record.
    #[serde(default = "default_true")]
    pub checksum_enabled: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            arousal_tolerance: 0.5,
            max_group_magnitude: 10_000.0,
            wal_mode: true,
            backup_count: 3,
            checksum_enabled: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_0_5() -> f64 { 0.5 }
fn default_2_0() -> f64 { 2.0 }
fn default_0_5_f32() -> f32 { 0.5 }
fn default_10000() -> f32 { 10_000.0 }
fn default_3() -> usize { 3 }
fn default_3_u32() -> u32 { 3 }
