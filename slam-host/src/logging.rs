//! `tracing` subscriber bootstrap.
//!
//! `RUST_LOG` wins over the configured level when set.

use slam_core::config::GeneralConfig;
use slam_core::error::{Result, SlamError};
use tracing_subscriber::EnvFilter;

/// Filter from `RUST_LOG`, falling back to `config.log_level`.
///
/// # Errors
/// Returns [`SlamError::Config`] when the configured level does not parse.
pub fn build_filter(config: &GeneralConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.log_level)
        .map_err(|e| SlamError::Config(format!("log level {:?}: {e}", config.log_level)))
}

/// Install the global subscriber: compact text, or JSON lines when
/// `config.json_logs` is set.
///
/// # Errors
/// Returns [`SlamError::Config`] for a bad level or when a global
/// subscriber is already installed.
pub fn init_logging(config: &GeneralConfig) -> Result<()> {
    let filter = build_filter(config)?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    let installed = if config.json_logs {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
    installed.map_err(|e| SlamError::Config(format!("logging already initialised: {e}")))?;
    tracing::info!(level = %config.log_level, json = config.json_logs, "Logging initialised");
    Ok(())
}
