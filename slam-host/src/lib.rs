//! # slam-host: script-facing boundary for SLAM
//!
//! Wraps the `slam-core` engine in the call surface a game's scripting
//! runtime sees.
//!
//! ```text
//! ┌────────────────────────────────────┐
//! │        game scripts / host         │
//! │  ┌──────────────────────────────┐  │
//! │  │          slam-host           │  │
//! │  │  Bindings   serialization    │  │
//! │  │      │            │          │  │
//! │  │      ▼            ▼          │  │
//! │  │  ┌────────────────────────┐  │  │
//! │  │  │       slam-core        │  │  │
//! │  │  └────────────────────────┘  │  │
//! │  └──────────────────────────────┘  │
//! └────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `bindings`: every native call, errors absorbed into defaults
//! - `serialization`: save / load / revert callbacks
//! - `config`: lenient `slam.toml` loading
//! - `logging`: `tracing-subscriber` setup

#![deny(clippy::unwrap_used)]
#![warn(missing_docs)]

pub mod bindings;
pub mod config;
pub mod logging;
pub mod serialization;

use std::path::Path;

pub use bindings::Bindings;

/// Load configuration, install logging and build the bindings.
///
/// A subscriber that is already installed is left in place.
///
/// # Errors
/// Returns [`slam_core::SlamError::Config`] for an invalid engine
/// configuration.
pub fn bootstrap(config_path: Option<&Path>) -> slam_core::Result<Bindings> {
    let config = config::load_or_default(config_path);
    if let Err(e) = logging::init_logging(&config.general) {
        tracing::debug!(error = %e, "Keeping existing subscriber");
    }
    Bindings::new(config)
}
