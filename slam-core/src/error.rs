//! Error types for the SLAM effect engine.

use thiserror::Error;

/// Top-level error type for all SLAM operations.
#[derive(Error, Debug)]
pub enum SlamError {
    /// An effect id or group index is outside the valid range.
    #[error("Index out of range: {index} (len: {len})")]
    OutOfRange {
        /// The offending index.
        index: i64,
        /// Number of valid slots at the time of the call.
        len: usize,
    },

    /// The entity reference was null or could not be resolved.
    #[error("Invalid entity reference")]
    InvalidEntity,

    /// An internal invariant was violated. Indicates a defect, not bad input.
    #[error("Invariant violation: {0}")]
    Logic(String),

    /// A save record could not be decoded.
    #[error("Corrupted save data: {0}")]
    Corrupted(String),

    /// SQLite persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SlamError {
    /// Shorthand for an [`SlamError::OutOfRange`] built from a signed index.
    #[must_use]
    pub fn out_of_range(index: impl Into<i64>, len: usize) -> Self {
        Self::OutOfRange {
            index: index.into(),
            len,
        }
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, SlamError>;
