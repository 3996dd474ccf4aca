//! Error types for hwpoll
//!
//! Errors only surface at construction and I/O boundaries (configuration,
//! provider scans, counter construction, state persistence). Reading a value
//! never fails: an unreadable metric is `None` or falls back to its last
//! plausible reading.

use std::io;
use thiserror::Error;

/// Result type alias for hwpoll operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Facility not available on this platform or OS image
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Sensor provider failure (scan or update)
    #[error("Sensor provider error: {0}")]
    Provider(String),

    /// Performance counter failure
    #[error("Counter error: {0}")]
    Counter(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Parse(err.to_string())
    }
}
