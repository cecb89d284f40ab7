//! Error types for the Subgate service.

use thiserror::Error;

/// Main error type for Subgate operations.
///
/// All variants are startup-time failures. Once the gate is serving,
/// request outcomes are expressed as HTTP responses instead.
#[derive(Error, Debug)]
pub enum SubgateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The upstream URL is missing, unparseable or not http(s)
    #[error("Invalid upstream url: {0}")]
    InvalidUpstream(String),

    /// The limit window is not a positive duration
    #[error("Invalid limit window: {0}")]
    InvalidWindow(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Subgate operations.
pub type Result<T> = std::result::Result<T, SubgateError>;
