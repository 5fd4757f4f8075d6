//! Error types for the Nodegate service.

use thiserror::Error;

/// Main error type for Nodegate operations.
///
/// A rejected admission is not an error; it is reported through
/// [`Admission`](crate::admission::Admission).
#[derive(Error, Debug)]
pub enum NodegateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors raised while layering configuration sources
    #[error("Settings error: {0}")]
    Settings(#[from] ::config::ConfigError),

    /// Input rejected before it reaches the registry
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Nodegate operations.
pub type Result<T> = std::result::Result<T, NodegateError>;
