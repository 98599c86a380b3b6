//! Error types for the Viewmeter service.

use thiserror::Error;

/// Main error type for Viewmeter operations.
#[derive(Error, Debug)]
pub enum ViewmeterError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors raised while layering configuration sources
    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] ::config::ConfigError),

    /// Counter export errors
    #[error("Export error: {0}")]
    Export(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Viewmeter operations.
pub type Result<T> = std::result::Result<T, ViewmeterError>;
