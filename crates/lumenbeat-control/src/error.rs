//! Error types for the output side
use thiserror::Error;

/// Output errors
#[derive(Error, Debug)]
pub enum ControlError {
    /// DMX error
    #[error("DMX error: {0}")]
    DmxError(String),

    /// I/O error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Invalid parameter value
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Invalid message format
    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

/// Result type for output operations
pub type Result<T> = std::result::Result<T, ControlError>;
