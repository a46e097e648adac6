//! Custom error types for the application.
//!
//! This module defines the primary error type, `MeterError`, for the entire
//! application. Using the `thiserror` crate, it provides a centralized and
//! consistent way to handle the different kinds of errors that can occur,
//! from configuration and I/O issues to transport and storage problems.
//!
//! Decode anomalies are deliberately NOT represented here: an unknown flag or
//! a malformed payload never produces an error. The decoder degrades to an
//! omitted field and frame assembly continues (see [`crate::protocol`]).

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, MeterError>;

/// Application-level error taxonomy.
#[derive(Error, Debug)]
pub enum MeterError {
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Serial port not connected")]
    SerialPortNotConnected,

    #[error("Unexpected EOF from serial port")]
    SerialUnexpectedEof,

    #[error("Serial support not enabled. Rebuild with --features serial")]
    SerialFeatureDisabled,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_error_keeps_message() {
        let err = MeterError::Storage("disk full".to_string());
        assert_eq!(err.to_string(), "Storage error: disk full");
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        let err: MeterError = io.into();
        assert!(matches!(err, MeterError::Io(_)));
    }
}
