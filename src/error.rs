//! Error types and handling infrastructure for rtless.
//!
//! This module provides a centralized error handling system using `thiserror` for
//! custom error types. Application-level code (the binary) wraps these with `anyhow`.
//!
//! ## Taxonomy
//!
//! - **InvalidArgument**: bad ranges, paths or intervals, rejected before any remote call
//! - **NotConnected**: the exec channel is gone; fatal to the single call
//! - **Channel**: the exec channel could not launch or read a command
//! - Remote command failures are *not* errors: composed pipelines swallow them and
//!   surface as empty or truncated streams
//! - Cancellation is *not* an error: operations return `Ok(())` when cancelled

use thiserror::Error;

/// The main error type for rtless operations.
#[derive(Error, Debug)]
pub enum RtlessError {
    /// A request was rejected before touching the remote host
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// The exec channel has no live connection
    #[error("Not connected to remote host")]
    NotConnected,

    /// The exec channel failed to launch or read a command
    #[error("Exec channel failed: {message}")]
    Channel {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Local I/O failure (e.g. writing an exported range)
    #[error("I/O operation failed: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration related errors
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Generic error for cases not covered by specific variants
    #[error("Operation failed: {message}")]
    Other { message: String },
}

/// Standard Result type for rtless operations.
pub type Result<T> = std::result::Result<T, RtlessError>;

impl RtlessError {
    /// Create an InvalidArgument error with a descriptive message
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a Channel error from an io::Error with additional context
    pub fn channel(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Channel {
            message: message.into(),
            source,
        }
    }

    /// Create an Io error from an io::Error with additional context
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Create a ConfigError with a descriptive message
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Create a generic Other error with a descriptive message
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for RtlessError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::BrokenPipe => Self::Io {
                message: "Sink closed".to_string(),
                source: err,
            },
            _ => Self::Io {
                message: "IO operation failed".to_string(),
                source: err,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let invalid = RtlessError::invalid_argument("start line must be >= 1");
        assert_eq!(
            invalid.to_string(),
            "Invalid argument: start line must be >= 1"
        );

        assert_eq!(
            RtlessError::NotConnected.to_string(),
            "Not connected to remote host"
        );

        let config = RtlessError::config("bad interval");
        assert_eq!(config.to_string(), "Configuration error: bad interval");
    }

    #[test]
    fn test_error_constructors() {
        let channel = RtlessError::channel(
            "spawn failed",
            std::io::Error::new(std::io::ErrorKind::NotFound, "sh"),
        );
        assert!(matches!(channel, RtlessError::Channel { .. }));

        let other = RtlessError::other("Unknown error");
        assert!(matches!(other, RtlessError::Other { .. }));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed");
        let err: RtlessError = io_err.into();

        match err {
            RtlessError::Io { message, .. } => assert_eq!(message, "Sink closed"),
            _ => panic!("Expected Io variant"),
        }
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_result() -> Result<u64> {
            Ok(42)
        }

        assert_eq!(returns_result().unwrap(), 42);
    }
}
