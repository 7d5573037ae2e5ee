//! Error types for devlink

use thiserror::Error;

/// Result type alias using devlink's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for devlink
#[derive(Error, Debug)]
pub enum Error {
    /// A message could not be encoded as a single JSON record
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// A record was not a valid JSON message
    #[error("Decoding error: {0}")]
    Decoding(String),

    /// TCP connect was refused or timed out
    #[error("Cannot connect to {addr}: {reason}")]
    Connect { addr: String, reason: String },

    /// Operation attempted on a closed session
    #[error("Session is closed")]
    ClosedSession,

    /// Event sent before the device registered
    #[error("Device is not registered; send init first")]
    NotRegistered,

    /// Second `init` on the same connection
    #[error("Device is already registered")]
    AlreadyRegistered,

    /// Controller answered `init` with an error status
    #[error("Registration rejected ({code}): {message}")]
    Rejected { code: i64, message: String },

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if the caller may reasonably retry the operation
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Connect { .. } | Error::Timeout(_) | Error::Io(_))
    }

    /// Check if the error means the connection is gone
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Error::Connect { .. } | Error::ClosedSession | Error::Io(_)
        )
    }

    pub(crate) fn connect(addr: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Error::Connect {
            addr: addr.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_error_display() {
        let err = Error::connect("127.0.0.1:8999", "connection refused");
        assert_eq!(
            err.to_string(),
            "Cannot connect to 127.0.0.1:8999: connection refused"
        );
        assert!(err.is_retryable());
        assert!(err.is_connection_error());
    }

    #[test]
    fn test_closed_session_not_retryable() {
        assert!(!Error::ClosedSession.is_retryable());
        assert!(Error::ClosedSession.is_connection_error());
        assert!(!Error::NotRegistered.is_connection_error());
    }
}
