//! Error types for Recollect

use thiserror::Error;

/// Main error type for Recollect operations
#[derive(Error, Debug)]
pub enum RecollectError {
    /// Memory backend errors surfaced to the caller
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Direct store errors (LanceDB, file system, etc.)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The conversation write itself failed; nothing was persisted
    #[error("Failed to record conversation: {0}")]
    CommitWrite(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// General errors
    #[error("{0}")]
    General(String),
}

/// Errors reported by a single memory backend surface
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The backend could not be reached or the request failed in transit
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// The backend answered with a non-success status
    #[error("Backend returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body could not be decoded
    #[error("Failed to decode backend response: {0}")]
    Decode(String),

    /// The surface is absent or disabled on this backend
    #[error("Backend surface not supported: {0}")]
    Unsupported(&'static str),

    /// The call did not finish within its time budget
    #[error("Backend call timed out")]
    Timeout,
}

/// Result type alias for Recollect operations
pub type Result<T> = std::result::Result<T, RecollectError>;

/// Result type alias for backend surface calls
pub type BackendResult<T> = std::result::Result<T, BackendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_display() {
        let err = BackendError::Status {
            status: 503,
            body: "busy".to_string(),
        };
        assert_eq!(err.to_string(), "Backend returned 503: busy");

        let err = BackendError::Unsupported("search");
        assert_eq!(err.to_string(), "Backend surface not supported: search");
    }

    #[test]
    fn test_backend_error_converts_into_crate_error() {
        let err: RecollectError = BackendError::Timeout.into();
        assert!(matches!(err, RecollectError::Backend(BackendError::Timeout)));
        assert_eq!(err.to_string(), "Backend error: Backend call timed out");
    }
}
