//! Storage error types.

use thiserror::Error;

/// Result alias for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The engine (or the partition backing a handle) has been closed.
    #[error("store is closed")]
    Closed,

    /// A named object does not exist.
    #[error("object not found: {0}")]
    NotFound(String),

    /// A malformed configuration option, name, or collection request.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A filesystem failure during open, move, or delete.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The bounded wait for a partition to release its files was exhausted.
    #[error("timed out waiting for closed partition files: {0}")]
    CloseWait(String),

    /// An error reported by the underlying embedded database.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Wrap a backend error, preserving only its message.
    pub(crate) fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }

    /// Wrap a codec error, preserving only its message.
    pub(crate) fn codec(err: impl std::fmt::Display) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(StoreError::Closed.to_string(), "store is closed");
        assert_eq!(
            StoreError::NotFound("model".to_string()).to_string(),
            "object not found: model"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: StoreError = io.into();
        assert!(matches!(err, StoreError::Io(_)));
    }
}
