//! Error types for storage operations.

use thiserror::Error;

/// Errors reported by the in-tree storage backends.
///
/// The stream adapters never construct or inspect these; they forward
/// whatever error type a task reports. Backends in this workspace report
/// this one so that `FutureTask` can fan a single failure out to every
/// listener.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Object does not exist.
    #[error("Object not found: {bucket}/{path}")]
    NotFound { bucket: String, path: String },

    /// Access denied.
    #[error("Access denied to {bucket}/{path}: {message}")]
    AccessDenied {
        bucket: String,
        path: String,
        message: String,
    },

    /// Object is larger than the caller allowed.
    #[error("Object {path} is {size} bytes, larger than the {limit} byte limit")]
    SizeExceeded { path: String, size: u64, limit: u64 },

    /// Locator has a scheme the backend cannot handle.
    #[error("Invalid locator {locator}: {message}")]
    InvalidLocator { locator: String, message: String },

    /// Network error.
    #[error("Network error: {message}")]
    NetworkError { message: String, retryable: bool },

    /// Local I/O error.
    #[error("I/O error for {path}: {message}")]
    IoError { path: String, message: String },

    /// Task was cancelled before it finished.
    #[error("Operation cancelled")]
    Cancelled,

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Other error.
    #[error("{message}")]
    Other { message: String },
}

impl StorageError {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::NetworkError { retryable, .. } => *retryable,
            StorageError::NotFound { .. } => false,
            StorageError::AccessDenied { .. } => false,
            StorageError::SizeExceeded { .. } => false,
            StorageError::InvalidLocator { .. } => false,
            StorageError::IoError { .. } => false,
            StorageError::Cancelled => false,
            StorageError::InvalidConfig { .. } => false,
            StorageError::Other { .. } => false,
        }
    }

    /// Create an IoError from std::io::Error.
    ///
    /// # Arguments
    /// * `path` - Path where the error occurred
    /// * `err` - The underlying IO error
    pub fn from_io(path: impl Into<String>, err: std::io::Error) -> Self {
        StorageError::IoError {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::IoError {
            path: String::new(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_network_error() {
        let err = StorageError::NetworkError {
            message: "connection reset".into(),
            retryable: true,
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn test_cancelled_not_retryable() {
        assert!(!StorageError::Cancelled.is_retryable());
    }

    #[test]
    fn test_size_exceeded_message() {
        let err = StorageError::SizeExceeded {
            path: "images/cat.png".into(),
            size: 30,
            limit: 20,
        };
        assert_eq!(
            err.to_string(),
            "Object images/cat.png is 30 bytes, larger than the 20 byte limit"
        );
    }

    #[test]
    fn test_from_io_keeps_path() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: StorageError = StorageError::from_io("/tmp/x", io);
        assert!(matches!(err, StorageError::IoError { ref path, .. } if path == "/tmp/x"));
    }
}
