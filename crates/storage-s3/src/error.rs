//! Error types for S3 storage operations.

use std::error::Error as StdError;

use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use rx_storage::StorageError;
use thiserror::Error;

/// Errors specific to the S3 backend.
#[derive(Error, Debug)]
pub enum S3Error {
    /// AWS SDK error.
    #[error("AWS SDK error: {message}")]
    SdkError { message: String, retryable: bool },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A response body broke off while being read.
    #[error("Failed to read body of {key}: {message}")]
    BodyError { key: String, message: String },

    /// A local file or upload source could not be read or written.
    #[error("I/O error on {path}: {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl From<S3Error> for StorageError {
    fn from(err: S3Error) -> Self {
        let message: String = err.to_string();
        match err {
            S3Error::SdkError { message, retryable } => {
                StorageError::NetworkError { message, retryable }
            }
            S3Error::ConfigError(message) => StorageError::InvalidConfig { message },
            S3Error::BodyError { .. } => StorageError::NetworkError {
                message,
                retryable: true,
            },
            S3Error::IoError { path, source } => StorageError::IoError {
                path,
                message: source.to_string(),
            },
        }
    }
}

/// Map an SDK failure on `bucket`/`key` to a `StorageError`.
///
/// Missing keys become `NotFound` and denied requests `AccessDenied`. Other
/// service errors are retryable only for 5xx responses; timeouts and
/// connection failures are always retryable.
pub(crate) fn classify<E>(err: SdkError<E, HttpResponse>, bucket: &str, key: &str) -> StorageError
where
    E: ProvideErrorMetadata + StdError + Send + Sync + 'static,
{
    let status: Option<u16> = err.raw_response().map(|r| r.status().as_u16());

    match (err.code(), status) {
        (Some("NoSuchKey" | "NotFound"), _) | (None, Some(404)) => {
            return StorageError::NotFound {
                bucket: bucket.to_string(),
                path: key.to_string(),
            };
        }
        (Some("AccessDenied" | "Forbidden"), _) | (None, Some(403)) => {
            return StorageError::AccessDenied {
                bucket: bucket.to_string(),
                path: key.to_string(),
                message: DisplayErrorContext(&err).to_string(),
            };
        }
        _ => {}
    }

    let retryable: bool = match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            true
        }
        _ => status.is_some_and(|s| s >= 500),
    };

    S3Error::SdkError {
        message: DisplayErrorContext(&err).to_string(),
        retryable,
    }
    .into()
}
