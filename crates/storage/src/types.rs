//! Value types shared by the in-tree backends.

use std::collections::HashMap;
use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

use crate::error::StorageError;

/// Scheme prefix of local file locators.
pub const FILE_SCHEME: &str = "file://";

/// Content type used when an upload does not name one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// A URI naming a download URL, a local file or an upload session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locator(String);

impl Locator {
    /// Wrap a URI string.
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    /// Build a `file://` locator for a local path.
    pub fn from_path(path: &Path) -> Self {
        Self(format!("{}{}", FILE_SCHEME, path.display()))
    }

    /// The URI string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The scheme before `://`, if any.
    pub fn scheme(&self) -> Option<&str> {
        self.0.split_once("://").map(|(scheme, _)| scheme)
    }

    /// Resolve a `file://` locator to a local path.
    ///
    /// # Errors
    /// Returns `StorageError::InvalidLocator` for any other scheme.
    pub fn to_file_path(&self) -> Result<PathBuf, StorageError> {
        match self.0.strip_prefix(FILE_SCHEME) {
            Some(path) if !path.is_empty() => Ok(PathBuf::from(path)),
            _ => Err(StorageError::InvalidLocator {
                locator: self.0.clone(),
                message: "expected a file:// locator".into(),
            }),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Locator {
    fn from(uri: &str) -> Self {
        Self::new(uri)
    }
}

impl From<String> for Locator {
    fn from(uri: String) -> Self {
        Self(uri)
    }
}

/// Object metadata.
///
/// The first group of fields is maintained by the backend; the second group
/// can be set on upload or changed with `update_metadata`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageMetadata {
    /// Bucket holding the object.
    pub bucket: Option<String>,
    /// Full path of the object within the bucket.
    pub path: Option<String>,
    /// Last path segment.
    pub name: Option<String>,
    /// Object size in bytes.
    pub size: u64,
    /// Backend version identifier of the object contents.
    pub generation: Option<String>,
    /// Base64 MD5 of the contents, when the backend provides one.
    pub md5_hash: Option<String>,
    /// Entity tag.
    pub etag: Option<String>,
    /// Creation time (Unix epoch milliseconds).
    pub created_millis: Option<i64>,
    /// Last update time (Unix epoch milliseconds).
    pub updated_millis: Option<i64>,

    pub content_type: Option<String>,
    pub cache_control: Option<String>,
    pub content_disposition: Option<String>,
    pub content_encoding: Option<String>,
    pub content_language: Option<String>,
    /// User-defined key/value pairs.
    pub custom_metadata: HashMap<String, String>,
}

impl StorageMetadata {
    /// Start building metadata for an upload or update.
    pub fn builder() -> StorageMetadataBuilder {
        StorageMetadataBuilder::default()
    }

    /// Apply the writable fields of `update` on top of this record.
    ///
    /// Fields left as `None` in `update` are kept. Custom entries merge key
    /// by key; an empty value removes the key.
    ///
    /// # Arguments
    /// * `update` - Metadata carrying the changed fields
    pub fn merge_update(&mut self, update: &StorageMetadata) {
        fn apply(field: &mut Option<String>, value: &Option<String>) {
            if value.is_some() {
                *field = value.clone();
            }
        }

        apply(&mut self.content_type, &update.content_type);
        apply(&mut self.cache_control, &update.cache_control);
        apply(&mut self.content_disposition, &update.content_disposition);
        apply(&mut self.content_encoding, &update.content_encoding);
        apply(&mut self.content_language, &update.content_language);

        for (key, value) in &update.custom_metadata {
            if value.is_empty() {
                self.custom_metadata.remove(key);
            } else {
                self.custom_metadata.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Builder for the writable fields of [`StorageMetadata`].
#[derive(Debug, Clone, Default)]
pub struct StorageMetadataBuilder {
    metadata: StorageMetadata,
}

impl StorageMetadataBuilder {
    pub fn content_type(mut self, value: impl Into<String>) -> Self {
        self.metadata.content_type = Some(value.into());
        self
    }

    pub fn cache_control(mut self, value: impl Into<String>) -> Self {
        self.metadata.cache_control = Some(value.into());
        self
    }

    pub fn content_disposition(mut self, value: impl Into<String>) -> Self {
        self.metadata.content_disposition = Some(value.into());
        self
    }

    pub fn content_encoding(mut self, value: impl Into<String>) -> Self {
        self.metadata.content_encoding = Some(value.into());
        self
    }

    pub fn content_language(mut self, value: impl Into<String>) -> Self {
        self.metadata.content_language = Some(value.into());
        self
    }

    /// Set one custom key. An empty value removes the key on update.
    pub fn custom(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata
            .custom_metadata
            .insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> StorageMetadata {
        self.metadata
    }
}

/// Result of downloading an object into a local file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSnapshot {
    /// Bytes written to the file.
    pub bytes_transferred: u64,
    /// Size of the object.
    pub total_bytes: u64,
    /// File that was written.
    pub destination: PathBuf,
}

/// Result of a stream download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSnapshot {
    /// Size of the object.
    pub total_bytes: u64,
    /// Downloaded contents.
    pub body: Bytes,
}

impl StreamSnapshot {
    /// A fresh reader over the downloaded contents.
    pub fn stream(&self) -> Cursor<Bytes> {
        Cursor::new(self.body.clone())
    }
}

/// Result of an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSnapshot {
    /// Bytes sent.
    pub bytes_transferred: u64,
    /// Size of the upload.
    pub total_bytes: u64,
    /// Metadata of the stored object.
    pub metadata: StorageMetadata,
    /// Session the upload resumed, if any.
    pub upload_session: Option<Locator>,
}

/// Readable source for stream uploads.
pub type ByteSource = Box<dyn AsyncRead + Send + Unpin>;

/// Consumes a stream download before its task succeeds.
#[async_trait]
pub trait StreamProcessor: Send + Sync {
    /// Process the downloaded stream.
    ///
    /// # Arguments
    /// * `snapshot` - Snapshot the task will succeed with
    /// * `reader` - Reader over the object contents
    ///
    /// # Errors
    /// An error fails the download task.
    async fn process(
        &self,
        snapshot: &StreamSnapshot,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<(), StorageError>;
}

/// Current time as Unix epoch milliseconds.
pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Last segment of an object path.
pub fn object_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_file_round_trip() {
        let locator = Locator::from_path(Path::new("/tmp/cat.png"));
        assert_eq!(locator.as_str(), "file:///tmp/cat.png");
        assert_eq!(locator.scheme(), Some("file"));
        assert_eq!(locator.to_file_path().unwrap(), PathBuf::from("/tmp/cat.png"));
    }

    #[test]
    fn test_locator_rejects_remote_scheme() {
        let locator = Locator::from("https://example.com/cat.png");
        assert!(matches!(
            locator.to_file_path(),
            Err(StorageError::InvalidLocator { .. })
        ));
    }

    #[test]
    fn test_locator_without_scheme() {
        assert_eq!(Locator::from("cat.png").scheme(), None);
    }

    #[test]
    fn test_locator_serializes_as_string() {
        let locator = Locator::from("memory://bucket/a");
        let json: String = serde_json::to_string(&locator).unwrap();
        assert_eq!(json, "\"memory://bucket/a\"");
    }

    #[test]
    fn test_merge_update_keeps_unset_fields() {
        let mut current = StorageMetadata::builder()
            .content_type("image/png")
            .cache_control("no-cache")
            .custom("owner", "tom")
            .build();
        current.size = 42;

        let update = StorageMetadata::builder()
            .cache_control("max-age=60")
            .custom("reviewed", "yes")
            .build();
        current.merge_update(&update);

        assert_eq!(current.size, 42);
        assert_eq!(current.content_type.as_deref(), Some("image/png"));
        assert_eq!(current.cache_control.as_deref(), Some("max-age=60"));
        assert_eq!(current.custom_metadata.len(), 2);
    }

    #[test]
    fn test_merge_update_removes_empty_custom_value() {
        let mut current = StorageMetadata::builder().custom("owner", "tom").build();
        current.merge_update(&StorageMetadata::builder().custom("owner", "").build());
        assert!(current.custom_metadata.is_empty());
    }

    #[test]
    fn test_object_name() {
        assert_eq!(object_name("a/b/c.txt"), "c.txt");
        assert_eq!(object_name("c.txt"), "c.txt");
    }
}
