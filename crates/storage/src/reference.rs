//! The storage-location handle a backend exposes.

use std::path::PathBuf;

use crate::task::StorageTask;

/// Handle to one object in a storage backend.
///
/// Each method starts one operation and returns the backend's task for it.
/// The value types are associated types so the stream adapters can relay
/// them without knowing what they are.
pub trait StorageReference: Clone + Send + Sync + 'static {
    /// Error reported by failed tasks.
    type Error: Send + 'static;
    /// URI-like locator for download URLs, local files and upload sessions.
    type Locator: Clone + Send + 'static;
    /// Object metadata record.
    type Metadata: Clone + Send + 'static;
    /// Result of downloading into a local file.
    type FileSnapshot: Clone + Send + 'static;
    /// Result of a stream download.
    type StreamSnapshot: Clone + Send + 'static;
    /// Callback that consumes a stream download.
    type StreamProcessor: Send + 'static;
    /// Result of an upload.
    type UploadSnapshot: Clone + Send + 'static;
    /// Readable source for stream uploads.
    type Source: Send + 'static;
    /// Task type returned by every operation.
    type Task<T>: StorageTask<T, Error = Self::Error>
    where
        T: Clone + Send + 'static;

    /// Read the whole object into memory.
    ///
    /// # Arguments
    /// * `max_download_size` - Fail instead of reading more than this many bytes
    fn get_bytes(&self, max_download_size: u64) -> Self::Task<Vec<u8>>;

    /// Get a URL the object can be downloaded from.
    fn get_download_url(&self) -> Self::Task<Self::Locator>;

    /// Download the object into a local file.
    ///
    /// # Arguments
    /// * `destination` - File to create or overwrite
    fn get_file(&self, destination: PathBuf) -> Self::Task<Self::FileSnapshot>;

    /// Download the object to a locator.
    ///
    /// # Arguments
    /// * `destination` - Locator of the file to write
    fn get_file_to_locator(&self, destination: Self::Locator) -> Self::Task<Self::FileSnapshot>;

    /// Open the object as a stream.
    fn get_stream(&self) -> Self::Task<Self::StreamSnapshot>;

    /// Open the object as a stream and hand it to a processor before the
    /// task succeeds.
    ///
    /// # Arguments
    /// * `processor` - Consumes the stream in the background
    fn get_stream_with_processor(
        &self,
        processor: Self::StreamProcessor,
    ) -> Self::Task<Self::StreamSnapshot>;

    /// Fetch the object metadata.
    fn get_metadata(&self) -> Self::Task<Self::Metadata>;

    /// Update the writable metadata fields.
    ///
    /// # Arguments
    /// * `metadata` - Fields to change
    fn update_metadata(&self, metadata: Self::Metadata) -> Self::Task<Self::Metadata>;

    /// Upload bytes.
    fn put_bytes(&self, data: Vec<u8>) -> Self::Task<Self::UploadSnapshot>;

    /// Upload bytes with metadata.
    fn put_bytes_with_metadata(
        &self,
        data: Vec<u8>,
        metadata: Self::Metadata,
    ) -> Self::Task<Self::UploadSnapshot>;

    /// Upload the file at a locator.
    fn put_file(&self, source: Self::Locator) -> Self::Task<Self::UploadSnapshot>;

    /// Upload the file at a locator with metadata.
    fn put_file_with_metadata(
        &self,
        source: Self::Locator,
        metadata: Self::Metadata,
    ) -> Self::Task<Self::UploadSnapshot>;

    /// Upload the file at a locator, resuming an existing upload session.
    ///
    /// # Arguments
    /// * `source` - Locator of the file to upload
    /// * `metadata` - Metadata for the new object
    /// * `session` - Locator of the upload session to resume
    fn put_file_resumable(
        &self,
        source: Self::Locator,
        metadata: Self::Metadata,
        session: Self::Locator,
    ) -> Self::Task<Self::UploadSnapshot>;

    /// Upload everything a source yields.
    fn put_stream(&self, source: Self::Source) -> Self::Task<Self::UploadSnapshot>;

    /// Upload everything a source yields, with metadata.
    fn put_stream_with_metadata(
        &self,
        source: Self::Source,
        metadata: Self::Metadata,
    ) -> Self::Task<Self::UploadSnapshot>;

    /// Delete the object.
    fn delete(&self) -> Self::Task<()>;
}
