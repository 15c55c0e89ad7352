//! Stream-returning entry points, one per storage operation.
//!
//! Every function clones the reference and defers the SDK call until the
//! returned stream is first polled. Read-bytes, download URL, metadata and
//! delete return a [`TaskStream`] that ends when the task completes; the
//! others return a [`TaskSingle`] whose value is the terminal event.
//!
//! # Example
//!
//! ```ignore
//! use futures::TryStreamExt;
//! use rx_storage::{ops, MemoryStorage};
//!
//! let storage = MemoryStorage::new("photos")?;
//! let reference = storage.reference("cats/tom.png");
//! ops::put_bytes(&reference, png_bytes).await?;
//! let url = ops::get_download_url(&reference).try_next().await?;
//! ```

use std::path::PathBuf;

use crate::bridge::{from_task, TaskSingle, TaskStream};
use crate::reference::StorageReference;

/// Read the whole object, failing if it is larger than `max_download_size`.
pub fn get_bytes<R: StorageReference>(
    reference: &R,
    max_download_size: u64,
) -> TaskStream<Vec<u8>, R::Error> {
    let reference: R = reference.clone();
    from_task("get_bytes", move || reference.get_bytes(max_download_size))
}

/// Get a URL the object can be downloaded from.
pub fn get_download_url<R: StorageReference>(reference: &R) -> TaskStream<R::Locator, R::Error> {
    let reference: R = reference.clone();
    from_task("get_download_url", move || reference.get_download_url())
}

/// Download the object into a local file.
pub fn get_file<R: StorageReference>(
    reference: &R,
    destination: PathBuf,
) -> TaskSingle<R::FileSnapshot, R::Error> {
    let reference: R = reference.clone();
    from_task("get_file", move || reference.get_file(destination))
}

/// Download the object to the file a locator points at.
pub fn get_file_to_locator<R: StorageReference>(
    reference: &R,
    destination: R::Locator,
) -> TaskSingle<R::FileSnapshot, R::Error> {
    let reference: R = reference.clone();
    from_task("get_file_to_locator", move || {
        reference.get_file_to_locator(destination)
    })
}

/// Open the object as a stream download.
pub fn get_stream<R: StorageReference>(reference: &R) -> TaskSingle<R::StreamSnapshot, R::Error> {
    let reference: R = reference.clone();
    from_task("get_stream", move || reference.get_stream())
}

/// Open the object as a stream download consumed by `processor`.
pub fn get_stream_with_processor<R: StorageReference>(
    reference: &R,
    processor: R::StreamProcessor,
) -> TaskSingle<R::StreamSnapshot, R::Error> {
    let reference: R = reference.clone();
    from_task("get_stream_with_processor", move || {
        reference.get_stream_with_processor(processor)
    })
}

/// Fetch the object metadata.
pub fn get_metadata<R: StorageReference>(reference: &R) -> TaskStream<R::Metadata, R::Error> {
    let reference: R = reference.clone();
    from_task("get_metadata", move || reference.get_metadata())
}

/// Update the writable metadata fields of the object.
pub fn update_metadata<R: StorageReference>(
    reference: &R,
    metadata: R::Metadata,
) -> TaskSingle<R::Metadata, R::Error> {
    let reference: R = reference.clone();
    from_task("update_metadata", move || reference.update_metadata(metadata))
}

/// Upload bytes.
pub fn put_bytes<R: StorageReference>(
    reference: &R,
    data: Vec<u8>,
) -> TaskSingle<R::UploadSnapshot, R::Error> {
    let reference: R = reference.clone();
    from_task("put_bytes", move || reference.put_bytes(data))
}

/// Upload bytes with metadata.
pub fn put_bytes_with_metadata<R: StorageReference>(
    reference: &R,
    data: Vec<u8>,
    metadata: R::Metadata,
) -> TaskSingle<R::UploadSnapshot, R::Error> {
    let reference: R = reference.clone();
    from_task("put_bytes_with_metadata", move || {
        reference.put_bytes_with_metadata(data, metadata)
    })
}

/// Upload the file a locator points at.
pub fn put_file<R: StorageReference>(
    reference: &R,
    source: R::Locator,
) -> TaskSingle<R::UploadSnapshot, R::Error> {
    let reference: R = reference.clone();
    from_task("put_file", move || reference.put_file(source))
}

/// Upload the file a locator points at, with metadata.
pub fn put_file_with_metadata<R: StorageReference>(
    reference: &R,
    source: R::Locator,
    metadata: R::Metadata,
) -> TaskSingle<R::UploadSnapshot, R::Error> {
    let reference: R = reference.clone();
    from_task("put_file_with_metadata", move || {
        reference.put_file_with_metadata(source, metadata)
    })
}

/// Upload a file, resuming the upload session at `session`.
pub fn put_file_resumable<R: StorageReference>(
    reference: &R,
    source: R::Locator,
    metadata: R::Metadata,
    session: R::Locator,
) -> TaskSingle<R::UploadSnapshot, R::Error> {
    let reference: R = reference.clone();
    from_task("put_file_resumable", move || {
        reference.put_file_resumable(source, metadata, session)
    })
}

/// Upload everything `source` yields.
pub fn put_stream<R: StorageReference>(
    reference: &R,
    source: R::Source,
) -> TaskSingle<R::UploadSnapshot, R::Error> {
    let reference: R = reference.clone();
    from_task("put_stream", move || reference.put_stream(source))
}

/// Upload everything `source` yields, with metadata.
pub fn put_stream_with_metadata<R: StorageReference>(
    reference: &R,
    source: R::Source,
    metadata: R::Metadata,
) -> TaskSingle<R::UploadSnapshot, R::Error> {
    let reference: R = reference.clone();
    from_task("put_stream_with_metadata", move || {
        reference.put_stream_with_metadata(source, metadata)
    })
}

/// Delete the object.
pub fn delete<R: StorageReference>(reference: &R) -> TaskStream<(), R::Error> {
    let reference: R = reference.clone();
    from_task("delete", move || reference.delete())
}
