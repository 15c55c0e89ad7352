//! End-to-end tests of `ops` against the in-memory backend.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use rx_storage::{
    ops, ByteSource, Locator, MemoryReference, MemoryStorage, StorageError, StorageMetadata,
    StreamProcessor, StreamSnapshot,
};
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Helper to create a bucket with one object uploaded.
async fn create_test_env(path: &str, data: &[u8]) -> (MemoryStorage, MemoryReference) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let storage = MemoryStorage::new("test-bucket").unwrap();
    let reference: MemoryReference = storage.reference(path);
    ops::put_bytes(&reference, data.to_vec()).await.unwrap();
    (storage, reference)
}

/// Counts the bytes it reads.
struct CountingProcessor {
    bytes_read: AtomicU64,
}

#[async_trait]
impl StreamProcessor for CountingProcessor {
    async fn process(
        &self,
        _snapshot: &StreamSnapshot,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<(), StorageError> {
        let mut buffer: Vec<u8> = Vec::new();
        let n: usize = reader.read_to_end(&mut buffer).await?;
        self.bytes_read.fetch_add(n as u64, Ordering::SeqCst);
        Ok(())
    }
}

/// Always fails.
struct RejectingProcessor;

#[async_trait]
impl StreamProcessor for RejectingProcessor {
    async fn process(
        &self,
        _snapshot: &StreamSnapshot,
        _reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<(), StorageError> {
        Err(StorageError::Other {
            message: "rejected".into(),
        })
    }
}

/// Panics instead of returning.
struct PanickingProcessor;

#[async_trait]
impl StreamProcessor for PanickingProcessor {
    async fn process(
        &self,
        _snapshot: &StreamSnapshot,
        _reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<(), StorageError> {
        panic!("thumbnailer crashed");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_put_then_get_bytes() {
    let (_storage, reference) = create_test_env("notes/a.txt", b"hello world").await;

    let items: Vec<Result<Vec<u8>, StorageError>> =
        ops::get_bytes(&reference, 1024).collect().await;
    assert_eq!(items, vec![Ok(b"hello world".to_vec())]);
}

#[tokio::test]
async fn test_get_bytes_over_limit() {
    let (_storage, reference) = create_test_env("notes/a.txt", b"hello world").await;

    let items: Vec<Result<Vec<u8>, StorageError>> = ops::get_bytes(&reference, 5).collect().await;
    assert_eq!(
        items,
        vec![Err(StorageError::SizeExceeded {
            path: "notes/a.txt".into(),
            size: 11,
            limit: 5,
        })]
    );
}

#[tokio::test]
async fn test_missing_object_not_found() {
    let storage = MemoryStorage::new("test-bucket").unwrap();
    let reference: MemoryReference = storage.reference("missing");

    let result = ops::get_metadata(&reference).try_next().await;
    assert!(matches!(result, Err(StorageError::NotFound { .. })));
}

#[tokio::test]
async fn test_download_url_resolves_back() {
    let (storage, reference) = create_test_env("cats/tom.png", b"png").await;

    let url: Locator = ops::get_download_url(&reference)
        .try_next()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(url.as_str(), "memory://test-bucket/cats/tom.png");
    assert_eq!(storage.reference_from_url(&url).unwrap().path(), "cats/tom.png");
}

#[tokio::test]
async fn test_upload_metadata_and_update() {
    let storage = MemoryStorage::new("test-bucket").unwrap();
    let reference: MemoryReference = storage.reference("cats/tom.png");
    let metadata: StorageMetadata = StorageMetadata::builder()
        .content_type("image/png")
        .custom("owner", "tom")
        .build();

    let snapshot = ops::put_bytes_with_metadata(&reference, vec![0; 16], metadata)
        .await
        .unwrap();
    assert_eq!(snapshot.total_bytes, 16);
    assert_eq!(snapshot.metadata.content_type.as_deref(), Some("image/png"));
    assert_eq!(snapshot.metadata.name.as_deref(), Some("tom.png"));

    let update: StorageMetadata = StorageMetadata::builder()
        .cache_control("max-age=3600")
        .build();
    let updated: StorageMetadata = ops::update_metadata(&reference, update).await.unwrap();
    assert_eq!(updated.content_type.as_deref(), Some("image/png"));
    assert_eq!(updated.cache_control.as_deref(), Some("max-age=3600"));
    assert_eq!(updated.custom_metadata.get("owner").map(String::as_str), Some("tom"));

    let fetched: Vec<Result<StorageMetadata, StorageError>> =
        ops::get_metadata(&reference).collect().await;
    assert_eq!(fetched, vec![Ok(updated)]);
}

#[tokio::test]
async fn test_update_metadata_missing_object() {
    let storage = MemoryStorage::new("test-bucket").unwrap();
    let result = ops::update_metadata(&storage.reference("nope"), StorageMetadata::default()).await;
    assert!(matches!(result, Err(StorageError::NotFound { .. })));
}

#[tokio::test]
async fn test_get_file_and_locator() {
    let temp_dir: TempDir = TempDir::new().unwrap();
    let (_storage, reference) = create_test_env("docs/readme.md", b"# readme").await;

    let destination: PathBuf = temp_dir.path().join("nested/readme.md");
    let snapshot = ops::get_file(&reference, destination.clone()).await.unwrap();
    assert_eq!(snapshot.bytes_transferred, 8);
    assert_eq!(std::fs::read(&destination).unwrap(), b"# readme");

    let second: PathBuf = temp_dir.path().join("copy.md");
    let snapshot = ops::get_file_to_locator(&reference, Locator::from_path(&second))
        .await
        .unwrap();
    assert_eq!(snapshot.destination, second);
    assert_eq!(std::fs::read(&second).unwrap(), b"# readme");
}

#[tokio::test]
async fn test_get_file_to_remote_locator_fails() {
    let (_storage, reference) = create_test_env("docs/readme.md", b"# readme").await;
    let result =
        ops::get_file_to_locator(&reference, Locator::from("https://example.com/x")).await;
    assert!(matches!(result, Err(StorageError::InvalidLocator { .. })));
}

#[tokio::test]
async fn test_put_file_variants() {
    let temp_dir: TempDir = TempDir::new().unwrap();
    let source_path: PathBuf = temp_dir.path().join("upload.bin");
    std::fs::write(&source_path, b"file contents").unwrap();
    let source: Locator = Locator::from_path(&source_path);

    let storage = MemoryStorage::new("test-bucket").unwrap();
    let plain: MemoryReference = storage.reference("plain.bin");
    let snapshot = ops::put_file(&plain, source.clone()).await.unwrap();
    assert_eq!(snapshot.total_bytes, 13);
    assert!(snapshot.upload_session.is_none());

    let typed: MemoryReference = storage.reference("typed.bin");
    let metadata = StorageMetadata::builder().content_type("text/plain").build();
    let snapshot = ops::put_file_with_metadata(&typed, source.clone(), metadata.clone())
        .await
        .unwrap();
    assert_eq!(snapshot.metadata.content_type.as_deref(), Some("text/plain"));

    let resumed: MemoryReference = storage.reference("resumed.bin");
    let session: Locator = Locator::from("memory://test-bucket/sessions/42");
    let snapshot = ops::put_file_resumable(&resumed, source, metadata, session.clone())
        .await
        .unwrap();
    assert_eq!(snapshot.upload_session, Some(session));

    assert_eq!(storage.object_count().await, 3);
}

#[tokio::test]
async fn test_put_stream_variants() {
    let storage = MemoryStorage::new("test-bucket").unwrap();
    let reference: MemoryReference = storage.reference("streamed.bin");

    let source: ByteSource = Box::new(std::io::Cursor::new(b"streamed".to_vec()));
    let snapshot = ops::put_stream(&reference, source).await.unwrap();
    assert_eq!(snapshot.total_bytes, 8);

    let source: ByteSource = Box::new(std::io::Cursor::new(b"again".to_vec()));
    let metadata = StorageMetadata::builder().content_language("en").build();
    let snapshot = ops::put_stream_with_metadata(&reference, source, metadata)
        .await
        .unwrap();
    assert_eq!(snapshot.metadata.content_language.as_deref(), Some("en"));
    assert_eq!(snapshot.metadata.generation.as_deref(), Some("2"));

    let bytes = ops::get_bytes(&reference, 64).try_next().await.unwrap();
    assert_eq!(bytes, Some(b"again".to_vec()));
}

#[tokio::test]
async fn test_get_stream() {
    let (_storage, reference) = create_test_env("video.mp4", b"0123456789").await;

    let snapshot: StreamSnapshot = ops::get_stream(&reference).await.unwrap();
    assert_eq!(snapshot.total_bytes, 10);

    let mut contents: Vec<u8> = Vec::new();
    snapshot.stream().read_to_end(&mut contents).await.unwrap();
    assert_eq!(contents, b"0123456789");
}

#[tokio::test]
async fn test_get_stream_with_processor() {
    let (_storage, reference) = create_test_env("video.mp4", b"0123456789").await;
    let counter = Arc::new(CountingProcessor {
        bytes_read: AtomicU64::new(0),
    });
    let processor: Arc<dyn StreamProcessor> = counter.clone();

    let snapshot = ops::get_stream_with_processor(&reference, processor)
        .await
        .unwrap();
    assert_eq!(snapshot.total_bytes, 10);
    assert_eq!(counter.bytes_read.load(Ordering::SeqCst), 10);
}

#[tokio::test]
async fn test_processor_error_fails_download() {
    let (_storage, reference) = create_test_env("video.mp4", b"0123456789").await;
    let processor: Arc<dyn StreamProcessor> = Arc::new(RejectingProcessor);
    let result = ops::get_stream_with_processor(&reference, processor).await;
    assert_eq!(
        result,
        Err(StorageError::Other {
            message: "rejected".into()
        })
    );
}

#[tokio::test]
async fn test_processor_panic_fails_download() {
    let (_storage, reference) = create_test_env("video.mp4", b"0123456789").await;
    let processor: Arc<dyn StreamProcessor> = Arc::new(PanickingProcessor);

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        ops::get_stream_with_processor(&reference, processor),
    )
    .await
    .expect("download never terminated");
    assert!(matches!(result, Err(StorageError::Other { .. })));
}

#[tokio::test]
async fn test_delete() {
    let (storage, reference) = create_test_env("trash.txt", b"bye").await;

    let items: Vec<Result<(), StorageError>> = ops::delete(&reference).collect().await;
    assert_eq!(items, vec![Ok(())]);
    assert_eq!(storage.object_count().await, 0);

    let again: Vec<Result<(), StorageError>> = ops::delete(&reference).collect().await;
    assert!(matches!(again.as_slice(), [Err(StorageError::NotFound { .. })]));
}

#[tokio::test]
async fn test_each_subscription_calls_once() {
    let (storage, reference) = create_test_env("counter.txt", b"1").await;

    // Two separate streams are two separate uploads.
    let first = ops::put_bytes(&reference, b"2".to_vec());
    let second = ops::put_bytes(&reference, b"3".to_vec());
    let first = first.await.unwrap();
    let second = second.await.unwrap();

    assert_eq!(first.metadata.generation.as_deref(), Some("2"));
    assert_eq!(second.metadata.generation.as_deref(), Some("3"));
    assert_eq!(storage.object_count().await, 1);
}
