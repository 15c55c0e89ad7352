//! In-process storage backend.
//!
//! `MemoryStorage` keeps a single bucket of objects in memory and runs each
//! operation as a [`FutureTask`] on a tokio runtime. Useful in tests and
//! wherever a real bucket is not needed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::runtime::Handle;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::StorageError;
use crate::future_task::FutureTask;
use crate::reference::StorageReference;
use crate::types::{
    now_millis, object_name, ByteSource, FileSnapshot, Locator, StorageMetadata, StreamProcessor,
    StreamSnapshot, UploadSnapshot, DEFAULT_CONTENT_TYPE,
};

/// Scheme of download URLs handed out by this backend.
pub const MEMORY_SCHEME: &str = "memory://";

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    metadata: StorageMetadata,
}

struct Inner {
    bucket: String,
    objects: RwLock<HashMap<String, StoredObject>>,
    handle: Handle,
}

/// An in-memory bucket.
#[derive(Clone)]
pub struct MemoryStorage {
    inner: Arc<Inner>,
}

impl MemoryStorage {
    /// Create an empty bucket whose tasks run on the current runtime.
    ///
    /// # Errors
    /// Returns `StorageError::InvalidConfig` outside a tokio runtime.
    pub fn new(bucket: impl Into<String>) -> Result<Self, StorageError> {
        let handle: Handle = Handle::try_current().map_err(|e| StorageError::InvalidConfig {
            message: format!("memory storage needs a tokio runtime: {}", e),
        })?;
        Ok(Self::with_handle(bucket, handle))
    }

    /// Create an empty bucket whose tasks run on `handle`.
    pub fn with_handle(bucket: impl Into<String>, handle: Handle) -> Self {
        Self {
            inner: Arc::new(Inner {
                bucket: bucket.into(),
                objects: RwLock::new(HashMap::new()),
                handle,
            }),
        }
    }

    /// Bucket name.
    pub fn bucket(&self) -> &str {
        &self.inner.bucket
    }

    /// Reference to the object at `path`.
    ///
    /// Leading and trailing slashes are ignored.
    pub fn reference(&self, path: impl AsRef<str>) -> MemoryReference {
        MemoryReference {
            storage: self.clone(),
            path: normalize(path.as_ref()),
        }
    }

    /// Reference to the bucket root.
    pub fn root(&self) -> MemoryReference {
        self.reference("")
    }

    /// Resolve a download URL handed out by this bucket.
    ///
    /// # Errors
    /// Returns `StorageError::InvalidLocator` if the URL is not a
    /// `memory://` URL for this bucket.
    pub fn reference_from_url(&self, url: &Locator) -> Result<MemoryReference, StorageError> {
        let invalid = |message: &str| StorageError::InvalidLocator {
            locator: url.to_string(),
            message: message.to_string(),
        };

        let rest: &str = url
            .as_str()
            .strip_prefix(MEMORY_SCHEME)
            .ok_or_else(|| invalid("expected a memory:// URL"))?;
        let (bucket, path) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket != self.bucket() {
            return Err(invalid("URL names a different bucket"));
        }
        Ok(self.reference(path))
    }

    /// Number of stored objects.
    pub async fn object_count(&self) -> usize {
        self.inner.objects.read().await.len()
    }

    fn spawn<T, F>(&self, future: F) -> FutureTask<T>
    where
        T: Clone + Send + 'static,
        F: std::future::Future<Output = Result<T, StorageError>> + Send + 'static,
    {
        FutureTask::spawn(&self.inner.handle, future)
    }
}

impl Inner {
    fn not_found(&self, path: &str) -> StorageError {
        StorageError::NotFound {
            bucket: self.bucket.clone(),
            path: path.to_string(),
        }
    }

    async fn load(&self, path: &str) -> Result<StoredObject, StorageError> {
        self.objects
            .read()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| self.not_found(path))
    }

    /// Store an object, replacing any existing one.
    async fn store(
        &self,
        path: &str,
        data: Bytes,
        metadata: Option<StorageMetadata>,
        session: Option<Locator>,
    ) -> Result<UploadSnapshot, StorageError> {
        if path.is_empty() {
            return Err(StorageError::InvalidLocator {
                locator: format!("{}{}/", MEMORY_SCHEME, self.bucket),
                message: "cannot upload to the bucket root".into(),
            });
        }

        let mut objects = self.objects.write().await;
        let previous: Option<&StoredObject> = objects.get(path);
        let generation: u64 = previous
            .and_then(|o| o.metadata.generation.as_deref())
            .and_then(|g| g.parse::<u64>().ok())
            .unwrap_or(0)
            + 1;
        let now: i64 = now_millis();

        let mut stored: StorageMetadata = StorageMetadata {
            bucket: Some(self.bucket.clone()),
            path: Some(path.to_string()),
            name: Some(object_name(path).to_string()),
            size: data.len() as u64,
            generation: Some(generation.to_string()),
            md5_hash: None,
            etag: Some(format!("\"{}-{}\"", generation, data.len())),
            created_millis: Some(now),
            updated_millis: Some(now),
            content_type: Some(DEFAULT_CONTENT_TYPE.to_string()),
            ..Default::default()
        };
        if let Some(ref metadata) = metadata {
            stored.merge_update(metadata);
        }

        let size: u64 = stored.size;
        objects.insert(
            path.to_string(),
            StoredObject {
                data,
                metadata: stored.clone(),
            },
        );
        debug!(bucket = %self.bucket, path, size, generation, "stored object");

        Ok(UploadSnapshot {
            bytes_transferred: size,
            total_bytes: size,
            metadata: stored,
            upload_session: session,
        })
    }

    async fn write_file(&self, path: &str, destination: PathBuf) -> Result<FileSnapshot, StorageError> {
        let object: StoredObject = self.load(path).await?;

        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StorageError::from_io(parent.display().to_string(), e))?;
            }
        }
        tokio::fs::write(&destination, &object.data)
            .await
            .map_err(|e| StorageError::from_io(destination.display().to_string(), e))?;

        let size: u64 = object.data.len() as u64;
        Ok(FileSnapshot {
            bytes_transferred: size,
            total_bytes: size,
            destination,
        })
    }

    async fn read_file(path: &Path) -> Result<Bytes, StorageError> {
        tokio::fs::read(path)
            .await
            .map(Bytes::from)
            .map_err(|e| StorageError::from_io(path.display().to_string(), e))
    }

    async fn read_source(mut source: ByteSource) -> Result<Bytes, StorageError> {
        let mut buffer: Vec<u8> = Vec::new();
        source
            .read_to_end(&mut buffer)
            .await
            .map_err(|e| StorageError::from_io("<stream>", e))?;
        Ok(Bytes::from(buffer))
    }
}

/// Handle to one object in a [`MemoryStorage`] bucket.
#[derive(Clone)]
pub struct MemoryReference {
    storage: MemoryStorage,
    path: String,
}

impl MemoryReference {
    /// Full object path; empty for the bucket root.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Last path segment.
    pub fn name(&self) -> &str {
        object_name(&self.path)
    }

    /// Bucket holding the object.
    pub fn bucket(&self) -> &str {
        self.storage.bucket()
    }

    /// Reference to a path below this one.
    pub fn child(&self, relative: &str) -> MemoryReference {
        let relative: String = normalize(relative);
        if self.path.is_empty() {
            self.storage.reference(relative)
        } else {
            self.storage.reference(format!("{}/{}", self.path, relative))
        }
    }

    /// Reference to the enclosing path, or `None` at the bucket root.
    pub fn parent(&self) -> Option<MemoryReference> {
        if self.path.is_empty() {
            return None;
        }
        let parent: &str = self.path.rsplit_once('/').map(|(p, _)| p).unwrap_or("");
        Some(self.storage.reference(parent))
    }

    fn inner(&self) -> Arc<Inner> {
        self.storage.inner.clone()
    }
}

impl std::fmt::Debug for MemoryReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}/{}", MEMORY_SCHEME, self.bucket(), self.path)
    }
}

impl StorageReference for MemoryReference {
    type Error = StorageError;
    type Locator = Locator;
    type Metadata = StorageMetadata;
    type FileSnapshot = FileSnapshot;
    type StreamSnapshot = StreamSnapshot;
    type StreamProcessor = Arc<dyn StreamProcessor>;
    type UploadSnapshot = UploadSnapshot;
    type Source = ByteSource;
    type Task<T>
        = FutureTask<T>
    where
        T: Clone + Send + 'static;

    fn get_bytes(&self, max_download_size: u64) -> FutureTask<Vec<u8>> {
        let (inner, path) = (self.inner(), self.path.clone());
        self.storage.spawn(async move {
            let object: StoredObject = inner.load(&path).await?;
            let size: u64 = object.data.len() as u64;
            if size > max_download_size {
                return Err(StorageError::SizeExceeded {
                    path,
                    size,
                    limit: max_download_size,
                });
            }
            Ok(object.data.to_vec())
        })
    }

    fn get_download_url(&self) -> FutureTask<Locator> {
        let (inner, path) = (self.inner(), self.path.clone());
        self.storage.spawn(async move {
            inner.load(&path).await?;
            Ok(Locator::new(format!(
                "{}{}/{}",
                MEMORY_SCHEME, inner.bucket, path
            )))
        })
    }

    fn get_file(&self, destination: PathBuf) -> FutureTask<FileSnapshot> {
        let (inner, path) = (self.inner(), self.path.clone());
        self.storage
            .spawn(async move { inner.write_file(&path, destination).await })
    }

    fn get_file_to_locator(&self, destination: Locator) -> FutureTask<FileSnapshot> {
        let (inner, path) = (self.inner(), self.path.clone());
        self.storage.spawn(async move {
            let destination: PathBuf = destination.to_file_path()?;
            inner.write_file(&path, destination).await
        })
    }

    fn get_stream(&self) -> FutureTask<StreamSnapshot> {
        let (inner, path) = (self.inner(), self.path.clone());
        self.storage.spawn(async move {
            let object: StoredObject = inner.load(&path).await?;
            Ok(StreamSnapshot {
                total_bytes: object.data.len() as u64,
                body: object.data,
            })
        })
    }

    fn get_stream_with_processor(
        &self,
        processor: Arc<dyn StreamProcessor>,
    ) -> FutureTask<StreamSnapshot> {
        let (inner, path) = (self.inner(), self.path.clone());
        self.storage.spawn(async move {
            let object: StoredObject = inner.load(&path).await?;
            let snapshot = StreamSnapshot {
                total_bytes: object.data.len() as u64,
                body: object.data,
            };
            let mut reader = snapshot.stream();
            processor.process(&snapshot, &mut reader).await?;
            Ok(snapshot)
        })
    }

    fn get_metadata(&self) -> FutureTask<StorageMetadata> {
        let (inner, path) = (self.inner(), self.path.clone());
        self.storage
            .spawn(async move { Ok(inner.load(&path).await?.metadata) })
    }

    fn update_metadata(&self, metadata: StorageMetadata) -> FutureTask<StorageMetadata> {
        let (inner, path) = (self.inner(), self.path.clone());
        self.storage.spawn(async move {
            let mut objects = inner.objects.write().await;
            let object: &mut StoredObject = objects
                .get_mut(&path)
                .ok_or_else(|| inner.not_found(&path))?;
            object.metadata.merge_update(&metadata);
            object.metadata.updated_millis = Some(now_millis());
            Ok(object.metadata.clone())
        })
    }

    fn put_bytes(&self, data: Vec<u8>) -> FutureTask<UploadSnapshot> {
        let (inner, path) = (self.inner(), self.path.clone());
        self.storage
            .spawn(async move { inner.store(&path, Bytes::from(data), None, None).await })
    }

    fn put_bytes_with_metadata(
        &self,
        data: Vec<u8>,
        metadata: StorageMetadata,
    ) -> FutureTask<UploadSnapshot> {
        let (inner, path) = (self.inner(), self.path.clone());
        self.storage.spawn(async move {
            inner
                .store(&path, Bytes::from(data), Some(metadata), None)
                .await
        })
    }

    fn put_file(&self, source: Locator) -> FutureTask<UploadSnapshot> {
        let (inner, path) = (self.inner(), self.path.clone());
        self.storage.spawn(async move {
            let data: Bytes = Inner::read_file(&source.to_file_path()?).await?;
            inner.store(&path, data, None, None).await
        })
    }

    fn put_file_with_metadata(
        &self,
        source: Locator,
        metadata: StorageMetadata,
    ) -> FutureTask<UploadSnapshot> {
        let (inner, path) = (self.inner(), self.path.clone());
        self.storage.spawn(async move {
            let data: Bytes = Inner::read_file(&source.to_file_path()?).await?;
            inner.store(&path, data, Some(metadata), None).await
        })
    }

    fn put_file_resumable(
        &self,
        source: Locator,
        metadata: StorageMetadata,
        session: Locator,
    ) -> FutureTask<UploadSnapshot> {
        let (inner, path) = (self.inner(), self.path.clone());
        self.storage.spawn(async move {
            let data: Bytes = Inner::read_file(&source.to_file_path()?).await?;
            inner.store(&path, data, Some(metadata), Some(session)).await
        })
    }

    fn put_stream(&self, source: ByteSource) -> FutureTask<UploadSnapshot> {
        let (inner, path) = (self.inner(), self.path.clone());
        self.storage.spawn(async move {
            let data: Bytes = Inner::read_source(source).await?;
            inner.store(&path, data, None, None).await
        })
    }

    fn put_stream_with_metadata(
        &self,
        source: ByteSource,
        metadata: StorageMetadata,
    ) -> FutureTask<UploadSnapshot> {
        let (inner, path) = (self.inner(), self.path.clone());
        self.storage.spawn(async move {
            let data: Bytes = Inner::read_source(source).await?;
            inner.store(&path, data, Some(metadata), None).await
        })
    }

    fn delete(&self) -> FutureTask<()> {
        let (inner, path) = (self.inner(), self.path.clone());
        self.storage.spawn(async move {
            match inner.objects.write().await.remove(&path) {
                Some(_) => {
                    debug!(bucket = %inner.bucket, path = %path, "deleted object");
                    Ok(())
                }
                None => Err(inner.not_found(&path)),
            }
        })
    }
}

fn normalize(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<&str>>()
        .join("/")
}
