//! AWS SDK S3 storage references.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::operation::get_object::GetObjectOutput;
use aws_sdk_s3::operation::head_object::HeadObjectOutput;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::MetadataDirective;
use aws_sdk_s3::Client as S3Client;
use bytes::{Bytes, BytesMut};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::runtime::Handle;
use tracing::debug;

use rx_storage::{
    object_name, ByteSource, FileSnapshot, FutureTask, Locator, StorageError, StorageMetadata,
    StorageReference, StreamProcessor, StreamSnapshot, UploadSnapshot, DEFAULT_CONTENT_TYPE,
};

use crate::error::{classify, S3Error};
use crate::settings::S3Settings;

/// Scheme of locators naming S3 objects.
pub const S3_SCHEME: &str = "s3://";

struct Inner {
    client: S3Client,
    settings: S3Settings,
    handle: Handle,
}

/// One S3 bucket, with references to the objects in it.
///
/// Operations run as [`FutureTask`]s on the runtime the storage was created
/// on. The SDK client retries and pools connections on its own.
#[derive(Clone)]
pub struct S3Storage {
    inner: Arc<Inner>,
}

impl S3Storage {
    /// Create a storage with the default credential chain, or the static
    /// credentials in `settings`.
    ///
    /// # Arguments
    /// * `settings` - Bucket, region and client options
    ///
    /// # Errors
    /// Returns `StorageError::InvalidConfig` if the bucket name is empty.
    pub async fn new(settings: S3Settings) -> Result<Self, StorageError> {
        let config_loader = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(settings.region.clone()));

        let config_loader = if let Some(ref creds) = settings.credentials {
            let credentials = Credentials::new(
                &creds.access_key_id,
                &creds.secret_access_key,
                creds.session_token.clone(),
                None,
                "rx-storage",
            );
            config_loader.credentials_provider(credentials)
        } else {
            config_loader
        };

        let sdk_config = config_loader.load().await;
        let mut s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(settings.force_path_style);
        if let Some(ref endpoint_url) = settings.endpoint_url {
            s3_config = s3_config.endpoint_url(endpoint_url);
        }

        Self::from_client(S3Client::from_conf(s3_config.build()), settings)
    }

    /// Create a storage from an existing client.
    ///
    /// Only the bucket, presign expiry and expected owner are read from
    /// `settings`; the client carries its own region and credentials.
    ///
    /// # Errors
    /// Returns `StorageError::InvalidConfig` if the bucket name is empty or
    /// no tokio runtime is running.
    pub fn from_client(client: S3Client, settings: S3Settings) -> Result<Self, StorageError> {
        if settings.bucket.is_empty() {
            return Err(S3Error::ConfigError("bucket name is empty".into()).into());
        }
        let handle: Handle = Handle::try_current()
            .map_err(|e| S3Error::ConfigError(format!("S3 storage needs a tokio runtime: {}", e)))?;

        Ok(Self {
            inner: Arc::new(Inner {
                client,
                settings,
                handle,
            }),
        })
    }

    /// Bucket name.
    pub fn bucket(&self) -> &str {
        &self.inner.settings.bucket
    }

    /// The underlying SDK client.
    pub fn client(&self) -> &S3Client {
        &self.inner.client
    }

    /// Reference to the object at `key`. Leading slashes are ignored.
    pub fn reference(&self, key: impl AsRef<str>) -> S3Reference {
        S3Reference {
            storage: self.clone(),
            key: key.as_ref().trim_start_matches('/').to_string(),
        }
    }

    /// Resolve an `s3://bucket/key` locator.
    ///
    /// # Errors
    /// Returns `StorageError::InvalidLocator` for other schemes or buckets.
    pub fn reference_from_url(&self, url: &Locator) -> Result<S3Reference, StorageError> {
        let invalid = |message: &str| StorageError::InvalidLocator {
            locator: url.to_string(),
            message: message.to_string(),
        };

        let rest: &str = url
            .as_str()
            .strip_prefix(S3_SCHEME)
            .ok_or_else(|| invalid("expected an s3:// URL"))?;
        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket != self.bucket() {
            return Err(invalid("URL names a different bucket"));
        }
        Ok(self.reference(key))
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
    fn bucket(&self) -> &str {
        &self.settings.bucket
    }

    fn owner(&self) -> Option<String> {
        self.settings.expected_bucket_owner.clone()
    }

    async fn head(&self, key: &str) -> Result<HeadObjectOutput, StorageError> {
        self.client
            .head_object()
            .bucket(self.bucket())
            .key(key)
            .set_expected_bucket_owner(self.owner())
            .send()
            .await
            .map_err(|err| classify(err, self.bucket(), key))
    }

    async fn get(&self, key: &str) -> Result<GetObjectOutput, StorageError> {
        self.client
            .get_object()
            .bucket(self.bucket())
            .key(key)
            .set_expected_bucket_owner(self.owner())
            .send()
            .await
            .map_err(|err| classify(err, self.bucket(), key))
    }

    async fn get_bytes(&self, key: &str, limit: u64) -> Result<Vec<u8>, StorageError> {
        let response: GetObjectOutput = self.get(key).await?;
        // Chunked responses carry no length; `read_body` enforces the limit.
        if let Some(length) = response.content_length() {
            check_size(key, length.max(0) as u64, limit)?;
        }
        Ok(read_body(response.body, key, limit).await?.to_vec())
    }

    async fn presign(&self, key: &str) -> Result<Locator, StorageError> {
        // Fail for missing objects instead of handing out a dead URL.
        self.head(key).await?;

        let presigning_config = PresigningConfig::expires_in(self.settings.presign_expiry)
            .map_err(|e| S3Error::ConfigError(e.to_string()))?;
        let request = self
            .client
            .get_object()
            .bucket(self.bucket())
            .key(key)
            .set_expected_bucket_owner(self.owner())
            .presigned(presigning_config)
            .await
            .map_err(|err| classify(err, self.bucket(), key))?;

        Ok(Locator::new(request.uri().to_string()))
    }

    async fn write_file(&self, key: &str, destination: PathBuf) -> Result<FileSnapshot, StorageError> {
        let response: GetObjectOutput = self.get(key).await?;
        let total_bytes: u64 = response.content_length().unwrap_or(0).max(0) as u64;
        let file_path: String = destination.display().to_string();

        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StorageError::from_io(parent.display().to_string(), e))?;
            }
        }

        let mut file: File = File::create(&destination)
            .await
            .map_err(|e| StorageError::from_io(file_path.clone(), e))?;

        let mut bytes_transferred: u64 = 0;
        let mut body: ByteStream = response.body;
        while let Some(chunk) = body.try_next().await.map_err(|e| body_error(key, e))? {
            file.write_all(&chunk)
                .await
                .map_err(|e| StorageError::from_io(file_path.clone(), e))?;
            bytes_transferred += chunk.len() as u64;
        }

        file.flush()
            .await
            .map_err(|e| StorageError::from_io(file_path.clone(), e))?;

        debug!(bucket = %self.bucket(), key, bytes_transferred, path = %file_path, "downloaded object");
        Ok(FileSnapshot {
            bytes_transferred,
            total_bytes,
            destination,
        })
    }

    async fn get_stream(&self, key: &str) -> Result<StreamSnapshot, StorageError> {
        let response: GetObjectOutput = self.get(key).await?;
        let body: Bytes = read_body(response.body, key, u64::MAX).await?;
        Ok(StreamSnapshot {
            total_bytes: body.len() as u64,
            body,
        })
    }

    async fn update_metadata(
        &self,
        key: &str,
        update: StorageMetadata,
    ) -> Result<StorageMetadata, StorageError> {
        let mut merged: StorageMetadata = metadata_from_head(self.bucket(), key, &self.head(key).await?);
        merged.merge_update(&update);

        // S3 metadata is immutable; copying the object onto itself replaces it.
        self.client
            .copy_object()
            .bucket(self.bucket())
            .key(key)
            .copy_source(copy_source(self.bucket(), key))
            .metadata_directive(MetadataDirective::Replace)
            .set_content_type(merged.content_type.clone())
            .set_cache_control(merged.cache_control.clone())
            .set_content_disposition(merged.content_disposition.clone())
            .set_content_encoding(merged.content_encoding.clone())
            .set_content_language(merged.content_language.clone())
            .set_metadata(Some(merged.custom_metadata.clone()))
            .set_expected_bucket_owner(self.owner())
            .send()
            .await
            .map_err(|err| classify(err, self.bucket(), key))?;

        Ok(metadata_from_head(self.bucket(), key, &self.head(key).await?))
    }

    async fn upload(
        &self,
        key: &str,
        body: ByteStream,
        size: u64,
        metadata: Option<StorageMetadata>,
        session: Option<Locator>,
    ) -> Result<UploadSnapshot, StorageError> {
        let metadata: StorageMetadata = metadata.unwrap_or_default();
        let content_type: String = metadata
            .content_type
            .clone()
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
        let custom: HashMap<String, String> = metadata
            .custom_metadata
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let output = self
            .client
            .put_object()
            .bucket(self.bucket())
            .key(key)
            .body(body)
            .content_type(&content_type)
            .set_cache_control(metadata.cache_control.clone())
            .set_content_disposition(metadata.content_disposition.clone())
            .set_content_encoding(metadata.content_encoding.clone())
            .set_content_language(metadata.content_language.clone())
            .set_metadata((!custom.is_empty()).then_some(custom))
            .set_expected_bucket_owner(self.owner())
            .send()
            .await
            .map_err(|err| classify(err, self.bucket(), key))?;

        let mut stored: StorageMetadata = StorageMetadata {
            bucket: Some(self.bucket().to_string()),
            path: Some(key.to_string()),
            name: Some(object_name(key).to_string()),
            size,
            generation: output.version_id().map(str::to_string),
            etag: output.e_tag().map(str::to_string),
            content_type: Some(content_type),
            ..Default::default()
        };
        stored.merge_update(&metadata);

        debug!(bucket = %self.bucket(), key, size, "uploaded object");
        Ok(UploadSnapshot {
            bytes_transferred: size,
            total_bytes: size,
            metadata: stored,
            upload_session: session,
        })
    }

    async fn upload_file(
        &self,
        key: &str,
        source: Locator,
        metadata: Option<StorageMetadata>,
        session: Option<Locator>,
    ) -> Result<UploadSnapshot, StorageError> {
        let path: PathBuf = source.to_file_path()?;
        let (body, size) = file_body(&path).await?;
        self.upload(key, body, size, metadata, session).await
    }

    async fn upload_source(
        &self,
        key: &str,
        mut source: ByteSource,
        metadata: Option<StorageMetadata>,
    ) -> Result<UploadSnapshot, StorageError> {
        let mut buffer: Vec<u8> = Vec::new();
        source
            .read_to_end(&mut buffer)
            .await
            .map_err(|e| S3Error::IoError {
                path: format!("upload source for {}", key),
                source: e,
            })?;
        let size: u64 = buffer.len() as u64;
        self.upload(key, ByteStream::from(buffer), size, metadata, None)
            .await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(self.bucket())
            .key(key)
            .set_expected_bucket_owner(self.owner())
            .send()
            .await
            .map_err(|err| classify(err, self.bucket(), key))?;

        debug!(bucket = %self.bucket(), key, "deleted object");
        Ok(())
    }
}

fn check_size(key: &str, size: u64, limit: u64) -> Result<(), StorageError> {
    if size > limit {
        return Err(StorageError::SizeExceeded {
            path: key.to_string(),
            size,
            limit,
        });
    }
    Ok(())
}

/// Read a whole body, failing as soon as more than `limit` bytes arrived.
async fn read_body(mut body: ByteStream, key: &str, limit: u64) -> Result<Bytes, StorageError> {
    let mut buffer: BytesMut = BytesMut::new();
    while let Some(chunk) = body.try_next().await.map_err(|e| body_error(key, e))? {
        check_size(key, (buffer.len() + chunk.len()) as u64, limit)?;
        buffer.extend_from_slice(&chunk);
    }
    Ok(buffer.freeze())
}

fn body_error(key: &str, err: impl std::fmt::Display) -> StorageError {
    S3Error::BodyError {
        key: key.to_string(),
        message: err.to_string(),
    }
    .into()
}

/// `bucket/key` copy source with each key segment percent-encoded.
fn copy_source(bucket: &str, key: &str) -> String {
    let key: String = key
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<String>>()
        .join("/");
    format!("{}/{}", bucket, key)
}

async fn file_body(path: &Path) -> Result<(ByteStream, u64), StorageError> {
    let file_path: String = path.display().to_string();
    let size: u64 = tokio::fs::metadata(path)
        .await
        .map_err(|e| S3Error::IoError {
            path: file_path.clone(),
            source: e,
        })?
        .len();
    let body: ByteStream = ByteStream::from_path(path)
        .await
        .map_err(|e| StorageError::IoError {
            path: file_path,
            message: e.to_string(),
        })?;
    Ok((body, size))
}

/// Convert a HEAD response into a metadata record.
pub(crate) fn metadata_from_head(bucket: &str, key: &str, output: &HeadObjectOutput) -> StorageMetadata {
    let updated_millis: Option<i64> = output.last_modified().and_then(|dt| dt.to_millis().ok());

    StorageMetadata {
        bucket: Some(bucket.to_string()),
        path: Some(key.to_string()),
        name: Some(object_name(key).to_string()),
        size: output.content_length().unwrap_or(0).max(0) as u64,
        generation: output.version_id().map(str::to_string),
        md5_hash: None,
        etag: output.e_tag().map(str::to_string),
        created_millis: None,
        updated_millis,
        content_type: output.content_type().map(str::to_string),
        cache_control: output.cache_control().map(str::to_string),
        content_disposition: output.content_disposition().map(str::to_string),
        content_encoding: output.content_encoding().map(str::to_string),
        content_language: output.content_language().map(str::to_string),
        custom_metadata: output.metadata().cloned().unwrap_or_default(),
    }
}

/// Handle to one object in an [`S3Storage`] bucket.
#[derive(Clone)]
pub struct S3Reference {
    storage: S3Storage,
    key: String,
}

impl S3Reference {
    /// Object key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Last key segment.
    pub fn name(&self) -> &str {
        object_name(&self.key)
    }

    pub fn bucket(&self) -> &str {
        self.storage.bucket()
    }

    /// Reference to a key below this one.
    pub fn child(&self, relative: &str) -> S3Reference {
        let relative: &str = relative.trim_matches('/');
        if self.key.is_empty() {
            self.storage.reference(relative)
        } else {
            self.storage
                .reference(format!("{}/{}", self.key.trim_end_matches('/'), relative))
        }
    }

    /// `s3://bucket/key` locator of this object.
    pub fn locator(&self) -> Locator {
        Locator::new(format!("{}{}/{}", S3_SCHEME, self.bucket(), self.key))
    }

    fn inner(&self) -> Arc<Inner> {
        self.storage.inner.clone()
    }
}

impl std::fmt::Debug for S3Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}/{}", S3_SCHEME, self.bucket(), self.key)
    }
}

impl StorageReference for S3Reference {
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
        let (inner, key) = (self.inner(), self.key.clone());
        self.storage
            .spawn(async move { inner.get_bytes(&key, max_download_size).await })
    }

    fn get_download_url(&self) -> FutureTask<Locator> {
        let (inner, key) = (self.inner(), self.key.clone());
        self.storage.spawn(async move { inner.presign(&key).await })
    }

    fn get_file(&self, destination: PathBuf) -> FutureTask<FileSnapshot> {
        let (inner, key) = (self.inner(), self.key.clone());
        self.storage
            .spawn(async move { inner.write_file(&key, destination).await })
    }

    fn get_file_to_locator(&self, destination: Locator) -> FutureTask<FileSnapshot> {
        let (inner, key) = (self.inner(), self.key.clone());
        self.storage.spawn(async move {
            let destination: PathBuf = destination.to_file_path()?;
            inner.write_file(&key, destination).await
        })
    }

    fn get_stream(&self) -> FutureTask<StreamSnapshot> {
        let (inner, key) = (self.inner(), self.key.clone());
        self.storage.spawn(async move { inner.get_stream(&key).await })
    }

    fn get_stream_with_processor(
        &self,
        processor: Arc<dyn StreamProcessor>,
    ) -> FutureTask<StreamSnapshot> {
        let (inner, key) = (self.inner(), self.key.clone());
        self.storage.spawn(async move {
            let snapshot: StreamSnapshot = inner.get_stream(&key).await?;
            let mut reader = snapshot.stream();
            processor.process(&snapshot, &mut reader).await?;
            Ok(snapshot)
        })
    }

    fn get_metadata(&self) -> FutureTask<StorageMetadata> {
        let (inner, key) = (self.inner(), self.key.clone());
        self.storage.spawn(async move {
            let output: HeadObjectOutput = inner.head(&key).await?;
            Ok(metadata_from_head(inner.bucket(), &key, &output))
        })
    }

    fn update_metadata(&self, metadata: StorageMetadata) -> FutureTask<StorageMetadata> {
        let (inner, key) = (self.inner(), self.key.clone());
        self.storage
            .spawn(async move { inner.update_metadata(&key, metadata).await })
    }

    fn put_bytes(&self, data: Vec<u8>) -> FutureTask<UploadSnapshot> {
        let (inner, key) = (self.inner(), self.key.clone());
        self.storage.spawn(async move {
            let size: u64 = data.len() as u64;
            inner
                .upload(&key, ByteStream::from(data), size, None, None)
                .await
        })
    }

    fn put_bytes_with_metadata(
        &self,
        data: Vec<u8>,
        metadata: StorageMetadata,
    ) -> FutureTask<UploadSnapshot> {
        let (inner, key) = (self.inner(), self.key.clone());
        self.storage.spawn(async move {
            let size: u64 = data.len() as u64;
            inner
                .upload(&key, ByteStream::from(data), size, Some(metadata), None)
                .await
        })
    }

    fn put_file(&self, source: Locator) -> FutureTask<UploadSnapshot> {
        let (inner, key) = (self.inner(), self.key.clone());
        self.storage
            .spawn(async move { inner.upload_file(&key, source, None, None).await })
    }

    fn put_file_with_metadata(
        &self,
        source: Locator,
        metadata: StorageMetadata,
    ) -> FutureTask<UploadSnapshot> {
        let (inner, key) = (self.inner(), self.key.clone());
        self.storage.spawn(async move {
            inner
                .upload_file(&key, source, Some(metadata), None)
                .await
        })
    }

    /// S3 has no resumable session URIs. The file is uploaded in one
    /// request and `session` is echoed in the snapshot.
    fn put_file_resumable(
        &self,
        source: Locator,
        metadata: StorageMetadata,
        session: Locator,
    ) -> FutureTask<UploadSnapshot> {
        let (inner, key) = (self.inner(), self.key.clone());
        self.storage.spawn(async move {
            debug!(key = %key, session = %session, "resumable upload sent as a single put");
            inner
                .upload_file(&key, source, Some(metadata), Some(session))
                .await
        })
    }

    fn put_stream(&self, source: ByteSource) -> FutureTask<UploadSnapshot> {
        let (inner, key) = (self.inner(), self.key.clone());
        self.storage
            .spawn(async move { inner.upload_source(&key, source, None).await })
    }

    fn put_stream_with_metadata(
        &self,
        source: ByteSource,
        metadata: StorageMetadata,
    ) -> FutureTask<UploadSnapshot> {
        let (inner, key) = (self.inner(), self.key.clone());
        self.storage.spawn(async move {
            inner
                .upload_source(&key, source, Some(metadata))
                .await
        })
    }

    /// S3 reports success for keys that do not exist.
    fn delete(&self) -> FutureTask<()> {
        let (inner, key) = (self.inner(), self.key.clone());
        self.storage.spawn(async move { inner.delete(&key).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::config::Region;
    use aws_sdk_s3::primitives::DateTime;

    fn offline_storage(bucket: &str) -> S3Storage {
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-west-2"))
            .build();
        S3Storage::from_client(S3Client::from_conf(config), S3Settings::new(bucket)).unwrap()
    }

    #[test]
    fn test_s3_reference_implements_storage_reference() {
        // This is a compile-time test to ensure the trait is implemented correctly
        fn assert_storage_reference<T: StorageReference>() {}
        assert_storage_reference::<S3Reference>();
    }

    #[test]
    fn test_metadata_from_head() {
        let output: HeadObjectOutput = HeadObjectOutput::builder()
            .content_length(5)
            .content_type("text/plain")
            .cache_control("no-cache")
            .e_tag("\"abc\"")
            .version_id("v1")
            .last_modified(DateTime::from_millis(1_700_000_000_000))
            .metadata("owner", "tom")
            .build();

        let metadata: StorageMetadata = metadata_from_head("photos", "cats/tom.txt", &output);
        assert_eq!(metadata.bucket.as_deref(), Some("photos"));
        assert_eq!(metadata.name.as_deref(), Some("tom.txt"));
        assert_eq!(metadata.size, 5);
        assert_eq!(metadata.generation.as_deref(), Some("v1"));
        assert_eq!(metadata.etag.as_deref(), Some("\"abc\""));
        assert_eq!(metadata.updated_millis, Some(1_700_000_000_000));
        assert_eq!(metadata.content_type.as_deref(), Some("text/plain"));
        assert_eq!(metadata.cache_control.as_deref(), Some("no-cache"));
        assert_eq!(metadata.custom_metadata.get("owner").map(String::as_str), Some("tom"));
    }

    #[tokio::test]
    async fn test_read_body_within_limit() {
        let body: ByteStream = ByteStream::from(b"0123456789".to_vec());
        let data: Bytes = read_body(body, "digits.txt", 10).await.unwrap();
        assert_eq!(&data[..], b"0123456789");
    }

    #[tokio::test]
    async fn test_read_body_stops_past_limit() {
        // No Content-Length to check up front; the limit applies while reading.
        let body: ByteStream = ByteStream::from(vec![0u8; 64]);
        let result = read_body(body, "big.bin", 16).await;
        assert_eq!(
            result,
            Err(StorageError::SizeExceeded {
                path: "big.bin".into(),
                size: 64,
                limit: 16,
            })
        );
    }

    #[test]
    fn test_check_size() {
        assert!(check_size("a", 16, 16).is_ok());
        assert!(matches!(
            check_size("a", 17, 16),
            Err(StorageError::SizeExceeded { size: 17, .. })
        ));
    }

    #[test]
    fn test_copy_source_encodes_key_segments() {
        assert_eq!(copy_source("photos", "cats/tom.png"), "photos/cats/tom.png");
        assert_eq!(
            copy_source("photos", "my cats/tom+jerry 100%.png"),
            "photos/my%20cats/tom%2Bjerry%20100%25.png"
        );
        assert_eq!(copy_source("photos", "café/ü.png"), "photos/caf%C3%A9/%C3%BC.png");
    }

    #[tokio::test]
    async fn test_from_client_rejects_empty_bucket() {
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-west-2"))
            .build();
        let result = S3Storage::from_client(S3Client::from_conf(config), S3Settings::default());
        assert!(matches!(result, Err(StorageError::InvalidConfig { .. })));
    }

    #[tokio::test]
    async fn test_reference_keys() {
        let storage: S3Storage = offline_storage("photos");
        let reference: S3Reference = storage.reference("/cats/tom.png");
        assert_eq!(reference.key(), "cats/tom.png");
        assert_eq!(reference.name(), "tom.png");
        assert_eq!(reference.locator().as_str(), "s3://photos/cats/tom.png");
        assert_eq!(storage.reference("cats").child("/tom.png").key(), "cats/tom.png");
    }

    #[tokio::test]
    async fn test_reference_from_url() {
        let storage: S3Storage = offline_storage("photos");
        let url = Locator::from("s3://photos/cats/tom.png");
        assert_eq!(storage.reference_from_url(&url).unwrap().key(), "cats/tom.png");

        let other = Locator::from("s3://videos/cats/tom.png");
        assert!(matches!(
            storage.reference_from_url(&other),
            Err(StorageError::InvalidLocator { .. })
        ));
        let memory = Locator::from("memory://photos/cats/tom.png");
        assert!(storage.reference_from_url(&memory).is_err());
    }

    #[tokio::test]
    async fn test_put_file_rejects_remote_locator_before_request() {
        let storage: S3Storage = offline_storage("photos");
        let reference: S3Reference = storage.reference("cats/tom.png");

        let result =
            rx_storage::ops::put_file(&reference, Locator::from("https://example.com/tom.png"))
                .await;
        assert!(matches!(result, Err(StorageError::InvalidLocator { .. })));
    }

    #[tokio::test]
    async fn test_put_file_missing_source() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let storage: S3Storage = offline_storage("photos");
        let reference: S3Reference = storage.reference("cats/tom.png");
        let missing: Locator = Locator::from_path(&temp_dir.path().join("missing.png"));

        let result = rx_storage::ops::put_file(&reference, missing).await;
        assert!(matches!(result, Err(StorageError::IoError { .. })));
    }
}
