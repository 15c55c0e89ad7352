//! S3 backend configuration.

use std::time::Duration;

/// Default lifetime of presigned download URLs.
pub const DEFAULT_PRESIGN_EXPIRY: Duration = Duration::from_secs(3600);

/// Settings for an [`S3Storage`](crate::S3Storage).
#[derive(Debug, Clone)]
pub struct S3Settings {
    /// Bucket every reference points into.
    pub bucket: String,
    /// AWS region.
    pub region: String,
    /// Static credentials. The default provider chain is used when unset.
    pub credentials: Option<S3Credentials>,
    /// Custom endpoint, for S3-compatible services.
    pub endpoint_url: Option<String>,
    /// Address buckets by path instead of by virtual host.
    pub force_path_style: bool,
    /// Lifetime of URLs returned by `get_download_url`.
    pub presign_expiry: Duration,
    /// Expected bucket owner for security validation.
    pub expected_bucket_owner: Option<String>,
}

impl Default for S3Settings {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            region: "us-west-2".into(),
            credentials: None,
            endpoint_url: None,
            force_path_style: false,
            presign_expiry: DEFAULT_PRESIGN_EXPIRY,
            expected_bucket_owner: None,
        }
    }
}

impl S3Settings {
    /// Settings for `bucket` with defaults for everything else.
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            ..Default::default()
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_credentials(mut self, credentials: S3Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Point the client at an S3-compatible endpoint. Usually combined with
    /// [`with_force_path_style`](Self::with_force_path_style).
    pub fn with_endpoint_url(mut self, endpoint_url: impl Into<String>) -> Self {
        self.endpoint_url = Some(endpoint_url.into());
        self
    }

    pub fn with_force_path_style(mut self, force_path_style: bool) -> Self {
        self.force_path_style = force_path_style;
        self
    }

    pub fn with_presign_expiry(mut self, expiry: Duration) -> Self {
        self.presign_expiry = expiry;
        self
    }

    pub fn with_expected_bucket_owner(mut self, owner: impl Into<String>) -> Self {
        self.expected_bucket_owner = Some(owner.into());
        self
    }
}

/// Static AWS credentials.
#[derive(Debug, Clone)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}
