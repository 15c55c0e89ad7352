//! Amazon S3 backend for rx-storage.
//!
//! [`S3Reference`] implements `StorageReference` over the AWS SDK for Rust,
//! so every stream adapter in `rx_storage::ops` works against a real bucket.
//!
//! # Example
//!
//! ```ignore
//! use futures::TryStreamExt;
//! use rx_storage::ops;
//! use rx_storage_s3::{S3Settings, S3Storage};
//!
//! let settings = S3Settings::new("my-bucket").with_region("eu-west-1");
//! let storage = S3Storage::new(settings).await?;
//! let reference = storage.reference("reports/2024.csv");
//!
//! ops::put_bytes(&reference, csv_bytes).await?;
//! let url = ops::get_download_url(&reference).try_next().await?;
//! ```

mod client;
mod error;
mod settings;

pub use client::{S3Reference, S3Storage, S3_SCHEME};
pub use error::S3Error;
pub use settings::{S3Credentials, S3Settings, DEFAULT_PRESIGN_EXPIRY};
