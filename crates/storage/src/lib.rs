//! Stream adapters for callback-driven cloud storage SDKs.
//!
//! Storage SDKs report each operation through a task object with success,
//! failure and completion listeners. This crate turns those tasks into
//! `futures` streams:
//!
//! - **[`StorageTask`]** - The listener surface a task must offer
//! - **[`StorageReference`]** - A handle to one stored object, with one
//!   method per SDK operation
//! - **[`ops`]** - One stream-returning entry point per operation
//! - **[`bridge`]** - The listener wiring shared by every entry point
//!
//! # Backends
//!
//! - **[`MemoryStorage`]** - In-process bucket, tasks run on tokio
//! - **`rx-storage-s3`** - Amazon S3 through the AWS SDK for Rust
//!
//! Backends built on other SDKs implement [`StorageReference`] and
//! [`StorageTask`] for their own handle and task types.

pub mod bridge;
mod error;
mod future_task;
pub mod memory;
pub mod ops;
mod reference;
mod task;
mod types;

pub use bridge::{
    bridge, from_task, Signal, Subscribe, Subscription, TaskSingle, TaskStream, TaskTarget,
    Termination,
};
pub use error::StorageError;
pub use future_task::FutureTask;
pub use memory::{MemoryReference, MemoryStorage};
pub use reference::StorageReference;
pub use task::{CompleteListener, FailureListener, StorageTask, SuccessListener};
pub use types::{
    object_name, ByteSource, FileSnapshot, Locator, StorageMetadata, StorageMetadataBuilder,
    StreamProcessor, StreamSnapshot, UploadSnapshot, DEFAULT_CONTENT_TYPE, FILE_SCHEME,
};
