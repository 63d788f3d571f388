//! Object Storage Backend
//!
//! This crate implements the engine's [`common::storage::Storage`] trait on
//! top of pluggable object storage (S3/MinIO/local filesystem/memory).
//!
//! Keys map one to one onto object paths, so `/`-separated engine keys become
//! nested objects and single-level listing is a delimiter listing.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use common::storage::Storage;
//! use vkv_object_store::{ObjectStorage, ObjectStoreConfig};
//!
//! # async fn example() -> Result<(), vkv_object_store::ObjectStorageError> {
//! let storage = ObjectStorage::new(ObjectStoreConfig::Local {
//!     path: "/tmp/vkv".into(),
//! })
//! .await?;
//! let storage: Arc<dyn Storage> = Arc::new(storage);
//! # Ok(())
//! # }
//! ```

mod error;
mod storage;

pub use error::{ObjectStorageError, Result};
pub use storage::{ObjectStorage, ObjectStoreConfig};
