//! Physical storage abstraction
//!
//! Everything the engine persists goes through the [`Storage`] trait: a flat
//! key space with `/`-separated keys and single-level directory listing.
//!
//! - **[`MemoryStorage`]**: in-process map, used for tests and ephemeral mounts
//! - **[`PrefixedStorage`]**: scopes any storage to a mount UUID prefix
//! - **[`EncryptedKeyStorage`]**: rewrites every path segment through the
//!   convergent path policy before delegating

mod encrypted;
mod memory;
mod prefixed;

use std::fmt::Debug;

use async_trait::async_trait;

pub use encrypted::{EncryptedKeyStorage, EncryptedKeyStorageError, METADATA_PREFIX};
pub use memory::MemoryStorage;
pub use prefixed::PrefixedStorage;

/// A single record in storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEntry {
    pub key: String,
    pub value: Vec<u8>,
}

impl StorageEntry {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage backend error: {0}")]
    Backend(#[from] anyhow::Error),
    #[error("invalid storage key: {0}")]
    InvalidKey(String),
    #[error("path encryption error: {0}")]
    Encryption(#[from] EncryptedKeyStorageError),
}

#[async_trait]
pub trait Storage: Send + Sync + Debug + 'static {
    /// Fetch the entry stored at `key`
    ///
    /// # Returns
    /// * `Ok(None)` - Nothing is stored at `key`
    async fn get(&self, key: &str) -> Result<Option<StorageEntry>, StorageError>;

    /// Store an entry, replacing anything already at its key
    async fn put(&self, entry: &StorageEntry) -> Result<(), StorageError>;

    /// Remove the entry at `key`. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// List the immediate children of `prefix`
    ///
    /// Children that have descendants of their own are returned with a
    ///  trailing `/`. Leaves are returned bare. Names are relative to `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

/// Recursively collect every leaf key under `prefix`
///
/// Returned keys are relative to `prefix`. The `skip` predicate is applied
///  to each child name at the top level only, which lets callers step
///  around reserved directories.
pub async fn scan_leaves<F>(
    storage: &dyn Storage,
    prefix: &str,
    skip: F,
) -> Result<Vec<String>, StorageError>
where
    F: Fn(&str) -> bool,
{
    let mut leaves = Vec::new();
    let mut pending: Vec<String> = storage
        .list(prefix)
        .await?
        .into_iter()
        .filter(|child| !skip(child))
        .collect();

    while let Some(relative) = pending.pop() {
        if relative.ends_with('/') {
            let children = storage.list(&format!("{}{}", prefix, relative)).await?;
            pending.extend(children.into_iter().map(|c| format!("{}{}", relative, c)));
        } else {
            leaves.push(relative);
        }
    }

    leaves.sort();
    Ok(leaves)
}
