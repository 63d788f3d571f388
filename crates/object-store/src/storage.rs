//! Object storage backend abstraction (S3/MinIO/local filesystem/memory).

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use serde::{Deserialize, Serialize};

use common::storage::{Storage, StorageEntry, StorageError};

use crate::error::{ObjectStorageError, Result};

/// Configuration for the object storage backend.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObjectStoreConfig {
    /// In-memory storage (for testing)
    #[default]
    Memory,

    /// Local filesystem storage
    ///
    /// A key and a directory of the same name cannot coexist on disk, so a
    ///  mount on this backend cannot hold both `a` and `a/b`.
    Local {
        /// Path to the storage directory
        path: PathBuf,
    },

    /// S3-compatible storage (AWS S3, MinIO, etc.)
    S3 {
        /// S3 endpoint URL (e.g., "http://localhost:9000" for MinIO)
        endpoint: String,
        /// Access key ID
        access_key: String,
        /// Secret access key
        secret_key: String,
        /// Bucket name
        bucket: String,
        /// Optional region (defaults to "us-east-1")
        region: Option<String>,
    },
}

/// Engine storage over any [`ObjectStore`].
#[derive(Debug, Clone)]
pub struct ObjectStorage {
    inner: Arc<dyn ObjectStore>,
}

impl ObjectStorage {
    /// Create a new storage backend from configuration.
    pub async fn new(config: ObjectStoreConfig) -> Result<Self> {
        let inner: Arc<dyn ObjectStore> = match &config {
            ObjectStoreConfig::Memory => Arc::new(InMemory::new()),

            ObjectStoreConfig::Local { path } => {
                tokio::fs::create_dir_all(path).await?;
                Arc::new(
                    LocalFileSystem::new_with_prefix(path)
                        .map_err(|e| ObjectStorageError::InvalidConfig(e.to_string()))?,
                )
            }

            ObjectStoreConfig::S3 {
                endpoint,
                access_key,
                secret_key,
                bucket,
                region,
            } => {
                let builder = AmazonS3Builder::new()
                    .with_endpoint(endpoint)
                    .with_access_key_id(access_key)
                    .with_secret_access_key(secret_key)
                    .with_bucket_name(bucket)
                    .with_region(region.as_deref().unwrap_or("us-east-1"))
                    .with_allow_http(endpoint.starts_with("http://"));

                let store: Arc<dyn ObjectStore> = Arc::new(
                    builder
                        .build()
                        .map_err(|e| ObjectStorageError::InvalidConfig(e.to_string()))?,
                );

                // Fail fast if the bucket doesn't exist
                match store.list_with_delimiter(None).await {
                    Ok(_) => {}
                    Err(object_store::Error::NotFound { .. }) => {
                        return Err(ObjectStorageError::BucketNotFound(bucket.clone()));
                    }
                    Err(e) => {
                        let msg = e.to_string();
                        if msg.contains("NoSuchBucket") {
                            return Err(ObjectStorageError::BucketNotFound(bucket.clone()));
                        }
                        return Err(e.into());
                    }
                }

                store
            }
        };

        tracing::debug!(?config, "object storage ready");
        Ok(Self { inner })
    }

    /// Wrap an already constructed store.
    pub fn from_store(inner: Arc<dyn ObjectStore>) -> Self {
        Self { inner }
    }

    /// Create an in-memory storage backend.
    pub fn memory() -> Self {
        Self::from_store(Arc::new(InMemory::new()))
    }

    /// Map an engine key onto an object path.
    ///
    /// Object paths have no empty segments and no `.`/`..` segments, so keys
    ///  containing those are refused rather than silently rewritten.
    fn object_path(key: &str) -> std::result::Result<ObjectPath, StorageError> {
        if key.is_empty() || key.starts_with('/') || key.ends_with('/') {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        ObjectPath::parse(key).map_err(|_| StorageError::InvalidKey(key.to_string()))
    }

    /// Map a listing prefix onto the object directory it names.
    fn list_path(prefix: &str) -> std::result::Result<Option<ObjectPath>, StorageError> {
        let dir = prefix.strip_suffix('/').unwrap_or(prefix);
        if dir.is_empty() {
            return Ok(None);
        }
        Self::object_path(dir).map(Some)
    }
}

fn backend_error(e: object_store::Error) -> StorageError {
    StorageError::Backend(anyhow::Error::new(e))
}

#[async_trait]
impl Storage for ObjectStorage {
    async fn get(&self, key: &str) -> std::result::Result<Option<StorageEntry>, StorageError> {
        let path = Self::object_path(key)?;
        match self.inner.get(&path).await {
            Ok(result) => {
                let bytes = result.bytes().await.map_err(backend_error)?;
                Ok(Some(StorageEntry::new(key, bytes.to_vec())))
            }
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(backend_error(e)),
        }
    }

    async fn put(&self, entry: &StorageEntry) -> std::result::Result<(), StorageError> {
        let path = Self::object_path(&entry.key)?;
        self.inner
            .put(&path, Bytes::from(entry.value.clone()).into())
            .await
            .map_err(backend_error)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> std::result::Result<(), StorageError> {
        let path = Self::object_path(key)?;
        // Ignore NotFound errors - the object may already be deleted
        match self.inner.delete(&path).await {
            Ok(()) => Ok(()),
            Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(backend_error(e)),
        }
    }

    async fn list(&self, prefix: &str) -> std::result::Result<Vec<String>, StorageError> {
        let path = Self::list_path(prefix)?;
        let listing = match self.inner.list_with_delimiter(path.as_ref()).await {
            Ok(listing) => listing,
            Err(object_store::Error::NotFound { .. }) => return Ok(Vec::new()),
            Err(e) => return Err(backend_error(e)),
        };

        let mut children: Vec<String> = listing
            .common_prefixes
            .iter()
            .filter_map(|p| p.filename().map(|name| format!("{}/", name)))
            .chain(
                listing
                    .objects
                    .iter()
                    .filter_map(|meta| meta.location.filename().map(str::to_string)),
            )
            .collect();
        children.sort();
        children.dedup();
        Ok(children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_storage() {
        let storage = ObjectStorage::memory();

        let entry = StorageEntry::new("versions/abc/123", b"hello world".to_vec());
        storage.put(&entry).await.unwrap();
        assert_eq!(storage.get(&entry.key).await.unwrap().unwrap(), entry);

        storage.delete(&entry.key).await.unwrap();
        assert!(storage.get(&entry.key).await.unwrap().is_none());

        // deleting again is fine
        storage.delete(&entry.key).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_marks_directories() {
        let storage = ObjectStorage::memory();
        for key in ["a", "b/c", "b/d/e", "bb"] {
            storage
                .put(&StorageEntry::new(key, b"x".to_vec()))
                .await
                .unwrap();
        }

        assert_eq!(storage.list("").await.unwrap(), vec!["a", "b/", "bb"]);
        assert_eq!(storage.list("b/").await.unwrap(), vec!["c", "d/"]);
        assert!(storage.list("nope/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_local_storage() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = ObjectStoreConfig::Local {
            path: temp_dir.path().to_path_buf(),
        };

        let storage = ObjectStorage::new(config).await.unwrap();

        let entry = StorageEntry::new("salt", b"test data".to_vec());
        storage.put(&entry).await.unwrap();
        assert_eq!(storage.get("salt").await.unwrap().unwrap(), entry);

        // Verify file exists on disk
        assert!(temp_dir.path().join("salt").exists());
        assert!(storage.list("missing/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_unmappable_keys() {
        let storage = ObjectStorage::memory();
        for key in ["", "a//b", "a/", "/a", "a/../b"] {
            let result = storage.put(&StorageEntry::new(key, b"x".to_vec())).await;
            assert!(
                matches!(result, Err(StorageError::InvalidKey(_))),
                "key {:?} should be rejected",
                key
            );
        }
    }

    #[test]
    fn test_config_serde_shape() {
        let config: ObjectStoreConfig =
            serde_json::from_str(r#"{"type":"local","path":"/var/lib/vkv"}"#).unwrap();
        assert_eq!(
            config,
            ObjectStoreConfig::Local {
                path: PathBuf::from("/var/lib/vkv")
            }
        );
        assert_eq!(
            serde_json::from_str::<ObjectStoreConfig>(r#"{"type":"memory"}"#).unwrap(),
            ObjectStoreConfig::Memory
        );
    }
}
