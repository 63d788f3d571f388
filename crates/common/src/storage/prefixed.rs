use std::sync::Arc;

use async_trait::async_trait;

use super::{Storage, StorageEntry, StorageError};

/// A view over another storage where every key lives under a fixed prefix.
///
/// Mounts are isolated from each other by giving each one a view rooted at
///  its mount UUID, so two mounts sharing a backing store never see each
///  other's config, salt, policy, or data.
#[derive(Debug, Clone)]
pub struct PrefixedStorage {
    inner: Arc<dyn Storage>,
    prefix: String,
}

impl PrefixedStorage {
    pub fn new(inner: Arc<dyn Storage>, prefix: impl Into<String>) -> Self {
        let mut prefix = prefix.into();
        if !prefix.is_empty() && !prefix.ends_with('/') {
            prefix.push('/');
        }
        Self { inner, prefix }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

#[async_trait]
impl Storage for PrefixedStorage {
    async fn get(&self, key: &str) -> Result<Option<StorageEntry>, StorageError> {
        Ok(self
            .inner
            .get(&self.full_key(key))
            .await?
            .map(|entry| StorageEntry::new(key, entry.value)))
    }

    async fn put(&self, entry: &StorageEntry) -> Result<(), StorageError> {
        self.inner
            .put(&StorageEntry::new(self.full_key(&entry.key), entry.value.clone()))
            .await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.inner.delete(&self.full_key(key)).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        self.inner.list(&self.full_key(prefix)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[tokio::test]
    async fn test_prefixed_storage_isolates_mounts() {
        let backing = MemoryStorage::new();
        let a = PrefixedStorage::new(Arc::new(backing.clone()), "mount-a");
        let b = PrefixedStorage::new(Arc::new(backing.clone()), "mount-b/");

        a.put(&StorageEntry::new("config", b"a".to_vec()))
            .await
            .unwrap();
        b.put(&StorageEntry::new("config", b"b".to_vec()))
            .await
            .unwrap();

        assert_eq!(a.get("config").await.unwrap().unwrap().value, b"a");
        assert_eq!(b.get("config").await.unwrap().unwrap().value, b"b");
        assert_eq!(a.get("config").await.unwrap().unwrap().key, "config");
        assert_eq!(a.list("").await.unwrap(), vec!["config"]);
        assert_eq!(backing.keys(), vec!["mount-a/config", "mount-b/config"]);
    }
}
