use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use super::{Storage, StorageEntry, StorageError};

/// In-memory storage backed by an ordered map
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every key currently stored, in order. Useful for asserting
    ///  what actually reached the backing store.
    pub fn keys(&self) -> Vec<String> {
        match self.inner.read() {
            Ok(inner) => inner.keys().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().keys().cloned().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.keys().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn lock_error(e: impl std::fmt::Display) -> StorageError {
    StorageError::Backend(anyhow::anyhow!("failed to acquire storage lock: {}", e))
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<StorageEntry>, StorageError> {
        let inner = self.inner.read().map_err(lock_error)?;
        Ok(inner
            .get(key)
            .map(|value| StorageEntry::new(key, value.clone())))
    }

    async fn put(&self, entry: &StorageEntry) -> Result<(), StorageError> {
        if entry.key.is_empty() {
            return Err(StorageError::InvalidKey(entry.key.clone()));
        }
        let mut inner = self.inner.write().map_err(lock_error)?;
        inner.insert(entry.key.clone(), entry.value.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut inner = self.inner.write().map_err(lock_error)?;
        inner.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let inner = self.inner.read().map_err(lock_error)?;

        // BTreeMap keeps keys ordered, so every key under `prefix`
        //  sits in one contiguous range
        let mut children = BTreeSet::new();
        for key in inner
            .range(prefix.to_string()..)
            .map(|(k, _)| k)
            .take_while(|k| k.starts_with(prefix))
        {
            let relative = &key[prefix.len()..];
            match relative.find('/') {
                Some(pos) => children.insert(relative[..=pos].to_string()),
                None => children.insert(relative.to_string()),
            };
        }

        Ok(children.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_storage_crud() {
        let storage = MemoryStorage::new();

        let entry = StorageEntry::new("foo/bar", b"hello".to_vec());
        storage.put(&entry).await.unwrap();

        let fetched = storage.get("foo/bar").await.unwrap().unwrap();
        assert_eq!(fetched, entry);
        assert!(storage.get("foo").await.unwrap().is_none());

        storage.delete("foo/bar").await.unwrap();
        assert!(storage.get("foo/bar").await.unwrap().is_none());

        // deleting again is fine
        storage.delete("foo/bar").await.unwrap();
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_memory_storage_list_marks_directories() {
        let storage = MemoryStorage::new();
        for key in ["a", "b/c", "b/d/e", "bb", "c/"] {
            storage
                .put(&StorageEntry::new(key, b"x".to_vec()))
                .await
                .unwrap();
        }

        assert_eq!(
            storage.list("").await.unwrap(),
            vec!["a", "b/", "bb", "c/"]
        );
        assert_eq!(storage.list("b/").await.unwrap(), vec!["c", "d/"]);
        assert!(storage.list("nope/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_storage_rejects_empty_key() {
        let storage = MemoryStorage::new();
        let result = storage.put(&StorageEntry::new("", b"x".to_vec())).await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
    }
}
