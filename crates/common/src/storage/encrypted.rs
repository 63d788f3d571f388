use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use super::{Storage, StorageEntry, StorageError};
use crate::crypto::{Policy, PolicyError};

/// Storage prefix key metadata is written under
pub const METADATA_PREFIX: &str = "metadata/";

#[derive(Debug, thiserror::Error)]
pub enum EncryptedKeyStorageError {
    #[error("failed to encrypt path segment: {0}")]
    Encrypt(#[source] Box<PolicyError>),
    #[error("failed to decrypt path segment: {0}")]
    Decrypt(#[source] Box<PolicyError>),
    #[error("invalid path segment encoding: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("decrypted path segment is not valid utf-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Storage wrapper that encrypts every segment of a logical path
///
/// Each non-empty segment is encrypted convergently under a context built
///  from the storage prefix and the *encrypted* form of every segment before
///  it, then encoded as unpadded url-safe base64. Empty segments are kept in
///  place so trailing `/` and directory positions survive the transformation.
///
/// ```text
/// logical:  x/y/z
/// stored:   metadata/E(ctx="metadata", "x")/E(ctx="metadata/<ex>", "y")/E(ctx="metadata/<ex>/<ey>", "z")
/// ```
///
/// Rotating the policy never rewrites existing paths. Reads therefore try
///  every key version, newest first, and writes clean up variants left
///  behind by older versions.
#[derive(Debug, Clone)]
pub struct EncryptedKeyStorage {
    inner: Arc<dyn Storage>,
    policy: Arc<Policy>,
    prefix: String,
}

impl EncryptedKeyStorage {
    pub fn new(inner: Arc<dyn Storage>, policy: Arc<Policy>, prefix: impl Into<String>) -> Self {
        let mut prefix = prefix.into();
        if !prefix.is_empty() && !prefix.ends_with('/') {
            prefix.push('/');
        }
        Self {
            inner,
            policy,
            prefix,
        }
    }

    /// Wrap `inner` with the standard `metadata/` prefix
    pub fn metadata(inner: Arc<dyn Storage>, policy: Arc<Policy>) -> Self {
        Self::new(inner, policy, METADATA_PREFIX)
    }

    pub fn policy(&self) -> &Arc<Policy> {
        &self.policy
    }

    fn root_context(&self) -> &str {
        self.prefix.strip_suffix('/').unwrap_or(&self.prefix)
    }

    /// Encrypt `path` under key `version`
    ///
    /// Returns the encrypted relative path along with the context the next
    ///  segment below it would be encrypted under.
    fn transform(&self, version: u32, path: &str) -> Result<(String, String), EncryptedKeyStorageError> {
        let mut context = self.root_context().to_string();
        let mut segments = Vec::new();

        for segment in path.split('/') {
            if segment.is_empty() {
                segments.push(String::new());
                context.push('/');
                continue;
            }

            let ciphertext = self
                .policy
                .encrypt_with_version(version, context.as_bytes(), segment.as_bytes())
                .map_err(|e| EncryptedKeyStorageError::Encrypt(Box::new(e)))?;
            let encoded = URL_SAFE_NO_PAD.encode(ciphertext);

            context.push('/');
            context.push_str(&encoded);
            segments.push(encoded);
        }

        Ok((segments.join("/"), context))
    }

    /// Full storage key for `path` under key `version`
    pub fn storage_key(&self, version: u32, path: &str) -> Result<String, EncryptedKeyStorageError> {
        let (encrypted, _) = self.transform(version, path)?;
        Ok(format!("{}{}", self.prefix, encrypted))
    }

    /// Storage prefix to list for the directory `prefix`, and the context its
    ///  children were encrypted under
    fn list_target(&self, version: u32, prefix: &str) -> Result<(String, String), EncryptedKeyStorageError> {
        let dir = prefix.strip_suffix('/').unwrap_or(prefix);
        if dir.is_empty() {
            return Ok((self.prefix.clone(), self.root_context().to_string()));
        }

        let (encrypted, context) = self.transform(version, dir)?;
        Ok((format!("{}{}/", self.prefix, encrypted), context))
    }

    fn decrypt_child(&self, context: &str, child: &str) -> Result<String, EncryptedKeyStorageError> {
        let (name, is_dir) = match child.strip_suffix('/') {
            Some(name) => (name, true),
            None => (child, false),
        };
        if name.is_empty() {
            return Ok(child.to_string());
        }

        let ciphertext = URL_SAFE_NO_PAD.decode(name)?;
        let plaintext = self
            .policy
            .decrypt(context.as_bytes(), &ciphertext)
            .map_err(|e| EncryptedKeyStorageError::Decrypt(Box::new(e)))?;
        let mut segment = String::from_utf8(plaintext)?;
        if is_dir {
            segment.push('/');
        }
        Ok(segment)
    }

    fn check_key(key: &str) -> Result<(), StorageError> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for EncryptedKeyStorage {
    async fn get(&self, key: &str) -> Result<Option<StorageEntry>, StorageError> {
        Self::check_key(key)?;
        for version in self.policy.versions() {
            let storage_key = self.storage_key(version, key)?;
            if let Some(entry) = self.inner.get(&storage_key).await? {
                return Ok(Some(StorageEntry::new(key, entry.value)));
            }
        }
        Ok(None)
    }

    async fn put(&self, entry: &StorageEntry) -> Result<(), StorageError> {
        Self::check_key(&entry.key)?;
        let latest = self.policy.latest_version();
        let storage_key = self.storage_key(latest, &entry.key)?;
        self.inner
            .put(&StorageEntry::new(storage_key, entry.value.clone()))
            .await?;

        // migrate forward: drop copies written under older key versions
        for version in self.policy.versions() {
            if version == latest {
                continue;
            }
            let stale = self.storage_key(version, &entry.key)?;
            self.inner.delete(&stale).await?;
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        Self::check_key(key)?;
        for version in self.policy.versions() {
            let storage_key = self.storage_key(version, key)?;
            self.inner.delete(&storage_key).await?;
        }
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut children = BTreeSet::new();

        for version in self.policy.versions() {
            let (target, context) = self.list_target(version, prefix)?;
            for child in self.inner.list(&target).await? {
                match self.decrypt_child(&context, &child) {
                    Ok(segment) => {
                        children.insert(segment);
                    }
                    Err(e) => {
                        tracing::warn!("dropping undecryptable entry under {}: {}", target, e);
                    }
                }
            }
        }

        Ok(children.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn setup() -> (MemoryStorage, EncryptedKeyStorage) {
        let backing = MemoryStorage::new();
        let policy = Arc::new(Policy::generate("metadata"));
        let storage = EncryptedKeyStorage::metadata(Arc::new(backing.clone()), policy);
        (backing, storage)
    }

    #[tokio::test]
    async fn test_put_get_hides_key_names() {
        let (backing, storage) = setup();

        storage
            .put(&StorageEntry::new("team/db/password", b"meta".to_vec()))
            .await
            .unwrap();

        let entry = storage.get("team/db/password").await.unwrap().unwrap();
        assert_eq!(entry.key, "team/db/password");
        assert_eq!(entry.value, b"meta");
        assert!(storage.get("team/db").await.unwrap().is_none());

        let keys = backing.keys();
        assert_eq!(keys.len(), 1);
        assert!(keys[0].starts_with(METADATA_PREFIX));
        for word in ["team", "db", "password"] {
            assert!(!keys[0].contains(word));
        }
        assert_eq!(keys[0].matches('/').count(), 3);
    }

    #[tokio::test]
    async fn test_directory_names_are_shared_between_siblings() {
        let (backing, storage) = setup();

        storage.put(&StorageEntry::new("x/y/z", b"1".to_vec())).await.unwrap();
        storage.put(&StorageEntry::new("x/y/w", b"2".to_vec())).await.unwrap();

        let keys = backing.keys();
        let dir = |k: &str| k.rsplit_once('/').map(|(d, _)| d.to_string()).unwrap();
        assert_eq!(dir(&keys[0]), dir(&keys[1]));

        assert_eq!(storage.list("x/y/").await.unwrap(), vec!["w", "z"]);
        assert_eq!(storage.list("x/").await.unwrap(), vec!["y/"]);
        assert_eq!(storage.list("").await.unwrap(), vec!["x/"]);
        // missing trailing slash lists the same directory
        assert_eq!(storage.list("x/y").await.unwrap(), vec!["w", "z"]);
    }

    #[tokio::test]
    async fn test_empty_segments_keep_position() {
        let (_, storage) = setup();

        storage.put(&StorageEntry::new("a//b", b"1".to_vec())).await.unwrap();
        assert!(storage.get("a//b").await.unwrap().is_some());
        assert!(storage.get("a/b").await.unwrap().is_none());
        assert_eq!(storage.list("a/").await.unwrap(), vec!["/"]);
    }

    #[tokio::test]
    async fn test_undecryptable_children_are_dropped() {
        let (backing, storage) = setup();

        storage.put(&StorageEntry::new("good", b"1".to_vec())).await.unwrap();
        backing
            .put(&StorageEntry::new("metadata/not-a-ciphertext", b"x".to_vec()))
            .await
            .unwrap();

        assert_eq!(storage.list("").await.unwrap(), vec!["good"]);
    }

    #[tokio::test]
    async fn test_rotation_reads_old_paths_and_migrates_on_write() {
        let backing = MemoryStorage::new();
        let mut policy = Policy::generate("metadata");
        let v1 = EncryptedKeyStorage::metadata(Arc::new(backing.clone()), Arc::new(policy.clone()));

        v1.put(&StorageEntry::new("a/b", b"old".to_vec())).await.unwrap();
        let old_key = v1.storage_key(1, "a/b").unwrap();

        policy.rotate();
        let v2 = EncryptedKeyStorage::metadata(Arc::new(backing.clone()), Arc::new(policy));

        // still readable and listable through the old key version
        assert_eq!(v2.get("a/b").await.unwrap().unwrap().value, b"old");
        assert_eq!(v2.list("a/").await.unwrap(), vec!["b"]);

        v2.put(&StorageEntry::new("a/b", b"new".to_vec())).await.unwrap();
        assert!(!backing.keys().contains(&old_key));
        assert_eq!(v2.get("a/b").await.unwrap().unwrap().value, b"new");
        assert_eq!(v2.list("a/").await.unwrap(), vec!["b"]);

        v2.delete("a/b").await.unwrap();
        assert!(backing.is_empty());
    }

    #[tokio::test]
    async fn test_empty_key_rejected() {
        let (_, storage) = setup();
        assert!(matches!(
            storage.get("").await,
            Err(StorageError::InvalidKey(_))
        ));
    }
}
