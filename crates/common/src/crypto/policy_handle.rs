use std::sync::Arc;

use tokio::sync::RwLock;

use super::policy::{Policy, PolicyError};
use crate::storage::{Storage, StorageEntry};

/// Storage key the path policy is persisted at
pub const POLICY_PATH: &str = "policy/metadata";
/// Name recorded in the persisted policy
pub const POLICY_NAME: &str = "metadata";

/// Lazily loaded, invalidatable handle to the path policy
///
/// The first caller loads the policy from storage, or creates and persists
///  one if the mount has none yet. Later callers share the cached `Arc`
///  until [`PolicyHandle::invalidate`] drops it.
#[derive(Debug, Default)]
pub struct PolicyHandle {
    cached: RwLock<Option<Arc<Policy>>>,
}

impl PolicyHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, storage: &dyn Storage) -> Result<Arc<Policy>, PolicyError> {
        if let Some(policy) = self.cached.read().await.as_ref() {
            return Ok(policy.clone());
        }

        let mut cached = self.cached.write().await;
        // someone may have filled it while we waited on the write lock
        if let Some(policy) = cached.as_ref() {
            return Ok(policy.clone());
        }

        let policy = Arc::new(load_or_create(storage).await?);
        *cached = Some(policy.clone());
        Ok(policy)
    }

    /// Add a key version to the persisted policy and refresh the cache
    ///
    /// Always starts from the stored copy so a stale cache never drops
    ///  key versions written by another node.
    pub async fn rotate(&self, storage: &dyn Storage) -> Result<u32, PolicyError> {
        let mut cached = self.cached.write().await;

        let mut policy = load_or_create(storage).await?;
        let version = policy.rotate();
        storage
            .put(&StorageEntry::new(POLICY_PATH, policy.encode()?))
            .await?;

        tracing::info!("rotated path policy to version {}", version);
        *cached = Some(Arc::new(policy));
        Ok(version)
    }

    pub async fn invalidate(&self) {
        self.cached.write().await.take();
    }

    pub async fn is_cached(&self) -> bool {
        self.cached.read().await.is_some()
    }
}

async fn load_or_create(storage: &dyn Storage) -> Result<Policy, PolicyError> {
    if let Some(entry) = storage.get(POLICY_PATH).await? {
        return Policy::decode(&entry.value);
    }

    let policy = Policy::generate(POLICY_NAME);
    storage
        .put(&StorageEntry::new(POLICY_PATH, policy.encode()?))
        .await?;
    tracing::debug!("created path policy");
    Ok(policy)
}
