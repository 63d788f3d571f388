use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tokio::sync::RwLock;

use super::error::KvError;
use crate::storage::{Storage, StorageEntry};

/// Storage key the mount configuration is persisted at
pub const CONFIG_PATH: &str = "config";
/// Versions kept per key when neither the key nor the mount sets a limit
pub const DEFAULT_MAX_VERSIONS: u32 = 10;

/// Mount-wide defaults
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    /// Zero means [`DEFAULT_MAX_VERSIONS`]
    #[serde(default)]
    pub max_versions: u32,
    #[serde(default)]
    pub cas_required: bool,
    /// New versions expire this long after they are written
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete_version_after: Option<Duration>,
}

/// Partial update to [`Configuration`]. Absent fields are left as they are.
#[serde_as]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigUpdate {
    pub max_versions: Option<u32>,
    pub cas_required: Option<bool>,
    /// A zero duration clears the setting
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    pub delete_version_after: Option<Duration>,
}

impl Configuration {
    pub fn apply(&mut self, update: &ConfigUpdate) {
        if let Some(max_versions) = update.max_versions {
            self.max_versions = max_versions;
        }
        if let Some(cas_required) = update.cas_required {
            self.cas_required = cas_required;
        }
        if let Some(after) = update.delete_version_after {
            self.delete_version_after = (!after.is_zero()).then_some(after);
        }
    }
}

/// Cached view of the persisted [`Configuration`]
#[derive(Debug, Default)]
pub struct ConfigCache {
    cached: RwLock<Option<Arc<Configuration>>>,
}

impl ConfigCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the configuration, falling back to defaults when none is stored
    pub async fn get(&self, storage: &dyn Storage) -> Result<Arc<Configuration>, KvError> {
        if let Some(config) = self.cached.read().await.as_ref() {
            return Ok(config.clone());
        }

        let mut cached = self.cached.write().await;
        if let Some(config) = cached.as_ref() {
            return Ok(config.clone());
        }

        let config = match storage.get(CONFIG_PATH).await? {
            Some(entry) => serde_json::from_slice(&entry.value)?,
            None => Configuration::default(),
        };

        let config = Arc::new(config);
        *cached = Some(config.clone());
        Ok(config)
    }

    /// Apply `update` to the stored configuration and write it back
    pub async fn update(
        &self,
        storage: &dyn Storage,
        update: &ConfigUpdate,
    ) -> Result<Arc<Configuration>, KvError> {
        let mut cached = self.cached.write().await;

        let mut config = match storage.get(CONFIG_PATH).await? {
            Some(entry) => serde_json::from_slice(&entry.value)?,
            None => Configuration::default(),
        };
        config.apply(update);

        storage
            .put(&StorageEntry::new(CONFIG_PATH, serde_json::to_vec(&config)?))
            .await?;

        let config = Arc::new(config);
        *cached = Some(config.clone());
        Ok(config)
    }

    pub async fn invalidate(&self) {
        self.cached.write().await.take();
    }

    pub async fn is_cached(&self) -> bool {
        self.cached.read().await.is_some()
    }
}
