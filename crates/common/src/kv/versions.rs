use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::KvError;
use crate::crypto::Policy;
use crate::salt::Salt;
use crate::storage::{Storage, StorageEntry};

/// User data for one version of a key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionPayload {
    pub data: Map<String, Value>,
    pub created_time: DateTime<Utc>,
}

impl VersionPayload {
    pub fn new(data: Map<String, Value>, created_time: DateTime<Utc>) -> Self {
        Self { data, created_time }
    }

    pub fn encode(&self) -> Result<Vec<u8>, KvError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(data: &[u8]) -> Result<Self, KvError> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// What actually lands in storage: the sealed payload and the policy
///  version its sealing key was derived from
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    key_version: u32,
    sealed: Vec<u8>,
}

/// Version payloads addressed by salted path
///
/// Payloads are sealed with a subkey derived from the path policy, bound to
///  the storage path they live at. The store knows nothing about metadata
///  and never checks a version against it.
#[derive(Debug, Clone)]
pub struct VersionStore {
    storage: Arc<dyn Storage>,
    salt: Arc<Salt>,
    policy: Arc<Policy>,
}

impl VersionStore {
    pub fn new(storage: Arc<dyn Storage>, salt: Arc<Salt>, policy: Arc<Policy>) -> Self {
        Self {
            storage,
            salt,
            policy,
        }
    }

    /// Storage path of the payload for `key` at `version`
    pub fn path(&self, key: &str, version: u64) -> String {
        self.salt.version_path(key, version)
    }

    /// Seal and write an already encoded [`VersionPayload`]
    pub async fn put_version(&self, key: &str, version: u64, encoded: &[u8]) -> Result<(), KvError> {
        let path = self.path(key, version);
        let key_version = self.policy.latest_version();
        let secret = self.policy.derive_secret(key_version, path.as_bytes())?;

        let envelope = Envelope {
            key_version,
            sealed: secret.seal(path.as_bytes(), encoded)?,
        };
        self.storage
            .put(&StorageEntry::new(path, bincode::serialize(&envelope)?))
            .await?;
        Ok(())
    }

    pub async fn get_version(&self, key: &str, version: u64) -> Result<Option<VersionPayload>, KvError> {
        let path = self.path(key, version);
        let Some(entry) = self.storage.get(&path).await? else {
            return Ok(None);
        };

        let envelope: Envelope = bincode::deserialize(&entry.value)?;
        let secret = self.policy.derive_secret(envelope.key_version, path.as_bytes())?;
        let encoded = secret.open(path.as_bytes(), &envelope.sealed)?;
        Ok(Some(VersionPayload::decode(&encoded)?))
    }

    /// Remove a payload. Removing one that is not there succeeds.
    pub async fn delete_version(&self, key: &str, version: u64) -> Result<(), KvError> {
        self.storage.delete(&self.path(key, version)).await?;
        Ok(())
    }
}
