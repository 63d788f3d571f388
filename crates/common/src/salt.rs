use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use crate::crypto::{Secret, SECRET_SIZE};
use crate::storage::{Storage, StorageEntry, StorageError};

/// Storage key the raw salt lives at
pub const SALT_PATH: &str = "salt";
/// Storage prefix version payloads are written under
pub const VERSIONS_PREFIX: &str = "versions/";

#[derive(Debug, thiserror::Error)]
pub enum SaltError {
    #[error("salt storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("stored salt has invalid length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Per-mount salt used to name version payloads
///
/// Payload paths are derived from `SHA-256(salt || key || "|" || version)`,
///  so nothing on disk links a payload back to its logical key without
///  the salt.
#[derive(Debug, Clone)]
pub struct Salt(Secret);

impl Salt {
    pub fn generate() -> Self {
        Self(Secret::generate())
    }

    pub fn from_slice(data: &[u8]) -> Result<Self, SaltError> {
        Secret::from_slice(data)
            .map(Self)
            .map_err(|_| SaltError::InvalidLength {
                expected: SECRET_SIZE,
                actual: data.len(),
            })
    }

    pub fn bytes(&self) -> &[u8] {
        self.0.bytes()
    }

    /// Hex-encoded salted identifier for a key version
    pub fn salt_id(&self, key: &str, version: u64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.bytes());
        hasher.update(key.as_bytes());
        hasher.update(b"|");
        hasher.update(version.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Storage path of the payload for a key version.
    ///  The first three characters form a directory to bound fan-out.
    pub fn version_path(&self, key: &str, version: u64) -> String {
        let id = self.salt_id(key, version);
        format!("{}{}/{}", VERSIONS_PREFIX, &id[..3], &id[3..])
    }
}

/// Lazily loaded salt, generated and written through on first use
#[derive(Debug, Default)]
pub struct SaltCache {
    cached: RwLock<Option<Arc<Salt>>>,
}

impl SaltCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, storage: &dyn Storage) -> Result<Arc<Salt>, SaltError> {
        if let Some(salt) = self.cached.read().await.as_ref() {
            return Ok(salt.clone());
        }

        let mut cached = self.cached.write().await;
        if let Some(salt) = cached.as_ref() {
            return Ok(salt.clone());
        }

        let salt = match storage.get(SALT_PATH).await? {
            Some(entry) => Salt::from_slice(&entry.value)?,
            None => {
                let salt = Salt::generate();
                storage
                    .put(&StorageEntry::new(SALT_PATH, salt.bytes().to_vec()))
                    .await?;
                tracing::debug!("generated mount salt");
                salt
            }
        };

        let salt = Arc::new(salt);
        *cached = Some(salt.clone());
        Ok(salt)
    }

    pub async fn invalidate(&self) {
        self.cached.write().await.take();
    }

    pub async fn is_cached(&self) -> bool {
        self.cached.read().await.is_some()
    }
}
