use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::task::JoinHandle;

use super::config::{ConfigCache, ConfigUpdate, Configuration};
use super::error::KvError;
use super::metadata::{KeyMetadata, MetadataUpdate};
use super::subkeys::subkeys;
use super::types::{SecretVersion, SubkeysResponse, VersionInfo, WriteOptions, WriteResponse};
use super::versions::{VersionPayload, VersionStore};
use crate::crypto::PolicyHandle;
use crate::locks::LockSet;
use crate::salt::SaltCache;
use crate::storage::{EncryptedKeyStorage, Storage, StorageEntry};
use crate::system::SystemView;

/// How often a secondary checks whether the primary finished upgrading
pub const DEFAULT_UPGRADE_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct BackendOptions {
    pub upgrade_poll_interval: Duration,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            upgrade_poll_interval: DEFAULT_UPGRADE_POLL_INTERVAL,
        }
    }
}

/// Versioned key-value engine for a single mount
///
/// `storage` must already be scoped to the mount (see
///  [`PrefixedStorage`](crate::storage::PrefixedStorage)); everything the
///  engine writes lives directly beneath it. Cloning is cheap and every
///  clone drives the same mount.
#[derive(Debug, Clone)]
pub struct KvBackend {
    pub(super) inner: Arc<KvBackendInner>,
}

#[derive(Debug)]
pub(super) struct KvBackendInner {
    pub(super) storage: Arc<dyn Storage>,
    pub(super) locks: LockSet,
    pub(super) salt: SaltCache,
    pub(super) policy: PolicyHandle,
    pub(super) config: ConfigCache,
    /// Non-zero while the legacy namespace is being migrated
    pub(super) upgrading: AtomicU32,
    pub(super) system: Arc<dyn SystemView>,
    pub(super) options: BackendOptions,
    pub(super) upgrade_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
    pub(super) follower_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl KvBackend {
    pub fn new(storage: Arc<dyn Storage>, system: Arc<dyn SystemView>) -> Self {
        Self::with_options(storage, system, BackendOptions::default())
    }

    pub fn with_options(
        storage: Arc<dyn Storage>,
        system: Arc<dyn SystemView>,
        options: BackendOptions,
    ) -> Self {
        Self {
            inner: Arc::new(KvBackendInner {
                storage,
                locks: LockSet::new(),
                salt: SaltCache::new(),
                policy: PolicyHandle::new(),
                config: ConfigCache::new(),
                upgrading: AtomicU32::new(0),
                system,
                options,
                upgrade_task: parking_lot::Mutex::new(None),
                follower_task: parking_lot::Mutex::new(None),
            }),
        }
    }

    pub fn is_upgrading(&self) -> bool {
        self.inner.upgrading.load(Ordering::SeqCst) != 0
    }

    /// Admission check run before every user-facing operation
    fn upgrade_check(&self) -> Result<(), KvError> {
        if self.is_upgrading() {
            return Err(KvError::UpgradeInProgress);
        }
        Ok(())
    }

    fn storage(&self) -> &dyn Storage {
        self.inner.storage.as_ref()
    }

    /// Metadata namespace under the current policy. Per-key operations take
    ///  this snapshot only while holding the key's lock; a snapshot from
    ///  before a rotation misses paths rewritten under the new key version.
    pub(super) async fn metadata_storage(&self) -> Result<EncryptedKeyStorage, KvError> {
        let policy = self.inner.policy.get(self.storage()).await?;
        Ok(EncryptedKeyStorage::metadata(self.inner.storage.clone(), policy))
    }

    pub(super) async fn version_store(&self) -> Result<VersionStore, KvError> {
        let policy = self.inner.policy.get(self.storage()).await?;
        let salt = self.inner.salt.get(self.storage()).await?;
        Ok(VersionStore::new(self.inner.storage.clone(), salt, policy))
    }

    pub(super) async fn load_metadata(
        &self,
        storage: &EncryptedKeyStorage,
        key: &str,
    ) -> Result<Option<KeyMetadata>, KvError> {
        match storage.get(key).await? {
            Some(entry) => Ok(Some(KeyMetadata::decode(&entry.value)?)),
            None => Ok(None),
        }
    }

    async fn persist_metadata(
        &self,
        storage: &EncryptedKeyStorage,
        meta: &KeyMetadata,
    ) -> Result<(), KvError> {
        storage
            .put(&StorageEntry::new(meta.key.clone(), meta.encode()?))
            .await?;
        Ok(())
    }

    /// Read a version of `key`, the latest when `version` is `None` or `0`
    ///
    /// # Returns
    /// * `Ok(None)` - The key or the version does not exist
    /// * `Ok(Some(_))` with `data: None` - The version is deleted or destroyed
    pub async fn read(&self, key: &str, version: Option<u64>) -> Result<Option<SecretVersion>, KvError> {
        self.upgrade_check()?;
        validate_key(key)?;

        let _guard = self.inner.locks.lock_for(key).read().await;
        let meta_storage = self.metadata_storage().await?;
        let store = self.version_store().await?;
        let Some(meta) = self.load_metadata(&meta_storage, key).await? else {
            return Ok(None);
        };

        let version = version.filter(|v| *v != 0).unwrap_or(meta.current_version);
        let Some(vm) = meta.versions.get(&version) else {
            return Ok(None);
        };

        let info = VersionInfo::new(version, vm, &meta);
        if vm.destroyed || vm.is_deleted_at(Utc::now()) {
            return Ok(Some(SecretVersion {
                data: None,
                metadata: info,
            }));
        }

        let payload = store
            .get_version(key, version)
            .await?
            .ok_or_else(|| KvError::MissingVersionData {
                key: key.to_string(),
                version,
            })?;

        tracing::debug!("read {} version {}", key, version);
        Ok(Some(SecretVersion {
            data: Some(payload.data),
            metadata: info,
        }))
    }

    /// Write `data` as a new version of `key`
    pub async fn write(
        &self,
        key: &str,
        data: Map<String, Value>,
        options: WriteOptions,
    ) -> Result<WriteResponse, KvError> {
        self.upgrade_check()?;
        validate_key(key)?;

        let ts = Utc::now();
        let encoded = VersionPayload::new(data, ts).encode()?;
        let config = self.inner.config.get(self.storage()).await?;

        let _guard = self.inner.locks.lock_for(key).write().await;
        let meta_storage = self.metadata_storage().await?;
        let store = self.version_store().await?;
        let meta = self
            .load_metadata(&meta_storage, key)
            .await?
            .unwrap_or_else(|| KeyMetadata::new(key));

        check_cas(&config, &meta, &options)?;

        let response = self
            .write_locked(&meta_storage, &store, &config, meta, &encoded, ts)
            .await?;
        tracing::debug!("wrote {} version {}", key, response.metadata.version);
        Ok(response)
    }

    /// Steps of a write that run under the key's write lock once CAS has passed
    ///
    /// Payload first, then metadata, then best-effort removal of whatever
    ///  the retention window pushed out.
    pub(super) async fn write_locked(
        &self,
        meta_storage: &EncryptedKeyStorage,
        store: &VersionStore,
        config: &Configuration,
        mut meta: KeyMetadata,
        encoded: &[u8],
        ts: DateTime<Utc>,
    ) -> Result<WriteResponse, KvError> {
        let version = meta.current_version + 1;
        store.put_version(&meta.key, version, encoded).await?;

        let prior_oldest = meta.oldest_version;
        let destroyed: BTreeSet<u64> = meta
            .versions
            .iter()
            .filter(|(_, vm)| vm.destroyed)
            .map(|(v, _)| *v)
            .collect();

        let delete_after = meta.effective_delete_after(config.delete_version_after);
        let (vm, evict) = meta.add_version(ts, delete_after, config.max_versions);
        self.persist_metadata(meta_storage, &meta).await?;

        let mut warnings = Vec::new();
        if evict > 0 {
            for v in prior_oldest.max(1)..=evict {
                if destroyed.contains(&v) {
                    continue;
                }
                if let Err(e) = store.delete_version(&meta.key, v).await {
                    tracing::warn!("failed to remove evicted version {} of {}: {}", v, meta.key, e);
                    warnings.push(format!("failed to remove evicted version {}: {}", v, e));
                }
            }
        }

        Ok(WriteResponse {
            metadata: VersionInfo::new(version, &vm, &meta),
            warnings,
        })
    }

    /// Mark versions of `key` as deleted as of now
    ///
    /// Versions that are missing, destroyed or already deleted are skipped.
    pub async fn soft_delete(&self, key: &str, versions: &[u64]) -> Result<(), KvError> {
        self.upgrade_check()?;
        validate_key(key)?;
        validate_versions(versions)?;

        let _guard = self.inner.locks.lock_for(key).write().await;
        let meta_storage = self.metadata_storage().await?;
        let Some(mut meta) = self.load_metadata(&meta_storage, key).await? else {
            return Ok(());
        };

        if mark_deleted(&mut meta, versions, Utc::now()) {
            self.persist_metadata(&meta_storage, &meta).await?;
        }
        Ok(())
    }

    /// Soft-delete the current version of `key`
    pub async fn delete_latest(&self, key: &str) -> Result<(), KvError> {
        self.upgrade_check()?;
        validate_key(key)?;

        let _guard = self.inner.locks.lock_for(key).write().await;
        let meta_storage = self.metadata_storage().await?;
        let Some(mut meta) = self.load_metadata(&meta_storage, key).await? else {
            return Ok(());
        };

        let current = meta.current_version;
        if mark_deleted(&mut meta, &[current], Utc::now()) {
            self.persist_metadata(&meta_storage, &meta).await?;
        }
        Ok(())
    }

    /// Clear the deletion time of versions of `key` that are not destroyed
    pub async fn undelete(&self, key: &str, versions: &[u64]) -> Result<(), KvError> {
        self.upgrade_check()?;
        validate_key(key)?;
        validate_versions(versions)?;

        let _guard = self.inner.locks.lock_for(key).write().await;
        let meta_storage = self.metadata_storage().await?;
        let Some(mut meta) = self.load_metadata(&meta_storage, key).await? else {
            return Ok(());
        };

        let mut changed = false;
        for v in versions {
            if let Some(vm) = meta.versions.get_mut(v) {
                if !vm.destroyed && vm.deletion_time.is_some() {
                    vm.deletion_time = None;
                    changed = true;
                }
            }
        }

        if changed {
            self.persist_metadata(&meta_storage, &meta).await?;
        }
        Ok(())
    }

    /// Permanently remove versions of `key`
    ///
    /// Metadata is persisted before any payload is removed, so a crash in
    ///  between leaves an unreachable payload rather than a readable one.
    pub async fn destroy(&self, key: &str, versions: &[u64]) -> Result<(), KvError> {
        self.upgrade_check()?;
        validate_key(key)?;
        validate_versions(versions)?;

        let _guard = self.inner.locks.lock_for(key).write().await;
        let meta_storage = self.metadata_storage().await?;
        let store = self.version_store().await?;
        let Some(mut meta) = self.load_metadata(&meta_storage, key).await? else {
            return Ok(());
        };

        let mut targeted = BTreeSet::new();
        for v in versions {
            if let Some(vm) = meta.versions.get_mut(v) {
                if !vm.destroyed {
                    vm.destroyed = true;
                    targeted.insert(*v);
                }
            }
        }
        if targeted.is_empty() {
            return Ok(());
        }

        self.persist_metadata(&meta_storage, &meta).await?;
        for v in targeted {
            store.delete_version(key, v).await?;
        }
        tracing::debug!("destroyed versions of {}", key);
        Ok(())
    }

    pub async fn metadata_read(&self, key: &str) -> Result<Option<KeyMetadata>, KvError> {
        self.upgrade_check()?;
        validate_key(key)?;

        let _guard = self.inner.locks.lock_for(key).read().await;
        let meta_storage = self.metadata_storage().await?;
        self.load_metadata(&meta_storage, key).await
    }

    /// Create or update the metadata of `key`, touching only the fields
    ///  present in `update`
    pub async fn metadata_write(&self, key: &str, update: &MetadataUpdate) -> Result<KeyMetadata, KvError> {
        self.upgrade_check()?;
        validate_key(key)?;

        let _guard = self.inner.locks.lock_for(key).write().await;
        let meta_storage = self.metadata_storage().await?;
        let mut meta = self
            .load_metadata(&meta_storage, key)
            .await?
            .unwrap_or_else(|| KeyMetadata::new(key));

        meta.apply(update, Utc::now());
        self.persist_metadata(&meta_storage, &meta).await?;
        Ok(meta)
    }

    /// Remove `key` entirely: every version payload, then the metadata record
    pub async fn metadata_delete(&self, key: &str) -> Result<(), KvError> {
        self.upgrade_check()?;
        validate_key(key)?;

        let _guard = self.inner.locks.lock_for(key).write().await;
        let meta_storage = self.metadata_storage().await?;
        let store = self.version_store().await?;
        let Some(mut meta) = self.load_metadata(&meta_storage, key).await? else {
            return Ok(());
        };

        // mark everything destroyed first so a partial failure never leaves
        //  metadata pointing at a removed payload
        let live: Vec<u64> = meta
            .versions
            .iter()
            .filter(|(_, vm)| !vm.destroyed)
            .map(|(v, _)| *v)
            .collect();
        if !live.is_empty() {
            for vm in meta.versions.values_mut() {
                vm.destroyed = true;
            }
            self.persist_metadata(&meta_storage, &meta).await?;
        }

        for v in live {
            store.delete_version(key, v).await?;
        }
        meta_storage.delete(key).await?;
        tracing::debug!("deleted metadata for {}", key);
        Ok(())
    }

    /// Immediate children of `prefix`; directories end in `/`
    pub async fn metadata_list(&self, prefix: &str) -> Result<Vec<String>, KvError> {
        self.upgrade_check()?;
        let meta_storage = self.metadata_storage().await?;
        Ok(meta_storage.list(prefix).await?)
    }

    /// Key structure of a version with every leaf value replaced by `null`
    pub async fn subkeys(
        &self,
        key: &str,
        version: Option<u64>,
        depth: u32,
    ) -> Result<Option<SubkeysResponse>, KvError> {
        Ok(self.read(key, version).await?.map(|secret| SubkeysResponse {
            subkeys: secret.data.as_ref().map(|data| subkeys(data, depth)),
            metadata: secret.metadata,
        }))
    }

    pub async fn config_read(&self) -> Result<Configuration, KvError> {
        self.upgrade_check()?;
        Ok((*self.inner.config.get(self.storage()).await?).clone())
    }

    pub async fn config_write(&self, update: &ConfigUpdate) -> Result<Configuration, KvError> {
        self.upgrade_check()?;
        let config = self.inner.config.update(self.storage(), update).await?;
        tracing::info!("updated mount configuration");
        Ok((*config).clone())
    }

    /// Rotate the path policy. New paths are encrypted under the new key
    ///  version; existing ones migrate as they are rewritten.
    pub async fn rotate_path_key(&self) -> Result<u32, KvError> {
        self.upgrade_check()?;
        Ok(self.inner.policy.rotate(self.storage()).await?)
    }
}

fn validate_key(key: &str) -> Result<(), KvError> {
    if key.is_empty() {
        return Err(KvError::invalid("missing key"));
    }
    Ok(())
}

fn validate_versions(versions: &[u64]) -> Result<(), KvError> {
    if versions.is_empty() {
        return Err(KvError::invalid("no versions provided"));
    }
    if versions.contains(&0) {
        return Err(KvError::invalid("versions must be positive integers"));
    }
    Ok(())
}

fn check_cas(config: &Configuration, meta: &KeyMetadata, options: &WriteOptions) -> Result<(), KvError> {
    match options.cas {
        Some(cas) if cas != meta.current_version => Err(KvError::CasMismatch {
            expected: cas,
            current: meta.current_version,
        }),
        Some(_) => Ok(()),
        None if config.cas_required || meta.cas_required => Err(KvError::CasRequired),
        None => Ok(()),
    }
}

/// Set the deletion time of every listed live version to `now`.
///  Returns whether anything changed.
fn mark_deleted(meta: &mut KeyMetadata, versions: &[u64], now: DateTime<Utc>) -> bool {
    let mut changed = false;
    for v in versions {
        if let Some(vm) = meta.versions.get_mut(v) {
            if vm.destroyed || vm.is_deleted_at(now) {
                continue;
            }
            vm.deletion_time = Some(now);
            changed = true;
        }
    }
    changed
}
