//! Online migration of a legacy unversioned mount
//!
//! Before versioning, each key's data sat directly under the mount prefix as
//!  a JSON object. On startup the primary moves every such entry into the
//!  versioned layout as version 1 and deletes the original. While that runs
//!  the mount refuses every request, so nobody observes a half-migrated key.
//!
//! A canary record marks an upgrade in flight. If the process dies mid-way
//!  the canary is still there on the next start and the scan is repeated;
//!  keys that already made it across only have their source removed.

use std::sync::atomic::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::backend::KvBackend;
use super::config::CONFIG_PATH;
use super::error::KvError;
use super::metadata::KeyMetadata;
use super::versions::VersionPayload;
use crate::crypto::POLICY_PATH;
use crate::salt::{SALT_PATH, VERSIONS_PREFIX};
use crate::storage::{scan_leaves, StorageEntry, METADATA_PREFIX};

/// Storage key whose presence means an upgrade is in flight
pub const UPGRADE_CANARY_PATH: &str = "upgrading";

/// Top-level names owned by the versioned layout, never treated as legacy data
const RESERVED: &[&str] = &[
    CONFIG_PATH,
    SALT_PATH,
    "policy/",
    UPGRADE_CANARY_PATH,
    METADATA_PREFIX,
    VERSIONS_PREFIX,
];

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UpgradeCanary {
    started_time: DateTime<Utc>,
}

pub fn is_reserved(name: &str) -> bool {
    RESERVED.contains(&name)
}

impl KvBackend {
    /// Bring the mount up to date before it starts serving
    ///
    /// Primaries start a background migration when legacy entries or a
    ///  leftover canary are found and return as soon as it is running.
    ///  Secondaries never migrate; if the primary is mid-upgrade they refuse
    ///  requests until the canary disappears.
    pub async fn initialize(&self) -> Result<(), KvError> {
        let system = &self.inner.system;
        if !system.local_mount() && system.replication_state().is_secondary() {
            return self.follow_upgrade().await;
        }

        if !self.upgrade_needed().await? {
            tracing::debug!("mount is already versioned");
            return Ok(());
        }
        self.start_upgrade().await
    }

    async fn upgrade_needed(&self) -> Result<bool, KvError> {
        let storage = self.inner.storage.as_ref();
        if storage.get(UPGRADE_CANARY_PATH).await?.is_some() {
            tracing::info!("found upgrade canary, resuming upgrade");
            return Ok(true);
        }
        Ok(storage.list("").await?.iter().any(|name| !is_reserved(name)))
    }

    /// Claim the upgrade flag, persist the canary and spawn the migration
    pub async fn start_upgrade(&self) -> Result<(), KvError> {
        if self
            .inner
            .upgrading
            .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(KvError::UpgradeAlreadyRunning);
        }

        let canary = UpgradeCanary {
            started_time: Utc::now(),
        };
        let entry = match serde_json::to_vec(&canary) {
            Ok(value) => StorageEntry::new(UPGRADE_CANARY_PATH, value),
            Err(e) => {
                self.inner.upgrading.store(0, Ordering::SeqCst);
                return Err(e.into());
            }
        };
        if let Err(e) = self.inner.storage.put(&entry).await {
            self.inner.upgrading.store(0, Ordering::SeqCst);
            return Err(e.into());
        }

        tracing::info!("upgrading mount to versioned storage");
        let backend = self.clone();
        let handle = tokio::spawn(async move { backend.run_upgrade().await });
        *self.inner.upgrade_task.lock() = Some(handle);
        Ok(())
    }

    async fn run_upgrade(&self) {
        match self.migrate_legacy().await {
            Ok(migrated) => {
                if let Err(e) = self.inner.storage.delete(UPGRADE_CANARY_PATH).await {
                    tracing::error!("failed to remove upgrade canary: {}", e);
                    return;
                }
                let _ = self.inner.upgrading.compare_exchange(
                    1,
                    0,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                );
                tracing::info!("upgrade complete, migrated {} keys", migrated);
            }
            Err(e) => {
                tracing::error!("upgrade failed, it will be retried on next start: {}", e);
            }
        }
    }

    async fn migrate_legacy(&self) -> Result<usize, KvError> {
        let storage = self.inner.storage.as_ref();
        let keys = scan_leaves(storage, "", is_reserved).await?;
        let config = self.inner.config.get(storage).await?;

        let mut migrated = 0;
        for key in keys {
            let _guard = self.inner.locks.lock_for(&key).write().await;
            let meta_storage = self.metadata_storage().await?;
            let store = self.version_store().await?;

            let Some(entry) = storage.get(&key).await? else {
                continue;
            };
            if self.load_metadata(&meta_storage, &key).await?.is_some() {
                // made it across before a crash, only the source is left
                storage.delete(&key).await?;
                continue;
            }

            let data: Map<String, Value> = match serde_json::from_slice(&entry.value) {
                Ok(data) => data,
                Err(e) => {
                    tracing::warn!("leaving legacy entry {} in place, not a json object: {}", key, e);
                    continue;
                }
            };

            let ts = Utc::now();
            let encoded = VersionPayload::new(data, ts).encode()?;
            self.write_locked(
                &meta_storage,
                &store,
                &config,
                KeyMetadata::new(key.as_str()),
                &encoded,
                ts,
            )
            .await?;
            storage.delete(&key).await?;

            tracing::debug!("migrated {}", key);
            migrated += 1;
        }
        Ok(migrated)
    }

    /// On a secondary, hold requests off until the primary's upgrade is done
    async fn follow_upgrade(&self) -> Result<(), KvError> {
        if self.inner.storage.get(UPGRADE_CANARY_PATH).await?.is_none() {
            return Ok(());
        }

        tracing::info!("primary is upgrading this mount, waiting for it to finish");
        self.inner.upgrading.store(1, Ordering::SeqCst);

        let backend = self.clone();
        let interval = self.inner.options.upgrade_poll_interval;
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                match backend.inner.storage.get(UPGRADE_CANARY_PATH).await {
                    Ok(None) => break,
                    Ok(Some(_)) => {}
                    Err(e) => tracing::warn!("failed to check upgrade status: {}", e),
                }
            }

            // whatever was cached may predate the primary's writes
            backend.invalidate(SALT_PATH).await;
            backend.invalidate(POLICY_PATH).await;
            backend.invalidate(CONFIG_PATH).await;
            backend.inner.upgrading.store(0, Ordering::SeqCst);
            tracing::info!("primary finished upgrading");
        });
        *self.inner.follower_task.lock() = Some(handle);
        Ok(())
    }

    /// Wait for a running migration, if any, to finish
    pub async fn wait_for_upgrade(&self) {
        let handle = self.inner.upgrade_task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!("upgrade task panicked: {}", e);
            }
        }
    }

    /// Stop background work. A running migration is awaited so it never
    ///  stops between the writes of a single key.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.inner.follower_task.lock().take() {
            handle.abort();
        }
        self.wait_for_upgrade().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_names() {
        for name in ["config", "salt", "policy/", "upgrading", "metadata/", "versions/"] {
            assert!(is_reserved(name));
        }
        assert!(!is_reserved("legacy"));
        assert!(!is_reserved("policy"));
        assert!(!is_reserved("configs/"));
    }
}
