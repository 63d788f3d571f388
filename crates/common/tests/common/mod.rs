//! Shared test utilities for engine integration tests
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Semaphore;

use ::common::kv::{BackendOptions, KvBackend};
use ::common::salt::{Salt, SALT_PATH};
use ::common::storage::{MemoryStorage, Storage, StorageEntry, StorageError};
use ::common::system::{ReplicationState, StaticSystemView};

/// A primary-node backend over fresh in-memory storage.
///  The storage handle shares state with the backend.
pub fn setup() -> (KvBackend, MemoryStorage) {
    let storage = MemoryStorage::new();
    (backend_over(Arc::new(storage.clone())), storage)
}

pub fn backend_over(storage: Arc<dyn Storage>) -> KvBackend {
    KvBackend::new(storage, Arc::new(StaticSystemView::default()))
}

/// A backend that believes it runs on a replicated secondary
pub fn secondary_over(storage: Arc<dyn Storage>) -> KvBackend {
    KvBackend::with_options(
        storage,
        Arc::new(StaticSystemView::new(
            false,
            ReplicationState::PerformanceSecondary,
        )),
        BackendOptions {
            upgrade_poll_interval: Duration::from_millis(10),
        },
    )
}

pub fn data(value: Value) -> Map<String, Value> {
    value
        .as_object()
        .cloned()
        .expect("test data must be a json object")
}

/// Whether the payload for `key` at `version` is present in `storage`
pub async fn payload_exists(storage: &dyn Storage, key: &str, version: u64) -> bool {
    let salt = storage
        .get(SALT_PATH)
        .await
        .unwrap()
        .expect("salt has not been generated yet");
    let salt = Salt::from_slice(&salt.value).unwrap();
    storage
        .get(&salt.version_path(key, version))
        .await
        .unwrap()
        .is_some()
}

/// Storage that fails puts or deletes under chosen prefixes, standing in
///  for a crash between two storage calls
#[derive(Debug, Default)]
pub struct FailingStorage {
    pub inner: MemoryStorage,
    fail_puts: parking_lot::Mutex<Vec<String>>,
    fail_deletes: parking_lot::Mutex<Vec<String>>,
}

impl FailingStorage {
    pub fn new(inner: MemoryStorage) -> Self {
        Self {
            inner,
            ..Default::default()
        }
    }

    pub fn fail_puts_under(&self, prefix: &str) {
        self.fail_puts.lock().push(prefix.to_string());
    }

    pub fn fail_deletes_under(&self, prefix: &str) {
        self.fail_deletes.lock().push(prefix.to_string());
    }

    pub fn heal(&self) {
        self.fail_puts.lock().clear();
        self.fail_deletes.lock().clear();
    }

    fn injected(rules: &parking_lot::Mutex<Vec<String>>, key: &str) -> Result<(), StorageError> {
        if rules.lock().iter().any(|prefix| key.starts_with(prefix.as_str())) {
            return Err(anyhow::anyhow!("injected failure at {}", key).into());
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for FailingStorage {
    async fn get(&self, key: &str) -> Result<Option<StorageEntry>, StorageError> {
        self.inner.get(key).await
    }

    async fn put(&self, entry: &StorageEntry) -> Result<(), StorageError> {
        Self::injected(&self.fail_puts, &entry.key)?;
        self.inner.put(entry).await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        Self::injected(&self.fail_deletes, key)?;
        self.inner.delete(key).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        self.inner.list(prefix).await
    }
}

/// Storage whose reads of one key block until [`GatedStorage::open`] is called
#[derive(Debug)]
pub struct GatedStorage {
    pub inner: MemoryStorage,
    gated_key: String,
    gate: Semaphore,
}

impl GatedStorage {
    pub fn new(inner: MemoryStorage, gated_key: &str) -> Self {
        Self {
            inner,
            gated_key: gated_key.to_string(),
            gate: Semaphore::new(0),
        }
    }

    pub fn open(&self) {
        self.gate.add_permits(1);
    }
}

#[async_trait]
impl Storage for GatedStorage {
    async fn get(&self, key: &str) -> Result<Option<StorageEntry>, StorageError> {
        if key == self.gated_key {
            // the permit goes back on drop, so the gate stays open once opened
            let _permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| StorageError::Backend(e.into()))?;
        }
        self.inner.get(key).await
    }

    async fn put(&self, entry: &StorageEntry) -> Result<(), StorageError> {
        self.inner.put(entry).await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.inner.delete(key).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        self.inner.list(prefix).await
    }
}
