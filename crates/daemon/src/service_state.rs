use std::sync::Arc;

use common::kv::{KvBackend, KvError};
use common::storage::{PrefixedStorage, Storage};
use common::system::StaticSystemView;
use object_store::{ObjectStorage, ObjectStorageError};

use crate::service_config::Config;

/// Main service state, shared by every request handler
#[derive(Clone)]
pub struct State {
    backend: KvBackend,
}

impl State {
    pub async fn from_config(config: &Config) -> Result<Self, StateSetupError> {
        // 1. Setup physical storage, scoped to the mount
        let storage = ObjectStorage::new(config.storage.clone()).await?;
        let storage: Arc<dyn Storage> = Arc::new(PrefixedStorage::new(
            Arc::new(storage),
            config.mount_id.to_string(),
        ));
        tracing::info!(mount_id = %config.mount_id, "mount storage ready");

        // 2. Setup the engine and kick off any pending upgrade
        let system = StaticSystemView::new(config.local_mount, config.replication_state);
        let backend = KvBackend::new(storage, Arc::new(system));
        backend.initialize().await?;
        if backend.is_upgrading() {
            tracing::info!("mount upgrade running, requests are refused until it completes");
        }

        Ok(Self { backend })
    }

    /// Wrap an already constructed backend
    pub fn from_backend(backend: KvBackend) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &KvBackend {
        &self.backend
    }

    /// Stop background work owned by the engine
    pub async fn shutdown(&self) {
        self.backend.shutdown().await;
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateSetupError {
    #[error("storage setup error: {0}")]
    Storage(#[from] ObjectStorageError),
    #[error("mount initialization error: {0}")]
    Initialize(#[from] KvError),
}
