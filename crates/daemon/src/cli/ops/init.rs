use std::path::PathBuf;

use clap::Args;
use object_store::ObjectStoreConfig;

use vkv_daemon::state::{AppConfig, AppState, StateError, DATA_DIR_NAME};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// API server port
    #[arg(long, default_value_t = 5001)]
    pub api_port: u16,

    /// Store the mount in this directory (defaults to <config dir>/data)
    #[arg(long, conflicts_with = "memory")]
    pub data_dir: Option<PathBuf>,

    /// Keep the mount in memory only; everything is lost when the daemon stops
    #[arg(long)]
    pub memory: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] StateError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let vkv_dir = AppState::vkv_dir(ctx.config_path.clone())?;
        let storage = if self.memory {
            ObjectStoreConfig::Memory
        } else {
            ObjectStoreConfig::Local {
                path: self
                    .data_dir
                    .clone()
                    .unwrap_or_else(|| vkv_dir.join(DATA_DIR_NAME)),
            }
        };

        let config = AppConfig {
            api_port: self.api_port,
            storage,
            ..Default::default()
        };
        let state = AppState::init(Some(vkv_dir), Some(config))?;

        let output = format!(
            "Initialized vkv directory at: {}\n\
             - Config: {}\n\
             - Mount: {}\n\
             - Storage: {:?}\n\
             - API port: {}",
            state.vkv_dir.display(),
            state.config_path.display(),
            state.config.mount_id,
            state.config.storage,
            state.config.api_port,
        );

        Ok(output)
    }
}
