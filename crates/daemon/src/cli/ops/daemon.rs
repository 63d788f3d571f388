use std::time::Duration;

use clap::Args;

use vkv_daemon::state::AppState;
use vkv_daemon::{spawn_service, ServiceConfig};

#[derive(Args, Debug, Clone)]
pub struct Daemon {
    /// Override API server port (default from config)
    #[arg(long)]
    pub api_port: Option<u16>,

    /// Directory for log files (logs to stdout only if not set)
    #[arg(long)]
    pub log_dir: Option<std::path::PathBuf>,

    /// Default log level, overridden by RUST_LOG
    #[arg(long, default_value_t = tracing::Level::INFO)]
    pub log_level: tracing::Level,
}

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("state error: {0}")]
    StateError(#[from] vkv_daemon::state::StateError),
    #[error("service error: {0}")]
    Service(#[from] vkv_daemon::ProcessError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Daemon {
    type Error = DaemonError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        // Load state from config path (or default ~/.vkv)
        let state = AppState::load(ctx.config_path.clone())?;

        let config = ServiceConfig {
            storage: state.config.storage.clone(),
            mount_id: state.config.mount_id,
            local_mount: state.config.local_mount,
            replication_state: state.config.replication_state,
            api_port: self.api_port.unwrap_or(state.config.api_port),
            request_timeout: Duration::from_secs(state.config.request_timeout_secs),
            log_level: self.log_level,
            log_dir: self.log_dir.clone(),
        };

        spawn_service(&config).await?;
        Ok("daemon ended".to_string())
    }
}
