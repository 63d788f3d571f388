use std::path::PathBuf;
use std::time::Duration;

use common::system::ReplicationState;
use object_store::ObjectStoreConfig;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Config {
    // storage configuration
    /// Physical storage backend the mount lives on
    pub storage: ObjectStoreConfig,
    /// Mount id, used as the key prefix inside `storage`
    pub mount_id: Uuid,

    // replication
    /// whether the mount is local to this node,
    ///  local mounts always run their own upgrades
    pub local_mount: bool,
    pub replication_state: ReplicationState,

    // http server configuration
    /// Port for the API HTTP server
    pub api_port: u16,
    /// Requests still running after this long are answered with a 408
    pub request_timeout: Duration,

    // logging
    pub log_level: tracing::Level,
    /// Directory for log files (optional, logs to stdout only if not set)
    pub log_dir: Option<PathBuf>,
}

impl Config {
    /// Everything in memory on a random mount, listening on `api_port`
    pub fn ephemeral(api_port: u16) -> Self {
        Self {
            storage: ObjectStoreConfig::Memory,
            mount_id: Uuid::new_v4(),
            local_mount: true,
            replication_state: ReplicationState::Primary,
            api_port,
            request_timeout: Duration::from_secs(30),
            log_level: tracing::Level::INFO,
            log_dir: None,
        }
    }
}
