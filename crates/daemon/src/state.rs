use std::{fs, path::PathBuf};

use common::system::ReplicationState;
use object_store::ObjectStoreConfig;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const APP_NAME: &str = "vkv";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DATA_DIR_NAME: &str = "data";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Port for the API server
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    /// Mount this node serves. Every storage key lives under it.
    pub mount_id: Uuid,
    /// Seconds before an in-flight request is abandoned
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Whether the mount is local to this node and never replicated
    #[serde(default)]
    pub local_mount: bool,
    #[serde(default)]
    pub replication_state: ReplicationState,
    /// Physical storage backend
    #[serde(default)]
    pub storage: ObjectStoreConfig,
}

fn default_api_port() -> u16 {
    5001
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            mount_id: Uuid::new_v4(),
            request_timeout_secs: default_request_timeout_secs(),
            local_mount: false,
            replication_state: ReplicationState::default(),
            storage: ObjectStoreConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the vkv directory (~/.vkv)
    pub vkv_dir: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the vkv directory path (custom or default ~/.vkv)
    pub fn vkv_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Initialize a new vkv state directory
    ///
    /// Without an explicit config the mount is stored on the local
    ///  filesystem under `<vkv_dir>/data`.
    pub fn init(
        custom_path: Option<PathBuf>,
        config: Option<AppConfig>,
    ) -> Result<Self, StateError> {
        let vkv_dir = Self::vkv_dir(custom_path)?;

        if vkv_dir.join(CONFIG_FILE_NAME).exists() {
            return Err(StateError::AlreadyInitialized);
        }

        fs::create_dir_all(&vkv_dir)?;

        let config = match config {
            Some(config) => config,
            None => AppConfig {
                storage: ObjectStoreConfig::Local {
                    path: vkv_dir.join(DATA_DIR_NAME),
                },
                ..Default::default()
            },
        };
        let config_path = vkv_dir.join(CONFIG_FILE_NAME);
        let config_toml = toml::to_string_pretty(&config)?;
        fs::write(&config_path, config_toml)?;

        Ok(Self {
            vkv_dir,
            config_path,
            config,
        })
    }

    /// Load existing state from the vkv directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let vkv_dir = Self::vkv_dir(custom_path)?;

        if !vkv_dir.exists() {
            return Err(StateError::NotInitialized);
        }

        let config_path = vkv_dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Err(StateError::MissingFile(CONFIG_FILE_NAME.to_string()));
        }

        let config_toml = fs::read_to_string(&config_path)?;
        let config: AppConfig = toml::from_str(&config_toml)?;

        Ok(Self {
            vkv_dir,
            config_path,
            config,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("vkv directory not initialized. Run 'vkv init' first")]
    NotInitialized,

    #[error("vkv directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vkv");

        let state = AppState::init(Some(path.clone()), None).unwrap();
        assert!(state.config_path.exists());
        assert_eq!(
            state.config.storage,
            ObjectStoreConfig::Local {
                path: path.join(DATA_DIR_NAME)
            }
        );

        let loaded = AppState::load(Some(path.clone())).unwrap();
        assert_eq!(loaded.config, state.config);

        assert!(matches!(
            AppState::init(Some(path), None),
            Err(StateError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_load_uninitialized() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            AppState::load(Some(dir.path().join("missing"))),
            Err(StateError::NotInitialized)
        ));
        assert!(matches!(
            AppState::load(Some(dir.path().to_path_buf())),
            Err(StateError::MissingFile(_))
        ));
    }

    #[test]
    fn test_config_defaults_fill_in() {
        let config: AppConfig = toml::from_str(
            r#"
            mount_id = "5f0c3a0e-8d1e-4c55-9a0a-3f7a8f2b6f11"

            [storage]
            type = "s3"
            endpoint = "http://localhost:9000"
            access_key = "minioadmin"
            secret_key = "minioadmin"
            bucket = "vkv"
            "#,
        )
        .unwrap();

        assert_eq!(config.api_port, 5001);
        assert_eq!(config.request_timeout_secs, 30);
        assert!(!config.local_mount);
        assert_eq!(config.replication_state, ReplicationState::Primary);
        assert!(matches!(config.storage, ObjectStoreConfig::S3 { region: None, .. }));
    }
}
