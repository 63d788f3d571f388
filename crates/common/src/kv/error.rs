use crate::crypto::PolicyError;
use crate::salt::SaltError;
use crate::storage::StorageError;

/// Broad class of a [`KvError`], used to decide how a caller should react
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request was rejected; nothing changed
    InvalidRequest,
    /// Stored state contradicts itself and needs manual repair
    InvariantViolation,
    /// Storage or crypto failure; retrying may succeed
    Transient,
}

#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("check-and-set parameter did not match the current version (expected {expected}, current {current})")]
    CasMismatch { expected: u64, current: u64 },
    #[error("check-and-set parameter required for this call")]
    CasRequired,
    #[error("upgrade in progress")]
    UpgradeInProgress,
    #[error("upgrade already running")]
    UpgradeAlreadyRunning,
    #[error("could not find version data for {key} version {version}")]
    MissingVersionData { key: String, version: u64 },
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),
    #[error("salt error: {0}")]
    Salt(#[from] SaltError),
    #[error("codec error: {0}")]
    Codec(String),
}

impl KvError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            KvError::InvalidRequest(_)
            | KvError::CasMismatch { .. }
            | KvError::CasRequired
            | KvError::UpgradeInProgress
            | KvError::UpgradeAlreadyRunning => ErrorKind::InvalidRequest,
            KvError::MissingVersionData { .. } => ErrorKind::InvariantViolation,
            KvError::Storage(_) | KvError::Policy(_) | KvError::Salt(_) | KvError::Codec(_) => {
                ErrorKind::Transient
            }
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        KvError::InvalidRequest(msg.into())
    }
}

impl From<serde_json::Error> for KvError {
    fn from(e: serde_json::Error) -> Self {
        KvError::Codec(e.to_string())
    }
}

impl From<bincode::Error> for KvError {
    fn from(e: bincode::Error) -> Self {
        KvError::Codec(e.to_string())
    }
}

impl From<crate::crypto::SecretError> for KvError {
    fn from(e: crate::crypto::SecretError) -> Self {
        KvError::Codec(e.to_string())
    }
}
