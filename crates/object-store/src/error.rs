//! Error types for the object storage backend.

/// Errors that can occur when setting up or talking to object storage.
#[derive(Debug, thiserror::Error)]
pub enum ObjectStorageError {
    /// Object storage error
    #[error("object storage error: {0}")]
    ObjectStore(#[from] object_store::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// S3 bucket not found - must be created before use
    #[error("S3 bucket '{0}' does not exist. Create it before starting the node.")]
    BucketNotFound(String),
}

/// Result type alias for object storage setup.
pub type Result<T> = std::result::Result<T, ObjectStorageError>;
