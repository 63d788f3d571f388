/**
 * Cryptographic types and operations.
 *  - Convergent path policy and its cached handle
 *  - Payload sealing secrets
 */
pub mod crypto;
/**
 * The versioned key-value engine itself:
 *  metadata, version payloads, CAS, retention,
 *  the legacy upgrade and cache invalidation.
 */
pub mod kv;
/**
 * Hash-striped per-key read/write locks.
 */
pub mod locks;
/**
 * Per-mount salt used to derive opaque
 *  version payload paths.
 */
pub mod salt;
/**
 * Physical storage trait, in-memory and prefixed
 *  implementations, and the wrapper that encrypts
 *  every path segment.
 */
pub mod storage;
/**
 * What the engine is told about the node it
 *  runs on (replication role, mount locality).
 */
pub mod system;
/**
 * Helper for setting build version information
 *  at compile time.
 */
pub mod version;

pub mod prelude {
    pub use crate::crypto::{Policy, PolicyHandle, Secret};
    pub use crate::kv::{
        ConfigUpdate, Configuration, ErrorKind, KeyMetadata, KvBackend, KvError, MetadataUpdate,
        SecretVersion, WriteOptions, WriteResponse,
    };
    pub use crate::storage::{MemoryStorage, PrefixedStorage, Storage, StorageEntry, StorageError};
    pub use crate::system::{ReplicationState, StaticSystemView, SystemView};
    pub use crate::version::build_info;
}
