//! Versioned key-value engine
//!
//! [`KvBackend`] ties the pieces together for one mount:
//!
//! - **Metadata** ([`KeyMetadata`]): per-key version map and retention
//!   settings, stored through the encrypted key namespace
//! - **Payloads** ([`VersionStore`]): sealed version data at salted paths
//! - **Locks**: every operation on a key holds its stripe of the
//!   [`LockSet`](crate::locks::LockSet), shared for reads and exclusive for writes
//! - **Upgrade**: one-shot migration of a legacy unversioned mount, during
//!   which every request is refused
//!
//! # Write ordering
//!
//! New versions write the payload before the metadata that references it.
//!  Destroys write the metadata before removing the payload. A crash
//!  between the two steps leaves at worst an unreferenced payload on disk,
//!  never metadata pointing at missing data.

mod backend;
mod config;
mod error;
mod invalidate;
mod metadata;
mod subkeys;
mod types;
mod upgrade;
mod versions;

pub use backend::{BackendOptions, KvBackend, DEFAULT_UPGRADE_POLL_INTERVAL};
pub use config::{ConfigCache, ConfigUpdate, Configuration, CONFIG_PATH, DEFAULT_MAX_VERSIONS};
pub use error::{ErrorKind, KvError};
pub use metadata::{KeyMetadata, MetadataUpdate, VersionMetadata, VersionState};
pub use subkeys::subkeys;
pub use types::{SecretVersion, SubkeysResponse, VersionInfo, WriteOptions, WriteResponse};
pub use upgrade::{is_reserved, UPGRADE_CANARY_PATH};
pub use versions::{VersionPayload, VersionStore};
