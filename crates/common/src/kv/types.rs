use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::metadata::{KeyMetadata, VersionMetadata};

/// Version details returned alongside reads and writes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: u64,
    pub created_time: DateTime<Utc>,
    pub deletion_time: Option<DateTime<Utc>>,
    pub destroyed: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_metadata: BTreeMap<String, String>,
}

impl VersionInfo {
    pub fn new(version: u64, vm: &VersionMetadata, meta: &KeyMetadata) -> Self {
        Self {
            version,
            created_time: vm.created_time,
            deletion_time: vm.deletion_time,
            destroyed: vm.destroyed,
            custom_metadata: meta.custom_metadata.clone(),
        }
    }
}

/// Result of reading a version that exists in metadata.
///  `data` is `None` when the version is deleted or destroyed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecretVersion {
    pub data: Option<Map<String, Value>>,
    pub metadata: VersionInfo,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOptions {
    /// Expected current version. `0` only succeeds for a key with no versions.
    pub cas: Option<u64>,
}

impl WriteOptions {
    pub fn cas(cas: u64) -> Self {
        Self { cas: Some(cas) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteResponse {
    #[serde(flatten)]
    pub metadata: VersionInfo,
    /// Cleanup problems that did not fail the write
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubkeysResponse {
    pub subkeys: Option<Map<String, Value>>,
    pub metadata: VersionInfo,
}
