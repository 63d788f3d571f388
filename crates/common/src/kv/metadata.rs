use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};

use super::config::DEFAULT_MAX_VERSIONS;

/// Lifecycle state of a single version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionState {
    Live,
    Deleted,
    Destroyed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionMetadata {
    pub created_time: DateTime<Utc>,
    /// Soft-delete or expiry time. Once it has passed the version reads as deleted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub destroyed: bool,
}

impl VersionMetadata {
    pub fn is_deleted_at(&self, now: DateTime<Utc>) -> bool {
        self.deletion_time.is_some_and(|t| t <= now)
    }

    pub fn state_at(&self, now: DateTime<Utc>) -> VersionState {
        if self.destroyed {
            VersionState::Destroyed
        } else if self.is_deleted_at(now) {
            VersionState::Deleted
        } else {
            VersionState::Live
        }
    }
}

/// Everything known about a logical key apart from its payloads
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMetadata {
    pub key: String,
    pub current_version: u64,
    pub oldest_version: u64,
    #[serde(default)]
    pub versions: BTreeMap<u64, VersionMetadata>,
    /// Zero defers to the mount configuration
    #[serde(default)]
    pub max_versions: u32,
    #[serde(default)]
    pub cas_required: bool,
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete_version_after: Option<Duration>,
    #[serde(default)]
    pub custom_metadata: BTreeMap<String, String>,
    pub created_time: Option<DateTime<Utc>>,
    pub updated_time: Option<DateTime<Utc>>,
}

/// Partial update applied by a metadata write
#[serde_as]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataUpdate {
    pub max_versions: Option<u32>,
    pub cas_required: Option<bool>,
    /// A zero duration clears the setting
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    pub delete_version_after: Option<Duration>,
    pub custom_metadata: Option<BTreeMap<String, String>>,
}

impl KeyMetadata {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            current_version: 0,
            oldest_version: 0,
            versions: BTreeMap::new(),
            max_versions: 0,
            cas_required: false,
            delete_version_after: None,
            custom_metadata: BTreeMap::new(),
            created_time: None,
            updated_time: None,
        }
    }

    /// Version retention limit: the key's own setting, then the mount's, then the default
    pub fn effective_max_versions(&self, config_max: u32) -> u32 {
        if self.max_versions != 0 {
            self.max_versions
        } else if config_max != 0 {
            config_max
        } else {
            DEFAULT_MAX_VERSIONS
        }
    }

    /// Expiry applied to new versions: the shorter of the key and mount settings
    pub fn effective_delete_after(&self, config_after: Option<Duration>) -> Option<Duration> {
        let key_after = self.delete_version_after.filter(|d| !d.is_zero());
        let config_after = config_after.filter(|d| !d.is_zero());
        match (key_after, config_after) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Record a new version created at `ts`
    ///
    /// Returns the new version's metadata and the newest version evicted by
    ///  the sliding retention window, or `0` if nothing was evicted. Every
    ///  version from the previous `oldest_version` up to the returned one has
    ///  been dropped from `versions`.
    pub fn add_version(
        &mut self,
        ts: DateTime<Utc>,
        delete_after: Option<Duration>,
        config_max: u32,
    ) -> (VersionMetadata, u64) {
        let version = self.current_version + 1;
        let deletion_time = delete_after
            .filter(|d| !d.is_zero())
            .and_then(|d| chrono::Duration::from_std(d).ok())
            .and_then(|d| ts.checked_add_signed(d));

        let vm = VersionMetadata {
            created_time: ts,
            deletion_time,
            destroyed: false,
        };
        self.versions.insert(version, vm.clone());
        self.current_version = version;
        self.updated_time = Some(ts);
        if self.created_time.is_none() {
            self.created_time = Some(ts);
        }

        let max = u64::from(self.effective_max_versions(config_max));
        if version - self.oldest_version >= max {
            let evict = version - max;
            self.versions.retain(|v, _| *v > evict);
            self.oldest_version = evict + 1;
            return (vm, evict);
        }

        (vm, 0)
    }

    pub fn apply(&mut self, update: &MetadataUpdate, now: DateTime<Utc>) {
        if let Some(max_versions) = update.max_versions {
            self.max_versions = max_versions;
        }
        if let Some(cas_required) = update.cas_required {
            self.cas_required = cas_required;
        }
        if let Some(after) = update.delete_version_after {
            self.delete_version_after = (!after.is_zero()).then_some(after);
        }
        if let Some(custom) = &update.custom_metadata {
            self.custom_metadata = custom.clone();
        }
        if self.created_time.is_none() {
            self.created_time = Some(now);
        }
        self.updated_time = Some(now);
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}
