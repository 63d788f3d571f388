use std::fmt::Debug;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Replication role of the node a mount is served from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicationState {
    /// Standalone node, or the primary of a replicated cluster
    #[default]
    Primary,
    PerformanceSecondary,
    PerformanceStandby,
    DrSecondary,
}

impl ReplicationState {
    /// Whether this node only observes state written by a primary
    pub fn is_secondary(&self) -> bool {
        !matches!(self, ReplicationState::Primary)
    }
}

impl FromStr for ReplicationState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" => Ok(Self::Primary),
            "performance_secondary" => Ok(Self::PerformanceSecondary),
            "performance_standby" => Ok(Self::PerformanceStandby),
            "dr_secondary" => Ok(Self::DrSecondary),
            other => Err(format!("unknown replication state: {}", other)),
        }
    }
}

/// What the engine needs to know about the node it runs on
pub trait SystemView: Send + Sync + Debug + 'static {
    /// Whether the mount is local to this node and never replicated
    fn local_mount(&self) -> bool;

    fn replication_state(&self) -> ReplicationState;
}

/// A [`SystemView`] with fixed answers, set at startup from configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticSystemView {
    pub local_mount: bool,
    pub replication_state: ReplicationState,
}

impl StaticSystemView {
    pub fn new(local_mount: bool, replication_state: ReplicationState) -> Self {
        Self {
            local_mount,
            replication_state,
        }
    }
}

impl SystemView for StaticSystemView {
    fn local_mount(&self) -> bool {
        self.local_mount
    }

    fn replication_state(&self) -> ReplicationState {
        self.replication_state
    }
}
