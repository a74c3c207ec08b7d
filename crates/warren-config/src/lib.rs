//! Configuration management for Warren.
//!
//! Layered loading with the usual precedence, lowest first: built-in
//! defaults, user config (`~/.config/warren/config.toml`), project
//! config (`warren.toml`), local overrides (`warren.local.toml`,
//! gitignored), then `WARREN_*` environment variables. See
//! [`ConfigLoader`] for how the layers are read, merged, and validated.
//!
//! Timing values are plain integers (`*_ms`, `*_secs`) so the TOML
//! stays hand-editable; the manager converts them to `Duration` when
//! wiring components.

mod error;
mod loader;

pub use error::ConfigError;
pub use loader::ConfigLoader;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Root configuration for a Warren manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WarrenConfig {
    pub node: NodeSection,
    pub cluster: ClusterSection,
    pub store: StoreSection,
    pub scheduler: SchedulerSection,
    pub reconciler: ReconcilerSection,
    pub deploy: DeploySection,
}

/// Identity of this manager process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    pub name: String,
    /// Log, metadata, and snapshot stores live here.
    pub data_dir: PathBuf,
    /// Address advertised to peers and workers.
    pub address: String,
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            name: "manager-0".to_string(),
            data_dir: PathBuf::from(".warren/data"),
            address: "127.0.0.1:7000".to_string(),
        }
    }
}

/// One consensus member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: u64,
    pub address: String,
}

/// Consensus membership and timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterSection {
    /// This node's replica id; must appear in `members`.
    pub replica_id: u64,
    /// All managers. A single entry is a valid dev cluster.
    pub members: Vec<Member>,
    pub election_timeout_ms: u64,
    pub heartbeat_interval_ms: u64,
}

impl Default for ClusterSection {
    fn default() -> Self {
        Self {
            replica_id: 0,
            members: vec![Member {
                id: 0,
                address: "127.0.0.1:7000".to_string(),
            }],
            election_timeout_ms: 1_000,
            heartbeat_interval_ms: 100,
        }
    }
}

impl ClusterSection {
    /// Member table keyed by id, the shape the consensus layer wants.
    pub fn member_map(&self) -> BTreeMap<u64, String> {
        self.members
            .iter()
            .map(|m| (m.id, m.address.clone()))
            .collect()
    }
}

/// Replicated store tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    pub snapshot_threshold: u64,
    pub snapshot_interval_secs: u64,
    pub submit_timeout_ms: u64,
    pub event_buffer: usize,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            snapshot_threshold: 8192,
            snapshot_interval_secs: 600,
            submit_timeout_ms: 5_000,
            event_buffer: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    pub tick_interval_secs: u64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            tick_interval_secs: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerSection {
    pub tick_interval_secs: u64,
    pub heartbeat_timeout_secs: u64,
    pub gc_grace_secs: u64,
}

impl Default for ReconcilerSection {
    fn default() -> Self {
        Self {
            tick_interval_secs: 10,
            heartbeat_timeout_secs: 30,
            gc_grace_secs: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploySection {
    pub health_poll_secs: u64,
    pub health_timeout_secs: u64,
}

impl Default for DeploySection {
    fn default() -> Self {
        Self {
            health_poll_secs: 5,
            health_timeout_secs: 300,
        }
    }
}

impl WarrenConfig {
    /// Anchors relative paths at the project directory.
    pub fn resolve_paths(&mut self, project_dir: &Path) {
        if self.node.data_dir.is_relative() {
            self.node.data_dir = project_dir.join(&self.node.data_dir);
        }
    }

    /// Sanity checks that cannot be expressed in the type shape.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cluster.members.is_empty() {
            return Err(ConfigError::Invalid(
                "cluster.members must not be empty".to_string(),
            ));
        }
        if !self
            .cluster
            .members
            .iter()
            .any(|m| m.id == self.cluster.replica_id)
        {
            return Err(ConfigError::Invalid(format!(
                "replica_id {} is not in cluster.members",
                self.cluster.replica_id
            )));
        }
        if self.cluster.election_timeout_ms <= self.cluster.heartbeat_interval_ms {
            return Err(ConfigError::Invalid(
                "election_timeout_ms must exceed heartbeat_interval_ms".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        WarrenConfig::default().validate().unwrap();
    }

    #[test]
    fn validation_catches_unknown_replica_id() {
        let mut config = WarrenConfig::default();
        config.cluster.replica_id = 9;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn validation_catches_inverted_timeouts() {
        let mut config = WarrenConfig::default();
        config.cluster.election_timeout_ms = 50;
        assert!(config.validate().is_err());
    }

    #[test]
    fn resolve_paths_anchors_relative_data_dir() {
        let mut config = WarrenConfig::default();
        config.resolve_paths(Path::new("/srv/warren"));
        assert_eq!(config.node.data_dir, PathBuf::from("/srv/warren/.warren/data"));

        // Absolute paths are left alone.
        let mut config = WarrenConfig::default();
        config.node.data_dir = PathBuf::from("/var/lib/warren");
        config.resolve_paths(Path::new("/srv/warren"));
        assert_eq!(config.node.data_dir, PathBuf::from("/var/lib/warren"));
    }

    #[test]
    fn toml_round_trip() {
        let config = WarrenConfig::default();
        let text = toml::to_string(&config).unwrap();
        let back: WarrenConfig = toml::from_str(&text).unwrap();
        assert_eq!(config, back);
    }
}
