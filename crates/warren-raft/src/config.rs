//! Static consensus configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::ReplicaId;

/// Membership and timing for one consensus node.
///
/// Membership is static for the lifetime of the process; joint-consensus
/// reconfiguration is not part of the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaftConfig {
    /// This node's identity. Must appear in `members`.
    pub id: ReplicaId,
    /// All members (including this node), with their advertised address.
    pub members: BTreeMap<ReplicaId, String>,
    /// Base election timeout; the effective deadline is randomized in
    /// `[base, 2*base)` to break split votes.
    pub election_timeout: Duration,
    /// Leader heartbeat / replication period.
    pub heartbeat_interval: Duration,
}

impl RaftConfig {
    /// Single-node configuration, for tests and dev clusters.
    pub fn solo(address: impl Into<String>) -> Self {
        let id = ReplicaId::new(0);
        Self {
            id,
            members: BTreeMap::from([(id, address.into())]),
            election_timeout: Duration::from_secs(1),
            heartbeat_interval: Duration::from_millis(100),
        }
    }

    /// Peers other than this node.
    pub fn peers(&self) -> impl Iterator<Item = ReplicaId> + '_ {
        self.members.keys().copied().filter(|id| *id != self.id)
    }

    /// ⌊N/2⌋+1 of the members.
    pub fn quorum(&self) -> usize {
        self.members.len() / 2 + 1
    }

    /// Advertised address of a member, if known.
    pub fn address_of(&self, id: ReplicaId) -> Option<&str> {
        self.members.get(&id).map(String::as_str)
    }
}
