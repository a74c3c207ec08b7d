//! Consensus error types.

use crate::types::ReplicaId;

/// Errors surfaced by the consensus node.
#[derive(thiserror::Error, Debug)]
pub enum RaftError {
    /// This node cannot accept proposals; the hint names the leader if
    /// one is known.
    #[error("not the leader (known leader: {leader:?})")]
    NotLeader { leader: Option<ReplicaId> },

    #[error("storage: {0}")]
    Storage(#[from] warren_storage::StorageError),

    /// Config problems caught at construction.
    #[error("invalid configuration: {0}")]
    Config(String),
}
