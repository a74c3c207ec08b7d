//! Store error taxonomy.
//!
//! Mirrors the caller contract: validation failures are returned, not
//! retried; leadership errors carry a forwarding address; timeouts are
//! ambiguous and resolved by re-reading state and retrying idempotent
//! commands.

use warren_kernel::KernelError;

/// Errors from [`crate::Store::submit`].
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// This node is not the leader; forward to `leader` if present.
    #[error("not the leader (leader: {leader:?})")]
    NotLeader { leader: Option<String> },

    /// The command was rejected by the state machine. No state changed.
    #[error("apply rejected: {0}")]
    Apply(#[from] KernelError),

    /// Commit did not complete within the deadline. The command may or
    /// may not have applied; re-read state before retrying.
    #[error("commit timed out")]
    Timeout,

    /// The log slot this command was proposed into was overwritten by a
    /// new leader; the command did not apply.
    #[error("proposal superseded by a new leader")]
    Superseded,

    /// The store is shutting down.
    #[error("store is shutting down")]
    ShuttingDown,

    #[error("consensus: {0}")]
    Raft(#[from] warren_raft::RaftError),

    #[error("storage: {0}")]
    Storage(#[from] warren_storage::StorageError),
}
