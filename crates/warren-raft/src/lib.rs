//! # warren-raft: Leader-based log replication
//!
//! A compact consensus implementation for the Warren control plane:
//! follower/candidate/leader roles, randomized election timeouts, quorum
//! commit, and snapshot-based catch-up for lagging peers.
//!
//! ## Shape
//!
//! The replica ([`RaftNode`]) is a synchronous state machine driven from
//! the outside:
//!
//! - [`RaftNode::step`] — feed one inbound protocol message
//! - [`RaftNode::tick`] — advance timers (election, heartbeat)
//! - [`RaftNode::propose`] — leader-only log append
//!
//! Each call returns an [`Output`]: protocol messages to send and log
//! entries that became committed. Durable state (log, term/vote,
//! snapshots) is persisted through `warren-storage` inside the calls —
//! before any message that promises a vote or acknowledges an append
//! leaves the node. Network IO lives entirely in the caller, which makes
//! multi-node clusters testable in-process via [`MemoryMesh`].
//!
//! ## Guarantees
//!
//! - Quorum = ⌊N/2⌋+1: clusters of 1/3/5 tolerate 0/1/2 failures.
//! - Committed entries are applied in index order, exactly once per
//!   state-machine image.
//! - A minority partition cannot commit; writes fail until quorum returns.

mod config;
mod error;
mod message;
mod node;
mod transport;
mod types;

#[cfg(test)]
mod tests;

pub use config::RaftConfig;
pub use error::RaftError;
pub use message::{
    AppendEntries, AppendResponse, Envelope, InstallSnapshot, Payload, RequestVote, SnapshotResponse,
    VoteResponse,
};
pub use node::{Output, RaftNode, Role};
pub use transport::{MemoryMesh, RaftTransport};
pub use types::ReplicaId;
