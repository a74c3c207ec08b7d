//! Replication protocol messages.
//!
//! ## Normal operation
//! - [`AppendEntries`] — Leader → Follower: replicate entries / heartbeat
//! - [`AppendResponse`] — Follower → Leader: accepted or conflict hint
//!
//! ## Elections
//! - [`RequestVote`] — Candidate → All: vote for me
//! - [`VoteResponse`] — Peer → Candidate: granted or not
//!
//! ## Catch-up
//! - [`InstallSnapshot`] — Leader → Follower: full state image
//! - [`SnapshotResponse`] — Follower → Leader: installed up to index

use serde::{Deserialize, Serialize};
use warren_storage::{LogEntry, SnapshotBlob};

use crate::types::ReplicaId;

/// A protocol message with routing information.
///
/// All replication traffic is targeted; there are no broadcasts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub from: ReplicaId,
    pub to: ReplicaId,
    pub payload: Payload,
}

/// The payload of a protocol message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    RequestVote(RequestVote),
    VoteResponse(VoteResponse),
    AppendEntries(AppendEntries),
    AppendResponse(AppendResponse),
    InstallSnapshot(InstallSnapshot),
    SnapshotResponse(SnapshotResponse),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestVote {
    pub term: u64,
    pub last_log_index: u64,
    pub last_log_term: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteResponse {
    pub term: u64,
    pub granted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendEntries {
    pub term: u64,
    /// Index of the entry immediately before `entries`.
    pub prev_log_index: u64,
    /// Term of that entry (or of the snapshot boundary).
    pub prev_log_term: u64,
    /// Empty for pure heartbeats.
    pub entries: Vec<LogEntry>,
    pub leader_commit: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendResponse {
    pub term: u64,
    pub success: bool,
    /// On success: highest index now matching the leader's log.
    pub match_index: u64,
    /// On failure: where the leader should resume probing from.
    pub conflict_index: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallSnapshot {
    pub term: u64,
    pub snapshot: SnapshotBlob,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotResponse {
    pub term: u64,
    /// Index the follower's state machine now reflects.
    pub match_index: u64,
}
