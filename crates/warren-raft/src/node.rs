//! The consensus replica.
//!
//! [`RaftNode`] is a synchronous state machine: the caller feeds it
//! inbound messages ([`RaftNode::step`]), clock ticks ([`RaftNode::tick`])
//! and proposals ([`RaftNode::propose`]); it returns the messages to send
//! and the entries that became committed. Durable state is written
//! through `warren-storage` before any promise leaves the node.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Instant;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use warren_storage::{LogEntry, LogStore, MetaStore, RaftMeta, SnapshotBlob, SnapshotStore};

use crate::config::RaftConfig;
use crate::error::RaftError;
use crate::message::{
    AppendEntries, AppendResponse, Envelope, InstallSnapshot, Payload, RequestVote,
    SnapshotResponse, VoteResponse,
};
use crate::types::ReplicaId;

/// Current role of a replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Follower,
    Candidate,
    Leader,
}

/// Result of one `step`/`tick`/`propose` call.
#[derive(Debug, Default)]
pub struct Output {
    /// Protocol messages for the transport to deliver.
    pub messages: Vec<Envelope>,
    /// Entries newly committed, in index order, ready for apply.
    pub committed: Vec<LogEntry>,
    /// Present when this node just installed a leader-sent snapshot;
    /// the caller must replace its state machine with this image.
    pub installed_snapshot: Option<SnapshotBlob>,
}

/// One consensus participant.
pub struct RaftNode {
    config: RaftConfig,
    role: Role,
    current_term: u64,
    voted_for: Option<ReplicaId>,
    leader_hint: Option<ReplicaId>,

    log: LogStore,
    meta: MetaStore,
    snapshots: SnapshotStore,
    /// Last index/term absorbed into the newest snapshot.
    snapshot_index: u64,
    snapshot_term: u64,

    commit_index: u64,
    /// Last index handed to the caller via `Output::committed`.
    delivered_index: u64,

    // Candidate state
    votes: BTreeSet<ReplicaId>,
    // Leader state
    next_index: BTreeMap<ReplicaId, u64>,
    match_index: BTreeMap<ReplicaId, u64>,

    election_deadline: Instant,
    next_heartbeat: Instant,
    rng: SmallRng,
}

impl RaftNode {
    /// Opens the node's durable state under `data_dir`.
    ///
    /// Returns the node plus the latest snapshot, if one exists, so the
    /// caller can restore its state machine before processing commits.
    pub fn open(
        config: RaftConfig,
        data_dir: &Path,
        now: Instant,
    ) -> Result<(Self, Option<SnapshotBlob>), RaftError> {
        if !config.members.contains_key(&config.id) {
            return Err(RaftError::Config(format!(
                "node {} is not in the member table",
                config.id
            )));
        }

        let mut log = LogStore::open(data_dir)?;
        let meta = MetaStore::open(data_dir)?;
        let snapshots = SnapshotStore::open(data_dir)?;

        let stored = meta.load()?;
        let snapshot = snapshots.load_latest()?;
        let (snapshot_index, snapshot_term) = snapshot
            .as_ref()
            .map_or((0, 0), |s| (s.last_index, s.last_term));

        // The log may retain entries the snapshot already covers if the
        // process died between snapshot save and compaction.
        if snapshot_index >= log.first_index() {
            log.compact_until(snapshot_index)?;
        }

        let mut node = Self {
            role: Role::Follower,
            current_term: stored.current_term,
            voted_for: stored.voted_for.map(ReplicaId::new),
            leader_hint: None,
            log,
            meta,
            snapshots,
            snapshot_index,
            snapshot_term,
            commit_index: snapshot_index,
            delivered_index: snapshot_index,
            votes: BTreeSet::new(),
            next_index: BTreeMap::new(),
            match_index: BTreeMap::new(),
            election_deadline: now,
            next_heartbeat: now,
            rng: SmallRng::from_entropy(),
            config,
        };
        node.reset_election_timer(now);

        Ok((node, snapshot))
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn id(&self) -> ReplicaId {
        self.config.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_leader(&self) -> bool {
        self.role == Role::Leader
    }

    /// The leader this node currently believes in, if any.
    pub fn leader_hint(&self) -> Option<ReplicaId> {
        self.leader_hint
    }

    pub fn term(&self) -> u64 {
        self.current_term
    }

    pub fn commit_index(&self) -> u64 {
        self.commit_index
    }

    pub fn last_log_index(&self) -> u64 {
        self.log.last_index().max(self.snapshot_index)
    }

    pub fn peer_count(&self) -> usize {
        self.config.members.len()
    }

    pub fn config(&self) -> &RaftConfig {
        &self.config
    }

    /// Term of the entry at `index`; 0 is "before any entry".
    fn term_at(&self, index: u64) -> Option<u64> {
        if index == 0 {
            Some(0)
        } else if index == self.snapshot_index {
            Some(self.snapshot_term)
        } else {
            self.log.term_of(index)
        }
    }

    fn last_log_term(&self) -> u64 {
        self.term_at(self.last_log_index()).unwrap_or(0)
    }

    // ========================================================================
    // Driving: tick / step / propose
    // ========================================================================

    /// Advances timers: election timeout for followers and candidates,
    /// heartbeat/replication for leaders.
    pub fn tick(&mut self, now: Instant) -> Result<Output, RaftError> {
        let mut out = Output::default();
        match self.role {
            Role::Leader => {
                if now >= self.next_heartbeat {
                    self.broadcast_append(&mut out)?;
                    self.next_heartbeat = now + self.config.heartbeat_interval;
                }
            }
            Role::Follower | Role::Candidate => {
                if now >= self.election_deadline {
                    self.start_election(now, &mut out)?;
                }
            }
        }
        self.deliver_committed(&mut out);
        Ok(out)
    }

    /// Processes one inbound protocol message.
    pub fn step(&mut self, envelope: Envelope, now: Instant) -> Result<Output, RaftError> {
        let mut out = Output::default();
        let from = envelope.from;

        // A higher term always demotes, whatever the payload.
        let term = payload_term(&envelope.payload);
        if term > self.current_term {
            self.become_follower(term)?;
        }

        match envelope.payload {
            Payload::RequestVote(req) => self.on_request_vote(from, req, now, &mut out)?,
            Payload::VoteResponse(resp) => self.on_vote_response(from, resp, now, &mut out)?,
            Payload::AppendEntries(req) => self.on_append_entries(from, req, now, &mut out)?,
            Payload::AppendResponse(resp) => self.on_append_response(from, resp, &mut out)?,
            Payload::InstallSnapshot(req) => self.on_install_snapshot(from, req, now, &mut out)?,
            Payload::SnapshotResponse(resp) => self.on_snapshot_response(from, resp),
        }

        self.deliver_committed(&mut out);
        Ok(out)
    }

    /// Appends a command to the replicated log. Leader only.
    ///
    /// Returns the assigned index; the entry is committed once a quorum
    /// acknowledges it, at which point it appears in `Output::committed`.
    pub fn propose(&mut self, data: Vec<u8>) -> Result<(u64, Output), RaftError> {
        if self.role != Role::Leader {
            return Err(RaftError::NotLeader {
                leader: self.leader_hint,
            });
        }
        let index = self.append_local(data)?;
        let mut out = Output::default();
        self.broadcast_append(&mut out)?;
        self.advance_commit();
        self.deliver_committed(&mut out);
        Ok((index, out))
    }

    /// Absorbs an application-produced snapshot: persists it and
    /// truncates the covered log prefix.
    ///
    /// `last_index` must not exceed the commit index — snapshotting
    /// uncommitted entries would let them survive a leader change.
    pub fn compact(&mut self, mut snapshot: SnapshotBlob) -> Result<(), RaftError> {
        debug_assert!(snapshot.last_index <= self.commit_index);
        if snapshot.last_index <= self.snapshot_index {
            return Ok(());
        }
        // Stamp the boundary term here; callers only know the index.
        let term = self
            .term_at(snapshot.last_index)
            .unwrap_or(self.current_term);
        snapshot.last_term = term;
        self.snapshots.save(&snapshot)?;
        self.snapshot_term = term;
        self.snapshot_index = snapshot.last_index;
        self.log.compact_until(snapshot.last_index)?;
        tracing::debug!(index = snapshot.last_index, "log compacted into snapshot");
        Ok(())
    }

    // ========================================================================
    // Elections
    // ========================================================================

    fn start_election(&mut self, now: Instant, out: &mut Output) -> Result<(), RaftError> {
        self.current_term += 1;
        self.role = Role::Candidate;
        self.voted_for = Some(self.config.id);
        self.leader_hint = None;
        self.votes = BTreeSet::from([self.config.id]);
        self.persist_meta()?;
        self.reset_election_timer(now);

        tracing::debug!(term = self.current_term, id = %self.config.id, "starting election");

        if self.votes.len() >= self.config.quorum() {
            self.become_leader(now, out)?;
            return Ok(());
        }

        let req = RequestVote {
            term: self.current_term,
            last_log_index: self.last_log_index(),
            last_log_term: self.last_log_term(),
        };
        for peer in self.config.peers() {
            out.messages.push(Envelope {
                from: self.config.id,
                to: peer,
                payload: Payload::RequestVote(req),
            });
        }
        Ok(())
    }

    fn on_request_vote(
        &mut self,
        from: ReplicaId,
        req: RequestVote,
        now: Instant,
        out: &mut Output,
    ) -> Result<(), RaftError> {
        let mut granted = false;
        if req.term == self.current_term {
            let can_vote = self.voted_for.is_none() || self.voted_for == Some(from);
            // Election safety: only vote for logs at least as complete
            // as ours.
            let up_to_date = (req.last_log_term, req.last_log_index)
                >= (self.last_log_term(), self.last_log_index());
            if can_vote && up_to_date {
                self.voted_for = Some(from);
                self.persist_meta()?;
                self.reset_election_timer(now);
                granted = true;
            }
        }
        out.messages.push(Envelope {
            from: self.config.id,
            to: from,
            payload: Payload::VoteResponse(VoteResponse {
                term: self.current_term,
                granted,
            }),
        });
        Ok(())
    }

    fn on_vote_response(
        &mut self,
        from: ReplicaId,
        resp: VoteResponse,
        now: Instant,
        out: &mut Output,
    ) -> Result<(), RaftError> {
        if self.role != Role::Candidate || resp.term != self.current_term || !resp.granted {
            return Ok(());
        }
        self.votes.insert(from);
        if self.votes.len() >= self.config.quorum() {
            self.become_leader(now, out)?;
        }
        Ok(())
    }

    fn become_leader(&mut self, now: Instant, out: &mut Output) -> Result<(), RaftError> {
        tracing::info!(term = self.current_term, id = %self.config.id, "won election");
        self.role = Role::Leader;
        self.leader_hint = Some(self.config.id);
        let next = self.last_log_index() + 1;
        self.next_index = self.config.peers().map(|p| (p, next)).collect();
        self.match_index = self.config.peers().map(|p| (p, 0)).collect();

        // A no-op entry in the new term lets prior-term entries commit
        // (commit only ever advances through a current-term entry).
        self.append_local(Vec::new())?;
        self.broadcast_append(out)?;
        self.next_heartbeat = now + self.config.heartbeat_interval;
        self.advance_commit();
        Ok(())
    }

    fn become_follower(&mut self, term: u64) -> Result<(), RaftError> {
        if self.role == Role::Leader {
            tracing::info!(term, id = %self.config.id, "stepping down");
        }
        self.role = Role::Follower;
        self.current_term = term;
        self.voted_for = None;
        self.leader_hint = None;
        self.votes.clear();
        self.persist_meta()
    }

    // ========================================================================
    // Log replication
    // ========================================================================

    fn append_local(&mut self, data: Vec<u8>) -> Result<u64, RaftError> {
        let index = self.last_log_index() + 1;
        self.log.append(&[LogEntry {
            term: self.current_term,
            index,
            data,
        }])?;
        Ok(index)
    }

    fn broadcast_append(&mut self, out: &mut Output) -> Result<(), RaftError> {
        for peer in self.config.peers().collect::<Vec<_>>() {
            self.send_append_to(peer, out)?;
        }
        Ok(())
    }

    fn send_append_to(&mut self, peer: ReplicaId, out: &mut Output) -> Result<(), RaftError> {
        let next = *self.next_index.get(&peer).unwrap_or(&1);
        let prev = next.saturating_sub(1);

        // The peer is behind the snapshot horizon; ship the image.
        if prev < self.snapshot_index {
            if let Some(snapshot) = self.snapshots.load_latest()? {
                out.messages.push(Envelope {
                    from: self.config.id,
                    to: peer,
                    payload: Payload::InstallSnapshot(InstallSnapshot {
                        term: self.current_term,
                        snapshot,
                    }),
                });
                return Ok(());
            }
        }

        let prev_log_term = self.term_at(prev).unwrap_or(0);
        let entries = self.log.range(next, self.last_log_index()).to_vec();
        out.messages.push(Envelope {
            from: self.config.id,
            to: peer,
            payload: Payload::AppendEntries(AppendEntries {
                term: self.current_term,
                prev_log_index: prev,
                prev_log_term,
                entries,
                leader_commit: self.commit_index,
            }),
        });
        Ok(())
    }

    fn on_append_entries(
        &mut self,
        from: ReplicaId,
        req: AppendEntries,
        now: Instant,
        out: &mut Output,
    ) -> Result<(), RaftError> {
        if req.term < self.current_term {
            out.messages.push(Envelope {
                from: self.config.id,
                to: from,
                payload: Payload::AppendResponse(AppendResponse {
                    term: self.current_term,
                    success: false,
                    match_index: 0,
                    conflict_index: 0,
                }),
            });
            return Ok(());
        }

        // Equal term: acknowledge the leader.
        self.role = Role::Follower;
        self.leader_hint = Some(from);
        self.reset_election_timer(now);

        // Consistency check against the previous entry.
        let consistent = if req.prev_log_index < self.snapshot_index {
            // The leader is probing below our snapshot horizon; resume
            // from just above it.
            false
        } else {
            self.term_at(req.prev_log_index) == Some(req.prev_log_term)
        };

        if !consistent {
            let conflict_index = if req.prev_log_index < self.snapshot_index {
                self.snapshot_index + 1
            } else {
                // Back off to our log end (or the mismatching slot).
                req.prev_log_index.min(self.last_log_index() + 1).max(1)
            };
            out.messages.push(Envelope {
                from: self.config.id,
                to: from,
                payload: Payload::AppendResponse(AppendResponse {
                    term: self.current_term,
                    success: false,
                    match_index: 0,
                    conflict_index,
                }),
            });
            return Ok(());
        }

        // Append new entries, truncating on term conflicts.
        for entry in &req.entries {
            match self.term_at(entry.index) {
                Some(existing) if existing == entry.term => {} // already have it
                Some(_) => {
                    self.log.truncate_from(entry.index)?;
                    self.log.append(std::slice::from_ref(entry))?;
                }
                None => {
                    self.log.append(std::slice::from_ref(entry))?;
                }
            }
        }

        let match_index = req.prev_log_index + req.entries.len() as u64;
        self.commit_index = self
            .commit_index
            .max(req.leader_commit.min(self.last_log_index()));

        out.messages.push(Envelope {
            from: self.config.id,
            to: from,
            payload: Payload::AppendResponse(AppendResponse {
                term: self.current_term,
                success: true,
                match_index,
                conflict_index: 0,
            }),
        });
        Ok(())
    }

    fn on_append_response(
        &mut self,
        from: ReplicaId,
        resp: AppendResponse,
        out: &mut Output,
    ) -> Result<(), RaftError> {
        if self.role != Role::Leader || resp.term != self.current_term {
            return Ok(());
        }

        if resp.success {
            let matched = self.match_index.entry(from).or_insert(0);
            *matched = (*matched).max(resp.match_index);
            self.next_index.insert(from, resp.match_index + 1);
            self.advance_commit();
        } else {
            let next = self.next_index.entry(from).or_insert(1);
            *next = if resp.conflict_index > 0 {
                resp.conflict_index
            } else {
                next.saturating_sub(1).max(1)
            };
            self.send_append_to(from, out)?;
        }
        Ok(())
    }

    fn on_install_snapshot(
        &mut self,
        from: ReplicaId,
        req: InstallSnapshot,
        now: Instant,
        out: &mut Output,
    ) -> Result<(), RaftError> {
        if req.term < self.current_term {
            return Ok(());
        }
        self.role = Role::Follower;
        self.leader_hint = Some(from);
        self.reset_election_timer(now);

        // Install only images strictly ahead of local progress: a
        // snapshot at or below our commit index would rewind delivery
        // and double-apply entries.
        if req.snapshot.last_index > self.snapshot_index
            && req.snapshot.last_index > self.commit_index
        {
            self.snapshots.save(&req.snapshot)?;
            self.snapshot_index = req.snapshot.last_index;
            self.snapshot_term = req.snapshot.last_term;
            // Discard the entire retained log; the image supersedes it.
            let first = self.log.first_index();
            self.log.truncate_from(first)?;
            self.log.compact_until(self.snapshot_index)?;
            self.commit_index = self.snapshot_index;
            self.delivered_index = self.snapshot_index;
            out.installed_snapshot = Some(req.snapshot);
        }

        out.messages.push(Envelope {
            from: self.config.id,
            to: from,
            payload: Payload::SnapshotResponse(SnapshotResponse {
                term: self.current_term,
                match_index: self.snapshot_index.max(self.commit_index),
            }),
        });
        Ok(())
    }

    fn on_snapshot_response(&mut self, from: ReplicaId, resp: SnapshotResponse) {
        if self.role != Role::Leader || resp.term != self.current_term {
            return;
        }
        self.match_index.insert(from, resp.match_index);
        self.next_index.insert(from, resp.match_index + 1);
        self.advance_commit();
    }

    // ========================================================================
    // Commit & delivery
    // ========================================================================

    /// Advances the commit index to the highest current-term entry
    /// replicated on a quorum.
    fn advance_commit(&mut self) {
        if self.role != Role::Leader {
            return;
        }
        let quorum = self.config.quorum();
        for n in (self.commit_index + 1..=self.last_log_index()).rev() {
            if self.term_at(n) != Some(self.current_term) {
                continue;
            }
            let replicas = 1 + self.match_index.values().filter(|&&m| m >= n).count();
            if replicas >= quorum {
                self.commit_index = n;
                break;
            }
        }
    }

    fn deliver_committed(&mut self, out: &mut Output) {
        while self.delivered_index < self.commit_index {
            let next = self.delivered_index + 1;
            let Some(entry) = self.log.get(next) else {
                // Covered by a snapshot the caller already installed.
                self.delivered_index = self.snapshot_index.max(self.delivered_index);
                if self.delivered_index < next {
                    break;
                }
                continue;
            };
            out.committed.push(entry.clone());
            self.delivered_index = next;
        }
    }

    // ========================================================================
    // Timers & persistence
    // ========================================================================

    fn reset_election_timer(&mut self, now: Instant) {
        let base = self.config.election_timeout;
        let jitter = self.rng.gen_range(0..=base.as_millis() as u64);
        self.election_deadline = now + base + std::time::Duration::from_millis(jitter);
    }

    fn persist_meta(&mut self) -> Result<(), RaftError> {
        self.meta.save(RaftMeta {
            current_term: self.current_term,
            voted_for: self.voted_for.map(|id| id.as_u64()),
        })?;
        Ok(())
    }
}

impl std::fmt::Debug for RaftNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RaftNode")
            .field("id", &self.config.id)
            .field("role", &self.role)
            .field("term", &self.current_term)
            .field("commit", &self.commit_index)
            .field("last_log", &self.last_log_index())
            .finish_non_exhaustive()
    }
}

fn payload_term(payload: &Payload) -> u64 {
    match payload {
        Payload::RequestVote(m) => m.term,
        Payload::VoteResponse(m) => m.term,
        Payload::AppendEntries(m) => m.term,
        Payload::AppendResponse(m) => m.term,
        Payload::InstallSnapshot(m) => m.term,
        Payload::SnapshotResponse(m) => m.term,
    }
}
