use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::time::{Duration, Instant};

use tempfile::TempDir;
use warren_storage::LogEntry;

use crate::config::RaftConfig;
use crate::error::RaftError;
use crate::message::Envelope;
use crate::node::{Output, RaftNode, Role};
use crate::types::ReplicaId;

const ELECTION: Duration = Duration::from_millis(150);
const HEARTBEAT: Duration = Duration::from_millis(50);

/// Deterministic in-process cluster: messages queue in a mailbox and are
/// pumped explicitly, with optional partitions.
struct Cluster {
    nodes: BTreeMap<ReplicaId, RaftNode>,
    _dirs: Vec<TempDir>,
    now: Instant,
    mailbox: VecDeque<Envelope>,
    severed: BTreeSet<ReplicaId>,
}

impl Cluster {
    fn new(size: u64) -> Self {
        let members: BTreeMap<ReplicaId, String> = (0..size)
            .map(|i| (ReplicaId::new(i), format!("127.0.0.1:{}", 7000 + i)))
            .collect();
        let now = Instant::now();
        let mut nodes = BTreeMap::new();
        let mut dirs = Vec::new();
        for id in members.keys().copied() {
            let dir = TempDir::new().unwrap();
            let config = RaftConfig {
                id,
                members: members.clone(),
                election_timeout: ELECTION,
                heartbeat_interval: HEARTBEAT,
            };
            let (node, snapshot) = RaftNode::open(config, dir.path(), now).unwrap();
            assert!(snapshot.is_none());
            nodes.insert(id, node);
            dirs.push(dir);
        }
        Self {
            nodes,
            _dirs: dirs,
            now,
            mailbox: VecDeque::new(),
            severed: BTreeSet::new(),
        }
    }

    fn absorb(&mut self, out: Output) -> Vec<LogEntry> {
        self.mailbox.extend(out.messages);
        out.committed
    }

    /// Delivers queued messages until quiescent, dropping severed traffic.
    /// Returns committed entries per node.
    fn pump(&mut self) -> BTreeMap<ReplicaId, Vec<LogEntry>> {
        let mut committed: BTreeMap<ReplicaId, Vec<LogEntry>> = BTreeMap::new();
        while let Some(envelope) = self.mailbox.pop_front() {
            if self.severed.contains(&envelope.from) || self.severed.contains(&envelope.to) {
                continue;
            }
            let to = envelope.to;
            let now = self.now;
            let out = self.nodes.get_mut(&to).unwrap().step(envelope, now).unwrap();
            let entries = self.absorb(out);
            committed.entry(to).or_default().extend(entries);
        }
        committed
    }

    /// Forces `id` to start (and, absent competition, win) an election.
    fn elect(&mut self, id: ReplicaId) {
        self.now += ELECTION * 3;
        let now = self.now;
        let out = self.nodes.get_mut(&id).unwrap().tick(now).unwrap();
        self.absorb(out);
        self.pump();
        assert!(self.nodes[&id].is_leader(), "{id} should have won");
    }

    fn heartbeat(&mut self) -> BTreeMap<ReplicaId, Vec<LogEntry>> {
        self.now += HEARTBEAT * 2;
        let leaders: Vec<ReplicaId> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.is_leader())
            .map(|(id, _)| *id)
            .collect();
        for id in leaders {
            let now = self.now;
            let out = self.nodes.get_mut(&id).unwrap().tick(now).unwrap();
            self.absorb(out);
        }
        self.pump()
    }

    fn propose(&mut self, leader: ReplicaId, data: &[u8]) -> (u64, Vec<LogEntry>) {
        let (index, out) = self
            .nodes
            .get_mut(&leader)
            .unwrap()
            .propose(data.to_vec())
            .unwrap();
        let committed = self.absorb(out);
        (index, committed)
    }
}

#[test]
fn solo_node_elects_itself_and_commits_immediately() {
    let mut cluster = Cluster::new(1);
    let id = ReplicaId::new(0);
    cluster.elect(id);

    let (index, committed) = cluster.propose(id, b"cmd-1");
    // The no-op from election plus our command commit with quorum 1.
    let data: Vec<&[u8]> = committed.iter().map(|e| e.data.as_slice()).collect();
    assert!(data.contains(&&b"cmd-1"[..]));
    assert_eq!(cluster.nodes[&id].commit_index(), index);
}

#[test]
fn three_nodes_elect_one_leader_and_replicate() {
    let mut cluster = Cluster::new(3);
    let leader = ReplicaId::new(0);
    cluster.elect(leader);

    let leaders = cluster.nodes.values().filter(|n| n.is_leader()).count();
    assert_eq!(leaders, 1);

    let (index, _) = cluster.propose(leader, b"create-service");
    cluster.pump();
    // Another round so followers learn the advanced commit index.
    let committed = cluster.heartbeat();

    for (id, node) in &cluster.nodes {
        assert_eq!(node.commit_index(), index, "{id} lags");
    }
    let follower_committed = &committed[&ReplicaId::new(1)];
    assert!(follower_committed.iter().any(|e| e.data == b"create-service"));
}

#[test]
fn follower_rejects_proposals_with_leader_hint() {
    let mut cluster = Cluster::new(3);
    let leader = ReplicaId::new(0);
    cluster.elect(leader);
    cluster.heartbeat();

    let follower = cluster.nodes.get_mut(&ReplicaId::new(1)).unwrap();
    let err = follower.propose(b"nope".to_vec()).unwrap_err();
    match err {
        RaftError::NotLeader { leader: hint } => assert_eq!(hint, Some(leader)),
        other => panic!("expected NotLeader, got {other}"),
    }
}

#[test]
fn leader_loss_triggers_new_election_and_old_leader_steps_down() {
    let mut cluster = Cluster::new(3);
    let old = ReplicaId::new(0);
    cluster.elect(old);
    cluster.propose(old, b"before-partition");
    cluster.pump();
    cluster.heartbeat();

    // Partition the leader away; a remaining node times out and wins.
    cluster.severed.insert(old);
    let new = ReplicaId::new(1);
    cluster.elect(new);
    assert!(cluster.nodes[&new].term() > cluster.nodes[&old].term());

    let (index, _) = cluster.propose(new, b"after-failover");
    cluster.pump();
    cluster.heartbeat();
    assert_eq!(cluster.nodes[&new].commit_index(), index);

    // Heal: the deposed leader observes the higher term and follows.
    cluster.severed.clear();
    cluster.heartbeat();
    cluster.heartbeat();
    assert_eq!(cluster.nodes[&old].role(), Role::Follower);
    assert_eq!(cluster.nodes[&old].commit_index(), index);
}

#[test]
fn minority_partition_cannot_commit() {
    let mut cluster = Cluster::new(3);
    let leader = ReplicaId::new(0);
    cluster.elect(leader);
    cluster.heartbeat();
    let before = cluster.nodes[&leader].commit_index();

    // Leader alone in the minority: both followers unreachable.
    cluster.severed.insert(ReplicaId::new(1));
    cluster.severed.insert(ReplicaId::new(2));

    cluster.propose(leader, b"doomed");
    cluster.pump();
    cluster.heartbeat();
    assert_eq!(
        cluster.nodes[&leader].commit_index(),
        before,
        "no quorum, no commit"
    );
}

#[test]
fn lagging_follower_catches_up_through_backoff() {
    let mut cluster = Cluster::new(3);
    let leader = ReplicaId::new(0);
    cluster.elect(leader);
    cluster.heartbeat();

    let laggard = ReplicaId::new(2);
    cluster.severed.insert(laggard);
    for i in 0..5 {
        cluster.propose(leader, format!("cmd-{i}").as_bytes());
        cluster.pump();
    }
    cluster.heartbeat();

    cluster.severed.clear();
    // A few heartbeat rounds for probe/backoff/append to converge.
    for _ in 0..4 {
        cluster.heartbeat();
    }
    assert_eq!(
        cluster.nodes[&laggard].commit_index(),
        cluster.nodes[&leader].commit_index()
    );
    assert_eq!(
        cluster.nodes[&laggard].last_log_index(),
        cluster.nodes[&leader].last_log_index()
    );
}

#[test]
fn snapshot_install_catches_up_a_far_behind_peer() {
    let mut cluster = Cluster::new(3);
    let leader = ReplicaId::new(0);
    cluster.elect(leader);
    cluster.heartbeat();

    let laggard = ReplicaId::new(2);
    cluster.severed.insert(laggard);
    for i in 0..10 {
        cluster.propose(leader, format!("cmd-{i}").as_bytes());
        cluster.pump();
    }
    cluster.heartbeat();

    // Compact the leader's log so the laggard's entries are gone.
    let commit = cluster.nodes[&leader].commit_index();
    cluster
        .nodes
        .get_mut(&leader)
        .unwrap()
        .compact(warren_storage::SnapshotBlob {
            last_index: commit,
            last_term: 0, // stamped by compact()
            state: b"state-image".to_vec(),
        })
        .unwrap();

    cluster.severed.clear();
    let mut installed = false;
    for _ in 0..4 {
        cluster.now += HEARTBEAT * 2;
        let now = cluster.now;
        let out = cluster.nodes.get_mut(&leader).unwrap().tick(now).unwrap();
        cluster.absorb(out);
        // Deliver, watching for the snapshot to land on the laggard.
        while let Some(envelope) = cluster.mailbox.pop_front() {
            let to = envelope.to;
            let out = cluster.nodes.get_mut(&to).unwrap().step(envelope, now).unwrap();
            if to == laggard {
                if let Some(snapshot) = &out.installed_snapshot {
                    assert_eq!(snapshot.state, b"state-image");
                    installed = true;
                }
            }
            cluster.mailbox.extend(out.messages);
        }
    }
    assert!(installed, "laggard should have received a snapshot");
    assert_eq!(
        cluster.nodes[&laggard].commit_index(),
        cluster.nodes[&leader].commit_index()
    );
}

#[test]
fn vote_denied_to_less_complete_log() {
    let mut cluster = Cluster::new(3);
    let leader = ReplicaId::new(0);
    cluster.elect(leader);
    cluster.propose(leader, b"entry");
    cluster.pump();
    cluster.heartbeat();

    // Node 2 misses an entry, then asks for votes.
    let behind = ReplicaId::new(2);
    cluster.severed.insert(behind);
    cluster.propose(leader, b"missed");
    cluster.pump();
    cluster.heartbeat();
    cluster.severed.clear();

    cluster.now += ELECTION * 3;
    let now = cluster.now;
    let out = cluster.nodes.get_mut(&behind).unwrap().tick(now).unwrap();
    cluster.absorb(out);
    cluster.pump();
    assert!(
        !cluster.nodes[&behind].is_leader(),
        "a log missing committed entries must not win"
    );
}

#[test]
fn restart_preserves_term_vote_and_log() {
    let dir = TempDir::new().unwrap();
    let now = Instant::now();
    let config = RaftConfig::solo("127.0.0.1:7000");

    let commit = {
        let (mut node, _) = RaftNode::open(config.clone(), dir.path(), now).unwrap();
        let out = node.tick(now + ELECTION * 3).unwrap();
        assert!(node.is_leader());
        drop(out);
        let (_, out) = node.propose(b"persisted".to_vec()).unwrap();
        assert!(out.committed.iter().any(|e| e.data == b"persisted"));
        node.commit_index()
    };

    let (mut node, snapshot) = RaftNode::open(config, dir.path(), now).unwrap();
    assert!(snapshot.is_none());
    assert!(node.term() >= 1);
    assert_eq!(node.last_log_index(), commit);

    // After re-election the preserved entries commit again on the fresh
    // state machine.
    let out = node.tick(now + ELECTION * 6).unwrap();
    assert!(node.is_leader());
    assert!(out.committed.iter().any(|e| e.data == b"persisted"));
}

#[test]
fn quorum_sizes() {
    for (members, expect) in [(1, 1), (3, 2), (5, 3)] {
        let members_map: BTreeMap<ReplicaId, String> = (0..members)
            .map(|i| (ReplicaId::new(i), String::new()))
            .collect();
        let config = RaftConfig {
            id: ReplicaId::new(0),
            members: members_map,
            election_timeout: ELECTION,
            heartbeat_interval: HEARTBEAT,
        };
        assert_eq!(config.quorum(), expect);
    }
}
