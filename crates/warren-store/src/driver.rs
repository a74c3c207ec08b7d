//! The drive loop: the one task that owns the consensus node and the
//! kernel state.
//!
//! Everything serializes through here — inbound consensus traffic,
//! timer ticks, and submit requests — so the state machine needs no
//! locks of its own. After each iteration the loop pushes the applied
//! state and progress counters into the shared handles the facade
//! reads from.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot, watch};
use warren_kernel::{Command, State, apply_committed};
use warren_raft::{Envelope, Output, RaftNode, RaftTransport};
use warren_storage::SnapshotBlob;

use crate::error::StoreError;
use crate::store::{Shared, StoreConfig, StoreStats};

pub(crate) struct SubmitRequest {
    pub(crate) cmd: Command,
    pub(crate) reply: oneshot::Sender<Result<(), StoreError>>,
}

/// A submitter waiting for its log slot to apply.
struct Waiter {
    term: u64,
    reply: oneshot::Sender<Result<(), StoreError>>,
}

pub(crate) struct Driver {
    node: RaftNode,
    state: Arc<State>,
    applied_index: u64,
    shared: Arc<Shared>,
    transport: Arc<dyn RaftTransport>,
    inbox: mpsc::UnboundedReceiver<Envelope>,
    submit_rx: mpsc::Receiver<SubmitRequest>,
    shutdown: watch::Receiver<bool>,
    waiters: BTreeMap<u64, Waiter>,

    snapshot_threshold: u64,
    snapshot_interval: std::time::Duration,
    entries_since_snapshot: u64,
    last_snapshot_at: Instant,
    tick_interval: std::time::Duration,
}

impl Driver {
    pub(crate) fn open(
        config: StoreConfig,
        shared: Arc<Shared>,
        transport: Arc<dyn RaftTransport>,
        inbox: mpsc::UnboundedReceiver<Envelope>,
        submit_rx: mpsc::Receiver<SubmitRequest>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self, StoreError> {
        let now = Instant::now();
        // Tick fast enough that heartbeat deadlines are hit with slack.
        let tick_interval = config.raft.heartbeat_interval / 2;
        let (node, snapshot) = RaftNode::open(config.raft, &config.data_dir, now)?;

        let mut state = Arc::new(State::new());
        let mut applied_index = 0;
        if let Some(blob) = snapshot {
            state = Arc::new(decode_state(&blob)?);
            applied_index = blob.last_index;
            tracing::info!(index = applied_index, "restored state from snapshot");
        }

        *shared.state.write().expect("state lock poisoned") = Arc::clone(&state);

        Ok(Self {
            node,
            state,
            applied_index,
            shared,
            transport,
            inbox,
            submit_rx,
            shutdown,
            waiters: BTreeMap::new(),
            snapshot_threshold: config.snapshot_threshold,
            snapshot_interval: config.snapshot_interval,
            entries_since_snapshot: 0,
            last_snapshot_at: now,
            tick_interval,
        })
    }

    pub(crate) async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            let output = tokio::select! {
                _ = ticker.tick() => {
                    match self.node.tick(Instant::now()) {
                        Ok(out) => Some(out),
                        Err(e) => {
                            tracing::error!(component = "store", error = %e, "tick failed");
                            None
                        }
                    }
                }
                Some(envelope) = self.inbox.recv() => {
                    match self.node.step(envelope, Instant::now()) {
                        Ok(out) => Some(out),
                        Err(e) => {
                            tracing::error!(component = "store", error = %e, "step failed");
                            None
                        }
                    }
                }
                Some(request) = self.submit_rx.recv() => self.handle_submit(request),
                _ = self.shutdown.changed() => break,
            };

            if let Some(output) = output {
                self.process(output);
            }
            self.publish_stats();
        }

        // Drain: outstanding submitters learn the store is gone.
        for (_, waiter) in std::mem::take(&mut self.waiters) {
            let _ = waiter.reply.send(Err(StoreError::ShuttingDown));
        }
        tracing::info!(component = "store", "drive loop stopped");
    }

    fn handle_submit(&mut self, request: SubmitRequest) -> Option<Output> {
        match self.node.propose(request.cmd.encode()) {
            Ok((index, output)) => {
                self.waiters.insert(
                    index,
                    Waiter {
                        term: self.node.term(),
                        reply: request.reply,
                    },
                );
                Some(output)
            }
            Err(warren_raft::RaftError::NotLeader { leader }) => {
                let address = leader
                    .and_then(|id| self.node.config().address_of(id))
                    .map(str::to_string);
                let _ = request
                    .reply
                    .send(Err(StoreError::NotLeader { leader: address }));
                None
            }
            Err(e) => {
                let _ = request.reply.send(Err(e.into()));
                None
            }
        }
    }

    fn process(&mut self, output: Output) {
        for message in output.messages {
            self.transport.send(message);
        }

        if let Some(blob) = output.installed_snapshot {
            match decode_state(&blob) {
                Ok(restored) => {
                    self.state = Arc::new(restored);
                    self.applied_index = blob.last_index;
                    self.entries_since_snapshot = 0;
                    *self.shared.state.write().expect("state lock poisoned") =
                        Arc::clone(&self.state);
                    tracing::info!(index = blob.last_index, "installed leader snapshot");
                }
                Err(e) => {
                    tracing::error!(component = "store", error = %e, "failed to decode snapshot");
                }
            }
        }

        if output.committed.is_empty() {
            self.maybe_snapshot();
            return;
        }

        for entry in output.committed {
            self.apply_entry(entry);
        }
        *self.shared.state.write().expect("state lock poisoned") = Arc::clone(&self.state);
        self.maybe_snapshot();
    }

    fn apply_entry(&mut self, entry: warren_storage::LogEntry) {
        debug_assert_eq!(entry.index, self.applied_index + 1, "apply order is strict");
        self.applied_index = entry.index;
        self.entries_since_snapshot += 1;

        // Leader no-op entries carry no command.
        let result = if entry.data.is_empty() {
            Ok(Vec::new())
        } else {
            Command::decode(&entry.data).and_then(|cmd| {
                tracing::debug!(component = "store", index = entry.index, kind = cmd.kind(), "apply");
                apply_committed(Arc::make_mut(&mut self.state), cmd)
            })
        };

        let reply = match result {
            Ok(events) => {
                for event in events {
                    self.shared.events.publish(event);
                }
                Ok(())
            }
            Err(e) => {
                tracing::warn!(component = "store", index = entry.index, error = %e, "command rejected");
                Err(StoreError::Apply(e))
            }
        };

        if let Some(waiter) = self.waiters.remove(&entry.index) {
            // A different term in this slot means the submitter's
            // proposal was discarded by a leader change.
            let response = if waiter.term == entry.term {
                reply
            } else {
                Err(StoreError::Superseded)
            };
            let _ = waiter.reply.send(response);
        }
    }

    fn maybe_snapshot(&mut self) {
        let due_by_count = self.entries_since_snapshot >= self.snapshot_threshold;
        let due_by_time = self.entries_since_snapshot > 0
            && self.last_snapshot_at.elapsed() >= self.snapshot_interval;
        if !due_by_count && !due_by_time {
            return;
        }

        let state = match postcard::to_allocvec(self.state.as_ref()) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(component = "store", error = %e, "failed to encode snapshot");
                return;
            }
        };
        let blob = SnapshotBlob {
            last_index: self.applied_index,
            last_term: 0, // stamped by the consensus node
            state,
        };
        match self.node.compact(blob) {
            Ok(()) => {
                tracing::info!(component = "store", index = self.applied_index, "snapshot taken");
                self.entries_since_snapshot = 0;
                self.last_snapshot_at = Instant::now();
            }
            Err(e) => {
                tracing::error!(component = "store", error = %e, "snapshot failed");
            }
        }
    }

    fn publish_stats(&self) {
        let leader_address = self
            .node
            .leader_hint()
            .and_then(|id| self.node.config().address_of(id))
            .map(str::to_string);
        let stats = StoreStats {
            is_leader: self.node.is_leader(),
            leader_address,
            term: self.node.term(),
            last_log_index: self.node.last_log_index(),
            applied_index: self.applied_index,
            peer_count: self.node.peer_count(),
        };
        *self.shared.stats.write().expect("stats lock poisoned") = stats;
    }
}

fn decode_state(blob: &SnapshotBlob) -> Result<State, StoreError> {
    postcard::from_bytes(&blob.state).map_err(|e| {
        StoreError::Storage(warren_storage::StorageError::Encode(e.to_string()))
    })
}
