//! Message transport between replicas.
//!
//! The core scopes the wire format out: consensus traffic goes through
//! the [`RaftTransport`] trait, and the workspace ships [`MemoryMesh`],
//! the in-process implementation used by tests and single-binary
//! clusters. A networked deployment plugs its own implementation in
//! here.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::message::Envelope;
use crate::types::ReplicaId;

/// Delivers protocol messages to peers. Sends are fire-and-forget;
/// consensus tolerates loss and reordering by design.
pub trait RaftTransport: Send + Sync + 'static {
    fn send(&self, envelope: Envelope);
}

#[derive(Default)]
struct MeshInner {
    inboxes: HashMap<ReplicaId, mpsc::UnboundedSender<Envelope>>,
    /// Partitioned replicas: traffic to and from them is dropped.
    severed: std::collections::HashSet<ReplicaId>,
}

/// In-process full mesh: every registered replica gets an inbox, and
/// sends route directly to it.
///
/// `sever`/`heal` simulate network partitions for failure testing.
#[derive(Clone, Default)]
pub struct MemoryMesh {
    inner: Arc<Mutex<MeshInner>>,
}

impl MemoryMesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a replica and returns its inbox.
    pub fn register(&self, id: ReplicaId) -> mpsc::UnboundedReceiver<Envelope> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .lock()
            .expect("mesh lock poisoned")
            .inboxes
            .insert(id, tx);
        rx
    }

    /// Drops all traffic to and from `id` until [`MemoryMesh::heal`].
    pub fn sever(&self, id: ReplicaId) {
        self.inner
            .lock()
            .expect("mesh lock poisoned")
            .severed
            .insert(id);
    }

    pub fn heal(&self, id: ReplicaId) {
        self.inner
            .lock()
            .expect("mesh lock poisoned")
            .severed
            .remove(&id);
    }
}

impl RaftTransport for MemoryMesh {
    fn send(&self, envelope: Envelope) {
        let inner = self.inner.lock().expect("mesh lock poisoned");
        if inner.severed.contains(&envelope.from) || inner.severed.contains(&envelope.to) {
            return;
        }
        if let Some(inbox) = inner.inboxes.get(&envelope.to) {
            // A closed inbox means the peer shut down; dropping the
            // message is the correct behavior.
            let _ = inbox.send(envelope);
        }
    }
}
