//! The store facade handed to decision loops and external callers.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use warren_events::EventBus;
use warren_kernel::{Command, State};
use warren_raft::{Envelope, RaftConfig, RaftTransport};

use crate::driver::{Driver, SubmitRequest};
use crate::error::StoreError;

/// Store construction parameters.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory for the log, metadata, and snapshot stores.
    pub data_dir: PathBuf,
    pub raft: RaftConfig,
    /// Snapshot after this many applied entries.
    pub snapshot_threshold: u64,
    /// Snapshot after this much elapsed time, even below the threshold.
    pub snapshot_interval: Duration,
    /// Default deadline for `submit` when the caller passes none.
    pub submit_timeout: Duration,
    /// Event bus buffer per subscriber.
    pub event_buffer: usize,
}

impl StoreConfig {
    pub fn new(data_dir: impl Into<PathBuf>, raft: RaftConfig) -> Self {
        Self {
            data_dir: data_dir.into(),
            raft,
            snapshot_threshold: 8192,
            snapshot_interval: Duration::from_secs(600),
            submit_timeout: Duration::from_secs(5),
            event_buffer: 1024,
        }
    }
}

/// Consensus progress counters, as reported by `stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub is_leader: bool,
    pub leader_address: Option<String>,
    pub term: u64,
    pub last_log_index: u64,
    pub applied_index: u64,
    pub peer_count: usize,
}

pub(crate) struct Shared {
    /// Latest applied state; replaced wholesale after each apply batch.
    pub(crate) state: RwLock<Arc<State>>,
    pub(crate) stats: RwLock<StoreStats>,
    pub(crate) events: EventBus,
}

/// Handle to the replicated store. Cheap to clone; all clones talk to
/// the same drive loop.
#[derive(Clone)]
pub struct Store {
    shared: Arc<Shared>,
    submit_tx: mpsc::Sender<SubmitRequest>,
    submit_timeout: Duration,
}

impl Store {
    /// Opens the store: restores the latest snapshot, replays the log
    /// through consensus recovery, and spawns the drive loop.
    ///
    /// `inbox` receives this node's consensus traffic; `transport`
    /// carries outbound messages. The drive loop exits when `shutdown`
    /// flips to `true`.
    pub fn open(
        config: StoreConfig,
        transport: Arc<dyn RaftTransport>,
        inbox: mpsc::UnboundedReceiver<Envelope>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(Self, tokio::task::JoinHandle<()>), StoreError> {
        let shared = Arc::new(Shared {
            state: RwLock::new(Arc::new(State::new())),
            stats: RwLock::new(StoreStats::default()),
            events: EventBus::new(config.event_buffer),
        });
        let (submit_tx, submit_rx) = mpsc::channel(256);
        let submit_timeout = config.submit_timeout;

        let driver = Driver::open(config, Arc::clone(&shared), transport, inbox, submit_rx, shutdown)?;
        let handle = tokio::spawn(driver.run());

        Ok((
            Self {
                shared,
                submit_tx,
                submit_timeout,
            },
            handle,
        ))
    }

    /// Appends a command to the replicated log, returning once it is
    /// committed and applied (or rejected by the state machine).
    ///
    /// Uses the store's default deadline; see [`Store::submit_with_deadline`].
    pub async fn submit(&self, cmd: Command) -> Result<(), StoreError> {
        self.submit_with_deadline(cmd, self.submit_timeout).await
    }

    /// `submit` with an explicit deadline. On [`StoreError::Timeout`] the
    /// command may or may not have applied; callers re-read state and
    /// retry idempotent commands.
    pub async fn submit_with_deadline(
        &self,
        cmd: Command,
        deadline: Duration,
    ) -> Result<(), StoreError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.submit_tx
            .send(SubmitRequest { cmd, reply: reply_tx })
            .await
            .map_err(|_| StoreError::ShuttingDown)?;

        match tokio::time::timeout(deadline, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(StoreError::ShuttingDown),
            Err(_) => Err(StoreError::Timeout),
        }
    }

    /// A consistent view of all entities. Non-blocking: clones an `Arc`
    /// under a read lock. Decision loops call this once per tick and
    /// treat the result as atomic.
    pub fn read_snapshot(&self) -> Arc<State> {
        Arc::clone(&self.shared.state.read().expect("state lock poisoned"))
    }

    pub fn is_leader(&self) -> bool {
        self.shared.stats.read().expect("stats lock poisoned").is_leader
    }

    /// Address of the current leader, if known.
    pub fn leader_address(&self) -> Option<String> {
        self.shared
            .stats
            .read()
            .expect("stats lock poisoned")
            .leader_address
            .clone()
    }

    pub fn stats(&self) -> StoreStats {
        self.shared.stats.read().expect("stats lock poisoned").clone()
    }

    /// Subscribes to applied-command events (best-effort fan-out).
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<warren_kernel::Event> {
        self.shared.events.subscribe()
    }

    /// The bus itself, for components that publish derived events.
    pub fn events(&self) -> &EventBus {
        &self.shared.events
    }
}
