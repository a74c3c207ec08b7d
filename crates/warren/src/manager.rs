//! Manager lifecycle: construction, wiring, and teardown.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use warren_config::WarrenConfig;
use warren_deploy::{Deployer, DeployerConfig};
use warren_raft::{Envelope, MemoryMesh, RaftConfig, RaftTransport, ReplicaId};
use warren_reconciler::{ReconcilerConfig, Thresholds};
use warren_scheduler::SchedulerConfig;
use warren_store::{Store, StoreConfig, StoreError};

/// Errors from manager construction.
#[derive(thiserror::Error, Debug)]
pub enum WarrenError {
    #[error("configuration: {0}")]
    Config(#[from] warren_config::ConfigError),

    #[error("store: {0}")]
    Store(#[from] StoreError),
}

/// Cluster membership and consensus progress, for `cluster_info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterInfo {
    pub leader: Option<String>,
    pub peers: Vec<String>,
    pub log_index: u64,
    pub applied_index: u64,
    pub term: u64,
}

/// A running Warren manager: the replicated store plus its decision
/// loops. One per process; nothing is mutable after construction except
/// through the command apply path.
pub struct Warren {
    store: Store,
    deployer: Deployer,
    members: BTreeMap<ReplicaId, String>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl Warren {
    /// Opens a manager with the in-process consensus transport — the
    /// right shape for single-manager clusters and tests. Networked
    /// multi-manager deployments pass their transport via
    /// [`Warren::open_with_transport`].
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(config: WarrenConfig) -> Result<Self, WarrenError> {
        let mesh = MemoryMesh::new();
        let inbox = mesh.register(ReplicaId::new(config.cluster.replica_id));
        Self::open_with_transport(config, Arc::new(mesh), inbox)
    }

    /// Opens a manager over a caller-provided consensus transport.
    pub fn open_with_transport(
        config: WarrenConfig,
        transport: Arc<dyn RaftTransport>,
        inbox: tokio::sync::mpsc::UnboundedReceiver<Envelope>,
    ) -> Result<Self, WarrenError> {
        config.validate()?;

        let members: BTreeMap<ReplicaId, String> = config
            .cluster
            .member_map()
            .into_iter()
            .map(|(id, addr)| (ReplicaId::new(id), addr))
            .collect();
        let raft = RaftConfig {
            id: ReplicaId::new(config.cluster.replica_id),
            members: members.clone(),
            election_timeout: Duration::from_millis(config.cluster.election_timeout_ms),
            heartbeat_interval: Duration::from_millis(config.cluster.heartbeat_interval_ms),
        };

        let mut store_config = StoreConfig::new(&config.node.data_dir, raft);
        store_config.snapshot_threshold = config.store.snapshot_threshold;
        store_config.snapshot_interval = Duration::from_secs(config.store.snapshot_interval_secs);
        store_config.submit_timeout = Duration::from_millis(config.store.submit_timeout_ms);
        store_config.event_buffer = config.store.event_buffer;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let (store, driver) = Store::open(store_config, transport, inbox, shutdown_rx.clone())?;

        let scheduler_config = SchedulerConfig {
            tick_interval: Duration::from_secs(config.scheduler.tick_interval_secs),
        };
        let scheduler = tokio::spawn(warren_scheduler::run(
            store.clone(),
            scheduler_config,
            shutdown_rx.clone(),
        ));

        let reconciler_config = ReconcilerConfig {
            tick_interval: Duration::from_secs(config.reconciler.tick_interval_secs),
            thresholds: Thresholds {
                heartbeat_timeout: Duration::from_secs(config.reconciler.heartbeat_timeout_secs),
                gc_grace: Duration::from_secs(config.reconciler.gc_grace_secs),
                ..Thresholds::default()
            },
        };
        let reconciler = tokio::spawn(warren_reconciler::run(
            store.clone(),
            reconciler_config,
            shutdown_rx,
        ));

        let deployer_config = DeployerConfig {
            health_poll: Duration::from_secs(config.deploy.health_poll_secs),
            health_timeout: Duration::from_secs(config.deploy.health_timeout_secs),
            ..DeployerConfig::default()
        };
        let deployer = Deployer::new(store.clone(), deployer_config);

        tracing::info!(
            node = %config.node.name,
            replica = config.cluster.replica_id,
            members = members.len(),
            "manager started"
        );

        Ok(Self {
            store,
            deployer,
            members,
            shutdown,
            tasks: vec![driver, scheduler, reconciler],
        })
    }

    /// The replicated store: submit commands, read snapshots.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// The deployment orchestrator.
    pub fn deployer(&self) -> &Deployer {
        &self.deployer
    }

    /// Subscribes to applied-command events.
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<warren_kernel::Event> {
        self.store.subscribe_events()
    }

    /// Leader, membership, and log progress.
    pub fn cluster_info(&self) -> ClusterInfo {
        let stats = self.store.stats();
        ClusterInfo {
            leader: stats.leader_address,
            peers: self.members.values().cloned().collect(),
            log_index: stats.last_log_index,
            applied_index: stats.applied_index,
            term: stats.term,
        }
    }

    /// Signals every loop to stop and waits for them to drain, bounded
    /// per task.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if tokio::time::timeout(Duration::from_secs(5), task).await.is_err() {
                tracing::warn!("task did not drain within the shutdown window");
            }
        }
        tracing::info!("manager stopped");
    }
}
