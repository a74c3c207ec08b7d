//! End-to-end convergence scenarios over an in-process manager.
//!
//! Each test wires a real store (consensus + kernel) to the scheduler
//! and reconciler loops, plus a simulated worker agent that heartbeats,
//! reports instance state, and executes health probes — the same
//! command traffic a real fleet produces, at test timescales.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::watch;
use warren_deploy::{DeployError, Deployer, DeployerConfig};
use warren_kernel::{Command, ServiceSpec, State};
use warren_raft::{MemoryMesh, RaftConfig, ReplicaId};
use warren_reconciler::{ReconcilerConfig, Thresholds};
use warren_scheduler::SchedulerConfig;
use warren_store::{Store, StoreConfig, StoreError};
use warren_types::{
    ActualState, CpuMillis, DeployState, DeployStrategy, DesiredState, HealthCheck, MemoryBytes,
    Node, NodeId, NodeRole, NodeStatus, ProbeResult, Resources, ServiceId, Timestamp, UpdateConfig,
};

/// One manager plus a simulated worker fleet.
struct Harness {
    store: Store,
    deployer: Deployer,
    shutdown: watch::Sender<bool>,
    tasks: Vec<tokio::task::JoinHandle<()>>,
    /// Nodes whose agents stopped heartbeating and reporting.
    dead_nodes: Arc<Mutex<HashSet<NodeId>>>,
    /// Images whose health probes return failure.
    unhealthy_images: Arc<Mutex<HashSet<String>>>,
    _dir: TempDir,
}

impl Harness {
    async fn start() -> Self {
        let dir = TempDir::new().unwrap();
        let mesh = MemoryMesh::new();
        let raft = RaftConfig {
            id: ReplicaId::new(0),
            members: BTreeMap::from([(ReplicaId::new(0), "127.0.0.1:7000".to_string())]),
            election_timeout: Duration::from_millis(100),
            heartbeat_interval: Duration::from_millis(20),
        };
        let inbox = mesh.register(raft.id);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (store, driver) = Store::open(
            StoreConfig::new(dir.path(), raft),
            Arc::new(mesh),
            inbox,
            shutdown_rx.clone(),
        )
        .unwrap();

        let scheduler = tokio::spawn(warren_scheduler::run(
            store.clone(),
            SchedulerConfig {
                tick_interval: Duration::from_millis(50),
            },
            shutdown_rx.clone(),
        ));
        let reconciler = tokio::spawn(warren_reconciler::run(
            store.clone(),
            ReconcilerConfig {
                tick_interval: Duration::from_millis(100),
                thresholds: Thresholds {
                    heartbeat_timeout: Duration::from_millis(500),
                    gc_grace: Duration::from_millis(300),
                    default_start_period: Duration::from_millis(200),
                },
            },
            shutdown_rx.clone(),
        ));

        let dead_nodes = Arc::new(Mutex::new(HashSet::new()));
        let unhealthy_images = Arc::new(Mutex::new(HashSet::new()));
        let agent = tokio::spawn(agent_loop(
            store.clone(),
            Arc::clone(&dead_nodes),
            Arc::clone(&unhealthy_images),
            shutdown_rx,
        ));

        let deployer = Deployer::new(
            store.clone(),
            DeployerConfig {
                health_poll: Duration::from_millis(50),
                health_timeout: Duration::from_secs(2),
                submit_retries: 3,
                submit_backoff: Duration::from_millis(50),
            },
        );

        let harness = Self {
            store,
            deployer,
            shutdown,
            tasks: vec![driver, scheduler, reconciler, agent],
            dead_nodes,
            unhealthy_images,
            _dir: dir,
        };
        harness
            .wait_until("leadership", Duration::from_secs(2), |_| {
                harness.store.is_leader()
            })
            .await;
        harness
    }

    async fn stop(self) {
        self.shutdown.send(true).unwrap();
        for task in self.tasks {
            let _ = tokio::time::timeout(Duration::from_secs(5), task).await;
        }
    }

    async fn add_worker(&self, name: &str, cpu_cores: u64, mem_gib: u64) -> NodeId {
        let node = Node {
            id: NodeId::generate(),
            name: name.to_string(),
            role: NodeRole::Worker,
            status: NodeStatus::Ready,
            capacity: Resources::new(CpuMillis::cores(cpu_cores), MemoryBytes::gib(mem_gib)),
            last_heartbeat: Timestamp::now(),
            address: format!("{name}.workers.internal:7946"),
        };
        let id = node.id;
        self.store.submit(Command::CreateNode { node }).await.unwrap();
        id
    }

    async fn create_service(&self, spec: ServiceSpec) -> ServiceId {
        let id = ServiceId::generate();
        self.store
            .submit(Command::CreateService {
                id,
                spec,
                created_at: Timestamp::now(),
            })
            .await
            .unwrap();
        id
    }

    /// Polls the snapshot until `check` passes or the deadline expires.
    async fn wait_until<F>(&self, what: &str, deadline: Duration, check: F)
    where
        F: Fn(&State) -> bool,
    {
        let started = tokio::time::Instant::now();
        loop {
            if check(&self.store.read_snapshot()) {
                return;
            }
            assert!(
                started.elapsed() < deadline,
                "timed out waiting for {what}; state: {} services, {} instances",
                self.store.read_snapshot().service_count(),
                self.store.read_snapshot().instance_count(),
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

/// The simulated fleet: everything a worker agent submits, for every
/// live node at once.
async fn agent_loop(
    store: Store,
    dead_nodes: Arc<Mutex<HashSet<NodeId>>>,
    unhealthy_images: Arc<Mutex<HashSet<String>>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(Duration::from_millis(25));
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => return,
        }
        if !store.is_leader() {
            continue;
        }
        let snapshot = store.read_snapshot();
        let dead: HashSet<NodeId> = dead_nodes.lock().unwrap().clone();
        let bad: HashSet<String> = unhealthy_images.lock().unwrap().clone();
        let now = Timestamp::now();

        for node in snapshot.nodes() {
            if node.role == NodeRole::Worker && !dead.contains(&node.id) {
                let _ = store
                    .submit(Command::RegisterHeartbeat { id: node.id, at: now })
                    .await;
            }
        }

        for instance in snapshot.instances() {
            let Some(node_id) = instance.node_id else {
                continue;
            };
            if dead.contains(&node_id) {
                continue; // a dead node's agent reports nothing
            }
            match (instance.actual, instance.desired) {
                (ActualState::Assigned, DesiredState::Running) => {
                    let _ = store
                        .submit(Command::ReportInstanceState {
                            id: instance.id,
                            actual: ActualState::Running,
                            error: None,
                            at: now,
                        })
                        .await;
                }
                (ActualState::Assigned | ActualState::Running, DesiredState::Shutdown) => {
                    let _ = store
                        .submit(Command::ReportInstanceState {
                            id: instance.id,
                            actual: ActualState::Complete,
                            error: None,
                            at: now,
                        })
                        .await;
                }
                (ActualState::Running, DesiredState::Running) => {
                    let has_check = snapshot
                        .service(&instance.service_id)
                        .is_some_and(|s| s.health_check.is_some());
                    if has_check {
                        let healthy = !bad.contains(&instance.image);
                        let _ = store
                            .submit(Command::ReportHealth {
                                id: instance.id,
                                result: ProbeResult {
                                    healthy,
                                    message: if healthy {
                                        "ok".to_string()
                                    } else {
                                        "HTTP 503".to_string()
                                    },
                                    checked_at: now,
                                },
                            })
                            .await;
                    }
                }
                _ => {}
            }
        }
    }
}

fn running_on(state: &State, service: ServiceId) -> Vec<(NodeId, String)> {
    state
        .instances_of(service)
        .filter(|i| i.is_live() && i.actual == ActualState::Running)
        .map(|i| (i.node_id.expect("running implies placed"), i.image.clone()))
        .collect()
}

// ============================================================================
// Scenario A — replica convergence with spread
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn replica_convergence_spreads_across_workers() {
    let harness = Harness::start().await;
    let w1 = harness.add_worker("w1", 4, 8).await;
    let w2 = harness.add_worker("w2", 4, 8).await;

    let mut spec = ServiceSpec::replicated("web", "nginx:1.27", 3);
    spec.resources = Resources::new(CpuMillis::new(500), MemoryBytes::mib(512));
    let service = harness.create_service(spec).await;

    harness
        .wait_until("three running replicas", Duration::from_secs(5), |s| {
            running_on(s, service).len() == 3
        })
        .await;

    let state = harness.store.read_snapshot();
    let placed = running_on(&state, service);
    let on_w1 = placed.iter().filter(|(n, _)| *n == w1).count();
    let on_w2 = placed.iter().filter(|(n, _)| *n == w2).count();
    let mut split = [on_w1, on_w2];
    split.sort_unstable();
    assert_eq!(split, [1, 2], "two equal workers take a 2/1 split");

    // Capacity conservation across the fleet.
    for node in state.nodes() {
        assert!(node.capacity.fits(&state.reserved_on(node.id)));
    }

    harness.stop().await;
}

// ============================================================================
// Scenario B — worker failure and replacement
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn worker_failure_reschedules_elsewhere() {
    let harness = Harness::start().await;
    let w1 = harness.add_worker("w1", 4, 8).await;
    let w2 = harness.add_worker("w2", 4, 8).await;

    let mut spec = ServiceSpec::replicated("web", "nginx:1.27", 3);
    spec.resources = Resources::new(CpuMillis::new(500), MemoryBytes::mib(512));
    let service = harness.create_service(spec).await;
    harness
        .wait_until("steady state", Duration::from_secs(5), |s| {
            running_on(s, service).len() == 3
        })
        .await;

    // Worker 1 stops heartbeating.
    harness.dead_nodes.lock().unwrap().insert(w1);

    harness
        .wait_until("node down", Duration::from_secs(3), |s| {
            s.node(&w1).unwrap().status == NodeStatus::Down
        })
        .await;

    // Replacements land on the surviving worker and run.
    harness
        .wait_until("replacements running", Duration::from_secs(5), |s| {
            let placed = running_on(s, service);
            placed.len() == 3 && placed.iter().all(|(n, _)| *n == w2)
        })
        .await;

    // Stranded records were failed, shut down, and eventually GC'd.
    harness
        .wait_until("stranded instances GC'd", Duration::from_secs(3), |s| {
            s.instances_of(service).count() == 3
        })
        .await;

    harness.stop().await;
}

// ============================================================================
// Scenario C — unhealthy instance replacement
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn unhealthy_instance_is_failed_and_replaced() {
    let harness = Harness::start().await;
    harness.add_worker("w1", 4, 8).await;
    harness
        .unhealthy_images
        .lock()
        .unwrap()
        .insert("flaky:1".to_string());

    let mut spec = ServiceSpec::replicated("flaky", "flaky:1", 1);
    spec.health_check = Some(HealthCheck {
        retries: 2,
        interval: Duration::from_millis(25),
        start_period: Duration::from_millis(200),
        ..HealthCheck::default()
    });
    let service = harness.create_service(spec).await;

    // The instance comes up, probes fail past the retries, the grace
    // period lapses, and the reconciler fails it.
    harness
        .wait_until("unhealthy instance failed", Duration::from_secs(5), |s| {
            s.instances_of(service).any(|i| {
                i.actual == ActualState::Failed
                    && i.last_error
                        .as_deref()
                        .is_some_and(|e| e.starts_with("health check failed"))
            })
        })
        .await;

    // And the scheduler has created a successor.
    harness
        .wait_until("replacement exists", Duration::from_secs(3), |s| {
            s.instances_of(service).any(|i| i.is_live())
        })
        .await;

    harness.stop().await;
}

// ============================================================================
// Scenario D — rolling update
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn rolling_update_replaces_in_batches() {
    let harness = Harness::start().await;
    harness.add_worker("w1", 8, 16).await;
    harness.add_worker("w2", 8, 16).await;

    let mut spec = ServiceSpec::replicated("web", "nginx:1", 4);
    spec.update = UpdateConfig {
        parallelism: 2,
        delay: Duration::from_millis(100),
        ..UpdateConfig::default()
    };
    let service = harness.create_service(spec).await;
    harness
        .wait_until("initial replicas", Duration::from_secs(5), |s| {
            running_on(s, service).len() == 4
        })
        .await;

    harness
        .deployer
        .update(service, "nginx:2".to_string(), None)
        .await
        .expect("rolling update should succeed");

    harness
        .wait_until("all replicas on the new image", Duration::from_secs(5), |s| {
            let placed = running_on(s, service);
            placed.len() == 4 && placed.iter().all(|(_, image)| image == "nginx:2")
        })
        .await;

    // Old-image instances are gone (shutdown, completed, collected).
    harness
        .wait_until("old instances collected", Duration::from_secs(3), |s| {
            s.instances_of(service).count() == 4
        })
        .await;

    harness.stop().await;
}

// ============================================================================
// Scenario E — canary rollback on health failure
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn canary_rolls_back_when_probes_fail() {
    let harness = Harness::start().await;
    harness.add_worker("w1", 8, 16).await;
    harness
        .unhealthy_images
        .lock()
        .unwrap()
        .insert("bad:2".to_string());

    let mut spec = ServiceSpec::replicated("web", "stable:1", 4);
    spec.health_check = Some(HealthCheck {
        retries: 2,
        interval: Duration::from_millis(25),
        start_period: Duration::from_millis(100),
        ..HealthCheck::default()
    });
    spec.update = UpdateConfig {
        strategy: DeployStrategy::Canary,
        canary_steps: vec![25, 100],
        stability_window: Duration::from_millis(100),
        grace_period: Duration::from_millis(300),
        ..UpdateConfig::default()
    };
    let service = harness.create_service(spec).await;
    harness
        .wait_until("stable replicas", Duration::from_secs(5), |s| {
            running_on(s, service).len() == 4
        })
        .await;

    let err = harness
        .deployer
        .update(service, "bad:2".to_string(), None)
        .await
        .expect_err("unhealthy canary must roll back");
    assert!(matches!(err, DeployError::RolledBack));
    assert_eq!(err.to_string(), "rolled back due to health check failures");

    // The canary service is gone and the stable service is intact.
    let state = harness.store.read_snapshot();
    assert!(state.service_by_name("web-v2").is_none(), "canary deleted");
    let stable = state.service(&service).unwrap();
    assert_eq!(stable.replicas, 4, "stable replica count restored");
    assert_eq!(stable.deploy.state, DeployState::Active);

    harness
        .wait_until("stable capacity restored", Duration::from_secs(5), |s| {
            running_on(s, service).len() == 4
        })
        .await;

    harness.stop().await;
}

// ============================================================================
// Scenario F — leader loss between submits
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn leader_loss_mid_flight_is_idempotent_for_retries() {
    let mesh = MemoryMesh::new();
    let members: BTreeMap<ReplicaId, String> = (0..3)
        .map(|i| (ReplicaId::new(i), format!("127.0.0.1:{}", 7000 + i)))
        .collect();

    let mut stores = Vec::new();
    let mut guards = Vec::new();
    for i in 0..3 {
        let dir = TempDir::new().unwrap();
        let raft = RaftConfig {
            id: ReplicaId::new(i),
            members: members.clone(),
            election_timeout: Duration::from_millis(100),
            heartbeat_interval: Duration::from_millis(20),
        };
        let inbox = mesh.register(raft.id);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (store, handle) = Store::open(
            StoreConfig::new(dir.path(), raft),
            Arc::new(mesh.clone()),
            inbox,
            shutdown_rx,
        )
        .unwrap();
        stores.push(store);
        guards.push((dir, shutdown, handle));
    }

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let leader_pos = loop {
        if let Some(pos) = stores.iter().position(|s| s.is_leader()) {
            break pos;
        }
        assert!(tokio::time::Instant::now() < deadline, "no leader elected");
        tokio::time::sleep(Duration::from_millis(10)).await;
    };

    // The caller's command, with a caller-assigned id.
    let cmd = Command::CreateService {
        id: ServiceId::generate(),
        spec: ServiceSpec::replicated("s", "img:1", 1),
        created_at: Timestamp::now(),
    };
    stores[leader_pos].submit(cmd.clone()).await.unwrap();

    // The leader crashes. From the caller's view the submit outcome is
    // ambiguous, so it rediscovers the leader and retries verbatim.
    let (_dir, shutdown, handle) = guards.remove(leader_pos);
    shutdown.send(true).unwrap();
    handle.await.unwrap();
    let crashed = stores.remove(leader_pos);
    drop(crashed);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let new_leader = loop {
        if let Some(pos) = stores.iter().position(|s| s.is_leader()) {
            break pos;
        }
        assert!(tokio::time::Instant::now() < deadline, "no failover");
        tokio::time::sleep(Duration::from_millis(10)).await;
    };

    let retry = stores[new_leader].submit(cmd).await;
    assert!(
        matches!(retry, Err(StoreError::Apply(_))),
        "the id collision rejects the duplicate"
    );

    let snapshot = stores[new_leader].read_snapshot();
    assert_eq!(
        snapshot.services().filter(|s| s.name == "s").count(),
        1,
        "at most one service named s exists"
    );

    for (_dir, shutdown, handle) in guards {
        shutdown.send(true).unwrap();
        handle.await.unwrap();
    }
}
