//! Manager facade lifecycle tests.

use std::time::Duration;

use tempfile::TempDir;
use warren::{Command, ServiceSpec, Warren, WarrenConfig};
use warren_types::{
    CpuMillis, MemoryBytes, Node, NodeId, NodeRole, NodeStatus, Resources, ServiceId, Timestamp,
};

fn test_config(dir: &TempDir) -> WarrenConfig {
    let mut config = WarrenConfig::default();
    config.node.data_dir = dir.path().to_path_buf();
    config.cluster.election_timeout_ms = 100;
    config.cluster.heartbeat_interval_ms = 20;
    config.scheduler.tick_interval_secs = 1;
    config.reconciler.tick_interval_secs = 1;
    config
}

#[tokio::test(flavor = "multi_thread")]
async fn open_submit_schedule_shutdown() {
    let dir = TempDir::new().unwrap();
    let warren = Warren::open(test_config(&dir)).unwrap();
    let store = warren.store();

    // Single-manager cluster elects itself.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !store.is_leader() {
        assert!(tokio::time::Instant::now() < deadline, "no leadership");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let node = Node {
        id: NodeId::generate(),
        name: "w1".to_string(),
        role: NodeRole::Worker,
        status: NodeStatus::Ready,
        capacity: Resources::new(CpuMillis::cores(4), MemoryBytes::gib(8)),
        last_heartbeat: Timestamp::now(),
        address: "10.0.0.1:7946".to_string(),
    };
    let node_id = node.id;
    store.submit(Command::CreateNode { node }).await.unwrap();

    let service_id = ServiceId::generate();
    store
        .submit(Command::CreateService {
            id: service_id,
            spec: ServiceSpec::replicated("web", "nginx:1.27", 2),
            created_at: Timestamp::now(),
        })
        .await
        .unwrap();

    // Within two scheduler ticks the instances exist and are placed.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    loop {
        let snapshot = store.read_snapshot();
        let placed = snapshot
            .instances_of(service_id)
            .filter(|i| i.node_id == Some(node_id))
            .count();
        if placed == 2 {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "instances not placed");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let info = warren.cluster_info();
    assert_eq!(info.peers, vec!["127.0.0.1:7000".to_string()]);
    assert_eq!(info.leader.as_deref(), Some("127.0.0.1:7000"));
    assert!(info.log_index >= info.applied_index);
    assert!(info.applied_index >= 2);

    warren.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn reopen_recovers_cluster_model() {
    let dir = TempDir::new().unwrap();

    {
        let warren = Warren::open(test_config(&dir)).unwrap();
        let store = warren.store();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while !store.is_leader() {
            assert!(tokio::time::Instant::now() < deadline);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        store
            .submit(Command::CreateService {
                id: ServiceId::generate(),
                spec: ServiceSpec::replicated("web", "nginx:1.27", 1),
                created_at: Timestamp::now(),
            })
            .await
            .unwrap();
        warren.shutdown().await;
    }

    let warren = Warren::open(test_config(&dir)).unwrap();
    let store = warren.store();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    loop {
        if store.read_snapshot().service_by_name("web").is_some() {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "state not recovered");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    warren.shutdown().await;
}
