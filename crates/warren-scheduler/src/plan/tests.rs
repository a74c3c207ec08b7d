use warren_kernel::{Command, ServiceSpec, State, apply_committed};
use warren_types::{
    ActualState, CpuMillis, MemoryBytes, Node, NodeId, NodeRole, NodeStatus, Resources, ServiceId,
    ServiceMode, Timestamp,
};

use super::{PENDING_NO_CAPACITY, plan};

fn now() -> Timestamp {
    Timestamp::from_nanos(1_000_000_000)
}

fn apply(state: &mut State, cmd: Command) {
    apply_committed(state, cmd).expect("setup command should apply");
}

fn add_worker(state: &mut State, name: &str, cpu_cores: u64, mem_gib: u64) -> NodeId {
    let node = Node {
        id: NodeId::generate(),
        name: name.to_string(),
        role: NodeRole::Worker,
        status: NodeStatus::Ready,
        capacity: Resources::new(CpuMillis::cores(cpu_cores), MemoryBytes::gib(mem_gib)),
        last_heartbeat: now(),
        address: "10.0.0.1:7946".to_string(),
    };
    let id = node.id;
    apply(state, Command::CreateNode { node });
    id
}

fn add_service(state: &mut State, name: &str, replicas: u32, request: Resources) -> ServiceId {
    let id = ServiceId::generate();
    let mut spec = ServiceSpec::replicated(name, "nginx:1.27", replicas);
    spec.resources = request;
    apply(state, Command::CreateService { id, spec, created_at: now() });
    id
}

/// Runs one plan and applies everything it produced, like a store tick.
fn run_tick(state: &mut State) -> Vec<Command> {
    let commands = plan(state, now());
    for cmd in &commands {
        apply(state, cmd.clone());
    }
    commands
}

#[test]
fn scale_up_creates_missing_replicas() {
    let mut state = State::new();
    add_worker(&mut state, "w1", 4, 8);
    let service = add_service(&mut state, "web", 3, Resources::ZERO);

    let commands = plan(&state, now());
    let creates = commands
        .iter()
        .filter(|c| matches!(c, Command::CreateInstance { .. }))
        .count();
    assert_eq!(creates, 3);

    // Applying the plan and replanning creates nothing further.
    for cmd in commands {
        apply(&mut state, cmd);
    }
    assert_eq!(state.live_replicas(service), 3);
    let commands = plan(&state, now());
    assert!(
        commands
            .iter()
            .all(|c| !matches!(c, Command::CreateInstance { .. })),
        "no duplicate creates once replicas are live"
    );
}

#[test]
fn scale_down_prefers_pending_then_newest() {
    let mut state = State::new();
    let node = add_worker(&mut state, "w1", 16, 32);
    let service = add_service(&mut state, "web", 3, Resources::ZERO);

    // Three placed instances at distinct creation times.
    let mut ids = Vec::new();
    for i in 0..3u64 {
        let id = warren_types::InstanceId::generate();
        apply(
            &mut state,
            Command::CreateInstance {
                id,
                service_id: service,
                node_id: None,
                created_at: Timestamp::from_nanos(100 + i),
            },
        );
        apply(&mut state, Command::AssignInstance { id, node_id: node });
        ids.push(id);
    }
    // Plus one pending unplaced straggler, newest of all.
    let pending = warren_types::InstanceId::generate();
    apply(
        &mut state,
        Command::CreateInstance {
            id: pending,
            service_id: service,
            node_id: None,
            created_at: Timestamp::from_nanos(500),
        },
    );

    // Scale from 4 live down to 2.
    apply(&mut state, Command::ScaleService { id: service, replicas: 2 });
    let commands = plan(&state, now());
    let victims: Vec<_> = commands
        .iter()
        .filter_map(|c| match c {
            Command::MarkInstanceShutdown { id } => Some(*id),
            _ => None,
        })
        .collect();

    // The pending straggler goes first, then the newest placed instance.
    assert_eq!(victims, vec![pending, ids[2]]);
}

#[test]
fn placement_spreads_across_workers() {
    let mut state = State::new();
    add_worker(&mut state, "w1", 4, 8);
    add_worker(&mut state, "w2", 4, 8);
    add_service(
        &mut state,
        "web",
        3,
        Resources::new(CpuMillis::new(500), MemoryBytes::mib(512)),
    );

    run_tick(&mut state); // creates 3 pending instances
    run_tick(&mut state); // places them

    let mut per_node: std::collections::BTreeMap<NodeId, usize> = Default::default();
    for instance in state.instances() {
        let node = instance.node_id.expect("all placed");
        *per_node.entry(node).or_default() += 1;
    }
    // With two equal workers the expected distribution is 2/1.
    let mut counts: Vec<usize> = per_node.values().copied().collect();
    counts.sort_unstable();
    assert_eq!(counts, vec![1, 2]);
}

#[test]
fn same_tick_capacity_accounting_is_conserved() {
    let mut state = State::new();
    // One worker that fits exactly two requests.
    let node = add_worker(&mut state, "w1", 1, 1);
    add_service(
        &mut state,
        "web",
        3,
        Resources::new(CpuMillis::new(500), MemoryBytes::mib(512)),
    );

    run_tick(&mut state); // create 3 pending
    let commands = run_tick(&mut state); // place what fits

    let assigns = commands
        .iter()
        .filter(|c| matches!(c, Command::AssignInstance { .. }))
        .count();
    assert_eq!(assigns, 2, "third assignment would overcommit the node");

    let reserved = state.reserved_on(node);
    assert!(state.node(&node).unwrap().capacity.fits(&reserved));

    // The unplaced instance carries an operator-visible reason.
    let unplaced: Vec<_> = state
        .instances()
        .filter(|i| i.node_id.is_none())
        .collect();
    assert_eq!(unplaced.len(), 1);
    assert_eq!(unplaced[0].pending_reason.as_deref(), Some(PENDING_NO_CAPACITY));
}

#[test]
fn pending_reason_not_resubmitted_every_tick() {
    let mut state = State::new();
    add_service(
        &mut state,
        "web",
        1,
        Resources::new(CpuMillis::cores(64), MemoryBytes::gib(512)),
    );
    run_tick(&mut state); // create
    run_tick(&mut state); // no candidates: sets reason

    let commands = plan(&state, now());
    assert!(
        commands
            .iter()
            .all(|c| !matches!(c, Command::SetInstancePendingReason { .. })),
        "reason already set, nothing to resubmit"
    );
}

#[test]
fn global_service_gets_one_instance_per_ready_worker() {
    let mut state = State::new();
    add_worker(&mut state, "w1", 4, 8);
    add_worker(&mut state, "w2", 4, 8);
    let down = Node {
        id: NodeId::generate(),
        name: "w3".to_string(),
        role: NodeRole::Worker,
        status: NodeStatus::Down,
        capacity: Resources::new(CpuMillis::cores(4), MemoryBytes::gib(8)),
        last_heartbeat: now(),
        address: "10.0.0.3:7946".to_string(),
    };
    apply(&mut state, Command::CreateNode { node: down });

    let id = ServiceId::generate();
    let mut spec = ServiceSpec::replicated("agent", "agent:1", 0);
    spec.mode = ServiceMode::Global;
    apply(&mut state, Command::CreateService { id, spec, created_at: now() });

    run_tick(&mut state);

    // One instance per ready worker, none for the down node, and all
    // pre-assigned at creation.
    assert_eq!(state.instance_count(), 2);
    assert!(state.instances().all(|i| i.actual == ActualState::Assigned));

    // A second worker joining grows the set by exactly one.
    add_worker(&mut state, "w4", 4, 8);
    let commands = run_tick(&mut state);
    let creates = commands
        .iter()
        .filter(|c| matches!(c, Command::CreateInstance { .. }))
        .count();
    assert_eq!(creates, 1);
    assert_eq!(state.instance_count(), 3);
}

#[test]
fn replacement_uses_current_service_image() {
    let mut state = State::new();
    add_worker(&mut state, "w1", 4, 8);
    let service = add_service(&mut state, "web", 1, Resources::ZERO);
    run_tick(&mut state);

    apply(
        &mut state,
        Command::SetServiceImage { id: service, image: "nginx:1.28".to_string() },
    );
    let old = state.instances().next().unwrap().id;
    apply(&mut state, Command::MarkInstanceShutdown { id: old });

    run_tick(&mut state);
    let replacement = state
        .instances()
        .find(|i| i.id != old)
        .expect("replacement created");
    assert_eq!(replacement.image, "nginx:1.28");
}
