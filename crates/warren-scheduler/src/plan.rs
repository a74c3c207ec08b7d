//! Pure scheduling decisions over one state snapshot.

use std::collections::BTreeMap;

use warren_kernel::{Command, State};
use warren_types::{
    ActualState, Instance, InstanceId, NodeId, Resources, Service, ServiceId, ServiceMode,
    Timestamp,
};

/// Pending reason set on instances no ready worker can hold.
pub const PENDING_NO_CAPACITY: &str = "no ready worker node with sufficient free capacity";

/// Computes the commands that bring instance counts and placements in
/// line with the snapshot's declared state.
///
/// The snapshot is treated atomically: capacity deducted for an
/// assignment earlier in the returned plan is unavailable to later
/// assignments in the same plan.
pub fn plan(state: &State, now: Timestamp) -> Vec<Command> {
    let mut commands = Vec::new();

    for service in state.services() {
        match service.mode {
            ServiceMode::Replicated => reconcile_replicated(state, service, now, &mut commands),
            ServiceMode::Global => reconcile_global(state, service, now, &mut commands),
        }
    }

    place_pending(state, &mut commands);
    commands
}

/// Scale the live-instance count toward `service.replicas`.
fn reconcile_replicated(
    state: &State,
    service: &Service,
    now: Timestamp,
    commands: &mut Vec<Command>,
) {
    let live: Vec<&Instance> = state
        .instances_of(service.id)
        .filter(|i| i.is_live())
        .collect();
    let target = service.replicas as usize;

    if live.len() < target {
        let shortfall = target - live.len();
        tracing::debug!(
            component = "scheduler",
            service = %service.id,
            shortfall,
            "creating replicas"
        );
        for _ in 0..shortfall {
            commands.push(Command::CreateInstance {
                id: InstanceId::generate(),
                service_id: service.id,
                node_id: None,
                created_at: now,
            });
        }
    } else if live.len() > target {
        let excess = live.len() - target;
        for instance in scale_down_victims(live, excess) {
            commands.push(Command::MarkInstanceShutdown { id: instance });
        }
    }
}

/// Scale-down preference: unplaced pending instances first (cheapest to
/// stop), then newest-first among the placed.
fn scale_down_victims(mut live: Vec<&Instance>, excess: usize) -> Vec<InstanceId> {
    live.sort_by_key(|i| {
        let pending = i.actual == ActualState::Pending;
        // Pending first; within each group newest creation first; id as
        // the final, deterministic tie-break.
        (!pending, std::cmp::Reverse(i.created_at), i.id)
    });
    live.into_iter().take(excess).map(|i| i.id).collect()
}

/// Global mode: exactly one live instance per ready worker node.
fn reconcile_global(state: &State, service: &Service, now: Timestamp, commands: &mut Vec<Command>) {
    let mut live_by_node: BTreeMap<NodeId, Vec<&Instance>> = BTreeMap::new();
    for instance in state.instances_of(service.id).filter(|i| i.is_live()) {
        let Some(node_id) = instance.node_id else {
            continue; // an unplaced global instance waits for placement
        };
        live_by_node.entry(node_id).or_default().push(instance);
    }

    for node in state.schedulable_nodes() {
        match live_by_node.get(&node.id) {
            None => {
                commands.push(Command::CreateInstance {
                    id: InstanceId::generate(),
                    service_id: service.id,
                    node_id: Some(node.id),
                    created_at: now,
                });
            }
            Some(instances) if instances.len() > 1 => {
                // Duplicates on one node: keep the oldest.
                let mut extras: Vec<&&Instance> = instances.iter().collect();
                extras.sort_by_key(|i| (i.created_at, i.id));
                for instance in extras.into_iter().skip(1) {
                    commands.push(Command::MarkInstanceShutdown { id: instance.id });
                }
            }
            Some(_) => {}
        }
    }

    // Instances on decommissioned nodes have nowhere to run.
    for (node_id, instances) in &live_by_node {
        if state.node(node_id).is_none() {
            for instance in instances {
                commands.push(Command::MarkInstanceShutdown { id: instance.id });
            }
        }
    }
}

/// Places every pending unassigned instance, spreading by free-capacity
/// fraction with a deterministic hash tie-break.
fn place_pending(state: &State, commands: &mut Vec<Command>) {
    // Free capacity per candidate node, updated as this plan assigns.
    let mut free: BTreeMap<NodeId, (Resources, Resources)> = state
        .schedulable_nodes()
        .map(|n| (n.id, (state.free_on(n), n.capacity)))
        .collect();

    // Oldest first so long-waiting instances get capacity first.
    let mut pending: Vec<&Instance> = state
        .instances()
        .filter(|i| {
            i.is_live() && i.actual == ActualState::Pending && i.node_id.is_none()
        })
        .collect();
    pending.sort_by_key(|i| (i.created_at, i.id));

    for instance in pending {
        let choice = free
            .iter()
            .filter(|(_, (available, _))| available.fits(&instance.reservation))
            .max_by(|(a_id, (a_free, a_cap)), (b_id, (b_free, b_cap))| {
                let a_frac = a_free.fraction_of(a_cap);
                let b_frac = b_free.fraction_of(b_cap);
                a_frac.partial_cmp(&b_frac).unwrap_or(std::cmp::Ordering::Equal).then_with(|| {
                    placement_hash(instance.service_id, instance.id, **a_id)
                        .cmp(&placement_hash(instance.service_id, instance.id, **b_id))
                })
            })
            .map(|(id, _)| *id);

        match choice {
            Some(node_id) => {
                let (available, _) = free.get_mut(&node_id).expect("chosen from this map");
                *available = available.saturating_sub(instance.reservation);
                commands.push(Command::AssignInstance {
                    id: instance.id,
                    node_id,
                });
            }
            None => {
                tracing::debug!(
                    component = "scheduler",
                    instance = %instance.id,
                    service = %instance.service_id,
                    "unschedulable, will retry next tick"
                );
                if instance.pending_reason.as_deref() != Some(PENDING_NO_CAPACITY) {
                    commands.push(Command::SetInstancePendingReason {
                        id: instance.id,
                        reason: Some(PENDING_NO_CAPACITY.to_string()),
                    });
                }
            }
        }
    }
}

/// Deterministic spread tie-break: avoids herding equal-capacity nodes
/// while staying stable across replanning.
fn placement_hash(service: ServiceId, instance: InstanceId, node: NodeId) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(service.as_uuid().as_bytes());
    hasher.update(instance.as_uuid().as_bytes());
    hasher.update(node.as_uuid().as_bytes());
    let digest = hasher.finalize();
    u64::from_le_bytes(digest.as_bytes()[..8].try_into().expect("digest is 32 bytes"))
}

#[cfg(test)]
mod tests;
