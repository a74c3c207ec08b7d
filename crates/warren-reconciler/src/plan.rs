//! The reconciliation passes, pure over one snapshot.

use std::time::Duration;

use warren_kernel::{Command, State};
use warren_types::{ActualState, DesiredState, NodeStatus, Timestamp};

/// Thresholds for the reconciliation passes.
#[derive(Debug, Clone)]
pub struct Thresholds {
    /// A node missing heartbeats longer than this is down.
    pub heartbeat_timeout: Duration,
    /// Terminal shutdown instances older than this are deleted.
    pub gc_grace: Duration,
    /// Start period assumed for services without a health check spec.
    pub default_start_period: Duration,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            heartbeat_timeout: Duration::from_secs(30),
            gc_grace: Duration::from_secs(300),
            default_start_period: Duration::from_secs(10),
        }
    }
}

/// Runs all passes and returns the corrective commands.
pub fn plan(state: &State, now: Timestamp, thresholds: &Thresholds) -> Vec<Command> {
    let mut commands = Vec::new();
    node_liveness(state, now, thresholds, &mut commands);
    failed_instances(state, &mut commands);
    unhealthy_instances(state, now, thresholds, &mut commands);
    stranded_instances(state, now, &mut commands);
    drained_nodes(state, &mut commands);
    garbage_collect(state, now, thresholds, &mut commands);
    commands
}

/// Heartbeat-driven status transitions. Drain is operator-owned and is
/// left alone in both directions.
fn node_liveness(
    state: &State,
    now: Timestamp,
    thresholds: &Thresholds,
    commands: &mut Vec<Command>,
) {
    for node in state.nodes() {
        let silent_for = now.saturating_since(node.last_heartbeat);
        match node.status {
            NodeStatus::Ready if silent_for > thresholds.heartbeat_timeout => {
                tracing::warn!(
                    component = "reconciler",
                    node = %node.id,
                    silent_secs = silent_for.as_secs(),
                    "node missed heartbeats, marking down"
                );
                commands.push(Command::SetNodeStatus {
                    id: node.id,
                    status: NodeStatus::Down,
                });
            }
            NodeStatus::Down if silent_for <= thresholds.heartbeat_timeout => {
                tracing::info!(component = "reconciler", node = %node.id, "node heartbeat resumed");
                commands.push(Command::SetNodeStatus {
                    id: node.id,
                    status: NodeStatus::Ready,
                });
            }
            _ => {}
        }
    }
}

/// Failed instances still wanted running are marked for shutdown; the
/// scheduler observes the replica shortfall and creates replacements.
fn failed_instances(state: &State, commands: &mut Vec<Command>) {
    for instance in state.instances() {
        if instance.desired == DesiredState::Running && instance.actual == ActualState::Failed {
            commands.push(Command::MarkInstanceShutdown { id: instance.id });
        }
    }
}

/// Running instances whose health flag is down past the start period
/// are failed, which feeds the replacement path above on the next tick.
fn unhealthy_instances(
    state: &State,
    now: Timestamp,
    thresholds: &Thresholds,
    commands: &mut Vec<Command>,
) {
    for instance in state.instances() {
        if instance.actual != ActualState::Running || instance.health.healthy {
            continue;
        }
        let start_period = state
            .service(&instance.service_id)
            .and_then(|s| s.health_check.as_ref())
            .map_or(thresholds.default_start_period, |hc| hc.start_period);
        if !instance.health.past_grace(start_period, now) {
            continue;
        }
        tracing::warn!(
            component = "reconciler",
            instance = %instance.id,
            service = %instance.service_id,
            "instance unhealthy past grace, failing"
        );
        commands.push(Command::ReportInstanceState {
            id: instance.id,
            actual: ActualState::Failed,
            error: Some(format!(
                "health check failed: {}",
                instance.health.last_message
            )),
            at: now,
        });
    }
}

/// Instances assigned to down or vanished nodes cannot be running;
/// fail them and request shutdown so replacements land elsewhere.
fn stranded_instances(state: &State, now: Timestamp, commands: &mut Vec<Command>) {
    for instance in state.instances() {
        if instance.actual.is_terminal() {
            continue;
        }
        let Some(node_id) = instance.node_id else {
            continue;
        };
        let gone = match state.node(&node_id) {
            Some(node) => node.status == NodeStatus::Down,
            None => true,
        };
        if !gone {
            continue;
        }
        tracing::warn!(
            component = "reconciler",
            instance = %instance.id,
            node = %node_id,
            "instance stranded on down node"
        );
        commands.push(Command::ReportInstanceState {
            id: instance.id,
            actual: ActualState::Failed,
            error: Some("node down".to_string()),
            at: now,
        });
        commands.push(Command::MarkInstanceShutdown { id: instance.id });
    }
}

/// Draining nodes shed their workloads: live instances are marked for
/// shutdown so the scheduler migrates them to ready nodes.
fn drained_nodes(state: &State, commands: &mut Vec<Command>) {
    for node in state.nodes() {
        if node.status != NodeStatus::Drain {
            continue;
        }
        for instance in state.instances_on(node.id) {
            if instance.is_live() {
                commands.push(Command::MarkInstanceShutdown { id: instance.id });
            }
        }
    }
}

/// Shutdown instances that reached a terminal state are deleted after a
/// grace window that leaves them inspectable.
fn garbage_collect(
    state: &State,
    now: Timestamp,
    thresholds: &Thresholds,
    commands: &mut Vec<Command>,
) {
    for instance in state.instances() {
        if instance.desired != DesiredState::Shutdown || !instance.actual.is_terminal() {
            continue;
        }
        let since = instance.finished_at.unwrap_or(instance.created_at);
        if now.saturating_since(since) > thresholds.gc_grace {
            commands.push(Command::DeleteInstance { id: instance.id });
        }
    }
}
