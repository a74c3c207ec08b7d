//! The kernel - pure functional core of the Warren control plane.
//!
//! [`apply_committed`] executes one committed command against the cluster
//! model, deterministically. It is completely pure: no IO, no clocks, no
//! randomness.
//!
//! Every arm validates all rejection conditions before the first
//! mutation, so a rejected command leaves the state untouched and the
//! per-command error is returned to the submitter without aborting
//! replication.

use warren_types::{
    ActualState, DesiredState, HealthState, Instance, NodeStatus, Service, Timestamp, is_valid_name,
};

use crate::command::{Command, ServiceSpec};
use crate::events::Event;
use crate::state::State;

/// Sanity cap on replica counts; the typed equivalent of rejecting a
/// negative or absurd count.
pub const MAX_REPLICAS: u32 = 10_000;

/// Applies a committed command to the state, producing events for the bus.
///
/// Failures reject the one command; the state machine continues applying
/// subsequent log entries.
#[allow(clippy::too_many_lines)]
pub fn apply_committed(state: &mut State, cmd: Command) -> Result<Vec<Event>, KernelError> {
    match cmd {
        // ====================================================================
        // Nodes
        // ====================================================================
        Command::CreateNode { node } => {
            if state.node(&node.id).is_some() {
                return Err(KernelError::NodeExists(node.id.to_string()));
            }
            if state.node_name_exists(&node.name) {
                return Err(KernelError::NameConflict {
                    kind: "node",
                    name: node.name.clone(),
                });
            }
            if !is_valid_name(&node.name) {
                return Err(KernelError::InvalidName(node.name.clone()));
            }

            let event = Event::NodeCreated {
                id: node.id,
                name: node.name.clone(),
            };
            state.insert_node(node);
            Ok(vec![event])
        }

        Command::UpdateNode {
            id,
            capacity,
            address,
            role,
        } => {
            let node = state.node(&id).ok_or(KernelError::NodeNotFound(id))?;
            if let Some(capacity) = &capacity {
                // Shrinking below current reservations would break the
                // capacity conservation invariant.
                let reserved = state.reserved_on(node.id);
                if !capacity.fits(&reserved) {
                    return Err(KernelError::CapacityBelowReservations(id));
                }
            }

            let node = state.node_mut(&id).expect("checked above");
            if let Some(capacity) = capacity {
                node.capacity = capacity;
            }
            if let Some(address) = address {
                node.address = address;
            }
            if let Some(role) = role {
                node.role = role;
            }
            Ok(vec![Event::NodeUpdated { id }])
        }

        Command::RemoveNode { id } => {
            if state.node(&id).is_none() {
                return Err(KernelError::NodeNotFound(id));
            }
            if state.instances_on(id).any(|i| !i.actual.is_terminal()) {
                return Err(KernelError::NodeHasInstances(id));
            }
            state.remove_node(&id);
            Ok(vec![Event::NodeRemoved { id }])
        }

        Command::RegisterHeartbeat { id, at } => {
            let node = state.node_mut(&id).ok_or(KernelError::NodeNotFound(id))?;
            // Heartbeats never move time backward.
            if at > node.last_heartbeat {
                node.last_heartbeat = at;
            }
            Ok(vec![Event::NodeHeartbeat { id, at }])
        }

        Command::SetNodeStatus { id, status } => {
            let node = state.node_mut(&id).ok_or(KernelError::NodeNotFound(id))?;
            let from = node.status;
            node.status = status;
            Ok(vec![Event::NodeStatusChanged {
                id,
                from,
                to: status,
            }])
        }

        // ====================================================================
        // Services
        // ====================================================================
        Command::CreateService {
            id,
            spec,
            created_at,
        } => {
            if state.service(&id).is_some() {
                return Err(KernelError::ServiceExists(id.to_string()));
            }
            validate_spec(state, &spec)?;
            if state.service_name_exists(&spec.name) {
                return Err(KernelError::NameConflict {
                    kind: "service",
                    name: spec.name.clone(),
                });
            }

            let service = service_from_spec(id, spec, created_at);
            let event = Event::ServiceCreated {
                id,
                name: service.name.clone(),
            };
            state.insert_service(service);
            Ok(vec![event])
        }

        Command::UpdateService { id, spec } => {
            let current = state
                .service(&id)
                .ok_or(KernelError::ServiceNotFound(id))?;
            validate_spec(state, &spec)?;
            if spec.name != current.name && state.service_name_exists(&spec.name) {
                return Err(KernelError::NameConflict {
                    kind: "service",
                    name: spec.name.clone(),
                });
            }

            let old_name = current.name.clone();
            if spec.name != old_name {
                state.rename_service(id, &old_name, spec.name.clone());
            }
            let service = state.service_mut(&id).expect("checked above");
            service.name = spec.name;
            service.image = spec.image;
            service.replicas = spec.replicas;
            service.mode = spec.mode;
            service.env = spec.env;
            service.mounts = spec.mounts;
            service.secrets = spec.secrets;
            service.volumes = spec.volumes;
            service.resources = spec.resources;
            service.restart = spec.restart;
            service.update = spec.update;
            service.health_check = spec.health_check;
            service.labels = spec.labels;
            service.generation += 1;
            let generation = service.generation;

            Ok(vec![Event::ServiceUpdated { id, generation }])
        }

        Command::ScaleService { id, replicas } => {
            if replicas > MAX_REPLICAS {
                return Err(KernelError::InvalidReplicas(replicas));
            }
            let service = state
                .service_mut(&id)
                .ok_or(KernelError::ServiceNotFound(id))?;
            let from = service.replicas;
            service.replicas = replicas;
            service.generation += 1;
            Ok(vec![Event::ServiceScaled {
                id,
                from,
                to: replicas,
            }])
        }

        Command::SetServiceImage { id, image } => {
            let service = state
                .service_mut(&id)
                .ok_or(KernelError::ServiceNotFound(id))?;
            service.image = image.clone();
            service.generation += 1;
            Ok(vec![Event::ServiceImageSet { id, image }])
        }

        Command::SetDeployMeta { id, meta } => {
            let service = state
                .service_mut(&id)
                .ok_or(KernelError::ServiceNotFound(id))?;
            service.deploy = meta;
            Ok(vec![Event::ServiceDeployMetaSet { id }])
        }

        Command::DeleteService { id } => {
            if state.service(&id).is_none() {
                return Err(KernelError::ServiceNotFound(id));
            }

            let mut events = Vec::new();
            // Cascade: owned instances are marked for shutdown; the
            // reconciler GCs them once workers report completion.
            for instance_id in state.instance_ids_of(id) {
                let instance = state.instance_mut(&instance_id).expect("id from iteration");
                if instance.desired != DesiredState::Shutdown {
                    instance.desired = DesiredState::Shutdown;
                    events.push(Event::InstanceShutdownMarked { id: instance_id });
                }
            }
            let service = state.remove_service(&id).expect("checked above");
            events.push(Event::ServiceDeleted {
                id,
                name: service.name,
            });
            Ok(events)
        }

        // ====================================================================
        // Instances
        // ====================================================================
        Command::CreateInstance {
            id,
            service_id,
            node_id,
            created_at,
        } => {
            if state.instance(&id).is_some() {
                return Err(KernelError::InstanceExists(id.to_string()));
            }
            let service = state
                .service(&service_id)
                .ok_or(KernelError::ServiceNotFound(service_id))?;
            let reservation = service.resources;
            let image = service.image.clone();

            let mut actual = ActualState::Pending;
            if let Some(node_id) = node_id {
                let node = state
                    .node(&node_id)
                    .ok_or(KernelError::NodeNotFound(node_id))?;
                if node.status != NodeStatus::Ready {
                    return Err(KernelError::NodeNotReady(node_id));
                }
                if !state.free_on(node).fits(&reservation) {
                    return Err(KernelError::InsufficientCapacity(node_id));
                }
                actual = ActualState::Assigned;
            }

            state.insert_instance(Instance {
                id,
                service_id,
                node_id,
                desired: DesiredState::Running,
                actual,
                image,
                reservation,
                health: HealthState::new(),
                created_at,
                started_at: None,
                finished_at: None,
                last_error: None,
                pending_reason: None,
            });
            Ok(vec![Event::InstanceCreated { id, service_id }])
        }

        Command::AssignInstance { id, node_id } => {
            let instance = state.instance(&id).ok_or(KernelError::InstanceNotFound(id))?;
            if instance.node_id.is_some() {
                return Err(KernelError::AlreadyAssigned(id));
            }
            let reservation = instance.reservation;
            let node = state
                .node(&node_id)
                .ok_or(KernelError::NodeNotFound(node_id))?;
            if node.status != NodeStatus::Ready {
                return Err(KernelError::NodeNotReady(node_id));
            }
            if !state.free_on(node).fits(&reservation) {
                return Err(KernelError::InsufficientCapacity(node_id));
            }

            let instance = state.instance_mut(&id).expect("checked above");
            instance.node_id = Some(node_id);
            instance.actual = ActualState::Assigned;
            instance.pending_reason = None;
            Ok(vec![Event::InstanceAssigned { id, node_id }])
        }

        Command::ReportInstanceState {
            id,
            actual,
            error,
            at,
        } => {
            let instance = state.instance(&id).ok_or(KernelError::InstanceNotFound(id))?;
            // Level-triggered reporters re-send; same-state reports are
            // no-ops, backward transitions are rejected.
            if instance.actual != actual && !instance.actual.can_transition_to(actual) {
                return Err(KernelError::IllegalTransition {
                    id,
                    from: instance.actual,
                    to: actual,
                });
            }

            let instance = state.instance_mut(&id).expect("checked above");
            if instance.actual != actual {
                instance.actual = actual;
                match actual {
                    ActualState::Running => instance.started_at = Some(at),
                    ActualState::Complete | ActualState::Failed => {
                        instance.finished_at = Some(at);
                    }
                    ActualState::Pending | ActualState::Assigned => {}
                }
            }
            if let Some(error) = error {
                instance.last_error = Some(error);
            }
            Ok(vec![Event::InstanceStateReported { id, actual }])
        }

        Command::ReportHealth { id, result } => {
            let instance = state.instance(&id).ok_or(KernelError::InstanceNotFound(id))?;
            let retries = state
                .service(&instance.service_id)
                .and_then(|s| s.health_check.as_ref())
                .map_or(3, |hc| hc.retries);

            let instance = state.instance_mut(&id).expect("checked above");
            instance.health.observe(&result, retries);
            let healthy = instance.health.healthy;
            Ok(vec![Event::InstanceHealthReported { id, healthy }])
        }

        Command::MarkInstanceShutdown { id } => {
            let instance = state
                .instance_mut(&id)
                .ok_or(KernelError::InstanceNotFound(id))?;
            // Idempotent: marking an already-shutdown instance is a no-op.
            instance.desired = DesiredState::Shutdown;
            Ok(vec![Event::InstanceShutdownMarked { id }])
        }

        Command::SetInstancePendingReason { id, reason } => {
            let instance = state
                .instance_mut(&id)
                .ok_or(KernelError::InstanceNotFound(id))?;
            instance.pending_reason = reason;
            Ok(vec![Event::InstancePendingReasonSet { id }])
        }

        Command::DeleteInstance { id } => {
            state
                .remove_instance(&id)
                .ok_or(KernelError::InstanceNotFound(id))?;
            Ok(vec![Event::InstanceDeleted { id }])
        }

        // ====================================================================
        // Secrets / Volumes
        // ====================================================================
        Command::CreateSecret { secret } => {
            if state.secret(&secret.id).is_some() {
                return Err(KernelError::SecretExists(secret.id.to_string()));
            }
            if !is_valid_name(&secret.name) {
                return Err(KernelError::InvalidName(secret.name.clone()));
            }
            if state.secret_name_exists(&secret.name) {
                return Err(KernelError::NameConflict {
                    kind: "secret",
                    name: secret.name.clone(),
                });
            }
            let event = Event::SecretCreated {
                id: secret.id,
                name: secret.name.clone(),
            };
            state.insert_secret(secret);
            Ok(vec![event])
        }

        Command::DeleteSecret { id } => {
            if state.secret(&id).is_none() {
                return Err(KernelError::SecretNotFound(id));
            }
            if state.secret_in_use(&id) {
                return Err(KernelError::SecretInUse(id));
            }
            state.remove_secret(&id);
            Ok(vec![Event::SecretDeleted { id }])
        }

        Command::CreateVolume { volume } => {
            if state.volume(&volume.id).is_some() {
                return Err(KernelError::VolumeExists(volume.id.to_string()));
            }
            if !is_valid_name(&volume.name) {
                return Err(KernelError::InvalidName(volume.name.clone()));
            }
            if state.volume_name_exists(&volume.name) {
                return Err(KernelError::NameConflict {
                    kind: "volume",
                    name: volume.name.clone(),
                });
            }
            let event = Event::VolumeCreated {
                id: volume.id,
                name: volume.name.clone(),
            };
            state.insert_volume(volume);
            Ok(vec![event])
        }

        Command::DeleteVolume { id } => {
            if state.volume(&id).is_none() {
                return Err(KernelError::VolumeNotFound(id));
            }
            if state.volume_in_use(&id) {
                return Err(KernelError::VolumeInUse(id));
            }
            state.remove_volume(&id);
            Ok(vec![Event::VolumeDeleted { id }])
        }
    }
}

/// Spec validation shared by create and update: name pattern, replica
/// cap, and secret/volume references resolving at this moment.
fn validate_spec(state: &State, spec: &ServiceSpec) -> Result<(), KernelError> {
    if !is_valid_name(&spec.name) {
        return Err(KernelError::InvalidName(spec.name.clone()));
    }
    if spec.replicas > MAX_REPLICAS {
        return Err(KernelError::InvalidReplicas(spec.replicas));
    }
    for secret in &spec.secrets {
        if state.secret(secret).is_none() {
            return Err(KernelError::SecretNotFound(*secret));
        }
    }
    for volume in &spec.volumes {
        if state.volume(volume).is_none() {
            return Err(KernelError::VolumeNotFound(*volume));
        }
    }
    Ok(())
}

fn service_from_spec(
    id: warren_types::ServiceId,
    spec: ServiceSpec,
    created_at: Timestamp,
) -> Service {
    Service {
        id,
        name: spec.name,
        image: spec.image,
        replicas: spec.replicas,
        mode: spec.mode,
        env: spec.env,
        mounts: spec.mounts,
        secrets: spec.secrets,
        volumes: spec.volumes,
        resources: spec.resources,
        restart: spec.restart,
        update: spec.update,
        health_check: spec.health_check,
        generation: 1,
        deploy: warren_types::DeployMeta::default(),
        labels: spec.labels,
        created_at,
    }
}

/// Errors that can occur when applying commands to the kernel.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    #[error("node with id {0} already exists")]
    NodeExists(String),

    #[error("node {0} not found")]
    NodeNotFound(warren_types::NodeId),

    #[error("node {0} is not ready")]
    NodeNotReady(warren_types::NodeId),

    #[error("node {0} still has non-terminal instances assigned")]
    NodeHasInstances(warren_types::NodeId),

    #[error("node {0} capacity would fall below current reservations")]
    CapacityBelowReservations(warren_types::NodeId),

    #[error("insufficient free capacity on node {0}")]
    InsufficientCapacity(warren_types::NodeId),

    #[error("service with id {0} already exists")]
    ServiceExists(String),

    #[error("service {0} not found")]
    ServiceNotFound(warren_types::ServiceId),

    #[error("replica count {0} exceeds the supported maximum")]
    InvalidReplicas(u32),

    #[error("instance with id {0} already exists")]
    InstanceExists(String),

    #[error("instance {0} not found")]
    InstanceNotFound(warren_types::InstanceId),

    #[error("instance {0} is already assigned to a node")]
    AlreadyAssigned(warren_types::InstanceId),

    #[error("instance {id} cannot transition from {from} to {to}")]
    IllegalTransition {
        id: warren_types::InstanceId,
        from: ActualState,
        to: ActualState,
    },

    #[error("secret with id {0} already exists")]
    SecretExists(String),

    #[error("secret {0} not found")]
    SecretNotFound(warren_types::SecretId),

    #[error("secret {0} is referenced by a service")]
    SecretInUse(warren_types::SecretId),

    #[error("volume with id {0} already exists")]
    VolumeExists(String),

    #[error("volume {0} not found")]
    VolumeNotFound(warren_types::VolumeId),

    #[error("volume {0} is referenced by a service")]
    VolumeInUse(warren_types::VolumeId),

    #[error("{kind} name '{name}' already exists")]
    NameConflict { kind: &'static str, name: String },

    #[error("invalid name '{0}'")]
    InvalidName(String),

    #[error("unsupported command version {0}")]
    UnsupportedVersion(u8),

    #[error("failed to decode command: {0}")]
    Decode(String),
}
