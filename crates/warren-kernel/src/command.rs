//! The command log: typed mutations serialized into the replicated log.
//!
//! Every change to the cluster model is expressed as one [`Command`]
//! value. Components never mutate entities directly; they compose a
//! command and submit it through the store, which commits it via
//! consensus and applies it here.
//!
//! Commands serialize as stable, versioned records ([`Command::encode`]):
//! a single version byte followed by the postcard encoding of the enum.

use serde::{Deserialize, Serialize};
use warren_types::{
    ActualState, HealthCheck, InstanceId, Mount, Node, NodeId, NodeRole, NodeStatus, ProbeResult,
    Resources, RestartPolicy, Secret, SecretId, ServiceId, ServiceMode, Timestamp, UpdateConfig,
    Volume, VolumeId,
};

use std::collections::BTreeMap;

use crate::kernel::KernelError;
use warren_types::DeployMeta;

/// Encoding version for commands in the replicated log.
///
/// Bump when the enum layout changes incompatibly; decode rejects
/// versions it does not understand rather than misreading bytes.
pub const COMMAND_VERSION: u8 = 1;

/// The declarative part of a service, as submitted by callers.
///
/// The kernel turns this into a [`warren_types::Service`] by attaching
/// identity, generation, and deployment bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub name: String,
    pub image: String,
    pub replicas: u32,
    pub mode: ServiceMode,
    pub env: BTreeMap<String, String>,
    pub mounts: Vec<Mount>,
    pub secrets: Vec<SecretId>,
    pub volumes: Vec<VolumeId>,
    pub resources: Resources,
    pub restart: RestartPolicy,
    pub update: UpdateConfig,
    pub health_check: Option<HealthCheck>,
    pub labels: BTreeMap<String, String>,
}

impl ServiceSpec {
    /// A minimal spec for `replicas` copies of `image`.
    pub fn replicated(name: impl Into<String>, image: impl Into<String>, replicas: u32) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            replicas,
            mode: ServiceMode::Replicated,
            env: BTreeMap::new(),
            mounts: Vec::new(),
            secrets: Vec::new(),
            volumes: Vec::new(),
            resources: Resources::ZERO,
            restart: RestartPolicy::Always,
            update: UpdateConfig::default(),
            health_check: None,
            labels: BTreeMap::new(),
        }
    }
}

/// A typed mutation of the cluster model.
///
/// Applied deterministically by [`crate::kernel::apply_committed`]; each
/// variant's rejection conditions are documented there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    // ========================================================================
    // Nodes
    // ========================================================================
    /// Register a compute host. The full record is caller-composed so
    /// apply stays deterministic.
    CreateNode { node: Node },
    /// Change a node's declared capacity, address, or role.
    UpdateNode {
        id: NodeId,
        capacity: Option<Resources>,
        address: Option<String>,
        role: Option<NodeRole>,
    },
    /// Decommission a node. Rejected while instances still hold
    /// reservations on it.
    RemoveNode { id: NodeId },
    /// Record a heartbeat. Status transitions are a separate command so
    /// the liveness policy stays in the reconciler.
    RegisterHeartbeat { id: NodeId, at: Timestamp },
    /// Reconciler- or operator-driven status flip (ready/down/drain).
    SetNodeStatus { id: NodeId, status: NodeStatus },

    // ========================================================================
    // Services
    // ========================================================================
    CreateService {
        id: ServiceId,
        spec: ServiceSpec,
        created_at: Timestamp,
    },
    /// Full spec replacement; bumps the generation counter.
    UpdateService { id: ServiceId, spec: ServiceSpec },
    /// Focused replica-count change (scheduler-visible immediately).
    ScaleService { id: ServiceId, replicas: u32 },
    /// Focused image change, as issued at the top of a rolling update.
    SetServiceImage { id: ServiceId, image: String },
    /// Deployment bookkeeping transition (active/standby/canary/rolled-back).
    SetDeployMeta { id: ServiceId, meta: DeployMeta },
    /// Delete the service and mark all owned instances desired=shutdown.
    DeleteService { id: ServiceId },

    // ========================================================================
    // Instances
    // ========================================================================
    /// Insert an instance for a service. With `node_id` present the
    /// instance is created pre-assigned (used for global-mode services);
    /// otherwise it starts pending and unplaced.
    CreateInstance {
        id: InstanceId,
        service_id: ServiceId,
        node_id: Option<NodeId>,
        created_at: Timestamp,
    },
    /// Scheduler placement decision.
    AssignInstance { id: InstanceId, node_id: NodeId },
    /// Worker agent observation of the instance's actual state.
    ReportInstanceState {
        id: InstanceId,
        actual: ActualState,
        error: Option<String>,
        at: Timestamp,
    },
    /// Worker agent probe result, folded into the health tracker.
    ReportHealth {
        id: InstanceId,
        result: ProbeResult,
    },
    /// Request shutdown. Idempotent: re-marking is a no-op.
    MarkInstanceShutdown { id: InstanceId },
    /// Operator-visible diagnosis for unschedulable instances.
    SetInstancePendingReason {
        id: InstanceId,
        reason: Option<String>,
    },
    /// Remove the record entirely (reconciler GC).
    DeleteInstance { id: InstanceId },

    // ========================================================================
    // Secrets / Volumes
    // ========================================================================
    CreateSecret { secret: Secret },
    /// Rejected while any service references the secret.
    DeleteSecret { id: SecretId },
    CreateVolume { volume: Volume },
    /// Rejected while any service references the volume.
    DeleteVolume { id: VolumeId },
}

impl Command {
    /// Serializes the command as a versioned record for the log.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![COMMAND_VERSION];
        let body = postcard::to_allocvec(self)
            .expect("command serialization cannot fail (plain data, no maps with non-string keys)");
        buf.extend_from_slice(&body);
        buf
    }

    /// Decodes a versioned record produced by [`Command::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self, KernelError> {
        match bytes.split_first() {
            Some((&COMMAND_VERSION, body)) => {
                postcard::from_bytes(body).map_err(|e| KernelError::Decode(e.to_string()))
            }
            Some((&version, _)) => Err(KernelError::UnsupportedVersion(version)),
            None => Err(KernelError::Decode("empty record".to_string())),
        }
    }

    /// Short variant name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::CreateNode { .. } => "create-node",
            Command::UpdateNode { .. } => "update-node",
            Command::RemoveNode { .. } => "remove-node",
            Command::RegisterHeartbeat { .. } => "register-heartbeat",
            Command::SetNodeStatus { .. } => "set-node-status",
            Command::CreateService { .. } => "create-service",
            Command::UpdateService { .. } => "update-service",
            Command::ScaleService { .. } => "scale-service",
            Command::SetServiceImage { .. } => "set-service-image",
            Command::SetDeployMeta { .. } => "set-deploy-meta",
            Command::DeleteService { .. } => "delete-service",
            Command::CreateInstance { .. } => "create-instance",
            Command::AssignInstance { .. } => "assign-instance",
            Command::ReportInstanceState { .. } => "report-instance-state",
            Command::ReportHealth { .. } => "report-health",
            Command::MarkInstanceShutdown { .. } => "mark-instance-shutdown",
            Command::SetInstancePendingReason { .. } => "set-instance-pending-reason",
            Command::DeleteInstance { .. } => "delete-instance",
            Command::CreateSecret { .. } => "create-secret",
            Command::DeleteSecret { .. } => "delete-secret",
            Command::CreateVolume { .. } => "create-volume",
            Command::DeleteVolume { .. } => "delete-volume",
        }
    }
}
