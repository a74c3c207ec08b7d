//! Applied-command events published to the bus.
//!
//! Delivery is best-effort and strictly after apply; subscribers with
//! full buffers drop events. Nothing correctness-bearing may depend on
//! receiving one.

use serde::{Deserialize, Serialize};
use warren_types::{
    ActualState, InstanceId, NodeId, NodeStatus, SecretId, ServiceId, Timestamp, VolumeId,
};

/// A state-change notification, one (or more, for cascades) per applied
/// command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Event {
    NodeCreated { id: NodeId, name: String },
    NodeUpdated { id: NodeId },
    NodeRemoved { id: NodeId },
    NodeHeartbeat { id: NodeId, at: Timestamp },
    NodeStatusChanged {
        id: NodeId,
        from: NodeStatus,
        to: NodeStatus,
    },

    ServiceCreated { id: ServiceId, name: String },
    ServiceUpdated { id: ServiceId, generation: u64 },
    ServiceScaled {
        id: ServiceId,
        from: u32,
        to: u32,
    },
    ServiceImageSet { id: ServiceId, image: String },
    ServiceDeployMetaSet { id: ServiceId },
    ServiceDeleted { id: ServiceId, name: String },

    InstanceCreated {
        id: InstanceId,
        service_id: ServiceId,
    },
    InstanceAssigned {
        id: InstanceId,
        node_id: NodeId,
    },
    InstanceStateReported {
        id: InstanceId,
        actual: ActualState,
    },
    InstanceHealthReported {
        id: InstanceId,
        healthy: bool,
    },
    InstanceShutdownMarked { id: InstanceId },
    InstancePendingReasonSet { id: InstanceId },
    InstanceDeleted { id: InstanceId },

    SecretCreated { id: SecretId, name: String },
    SecretDeleted { id: SecretId },
    VolumeCreated { id: VolumeId, name: String },
    VolumeDeleted { id: VolumeId },
}
