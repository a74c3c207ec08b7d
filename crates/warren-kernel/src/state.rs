//! The cluster model owned by the replicated state machine.
//!
//! The state holds one ordered map per entity kind, keyed by id.
//! Relations (service ↔ instance ↔ node) are never stored as references;
//! they are resolved by lookup and iterated with explicit predicates.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use warren_types::{
    Instance, InstanceId, Node, NodeId, NodeStatus, Resources, Secret, SecretId, Service,
    ServiceId, Volume, VolumeId,
};

/// The in-memory cluster model.
///
/// Mutated only from the apply path, one command at a time; everything
/// else reads snapshots. `BTreeMap` keeps iteration order deterministic,
/// which both the snapshot encoding and the planners rely on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct State {
    nodes: BTreeMap<NodeId, Node>,
    services: BTreeMap<ServiceId, Service>,
    instances: BTreeMap<InstanceId, Instance>,
    secrets: BTreeMap<SecretId, Secret>,
    volumes: BTreeMap<VolumeId, Volume>,

    // Name uniqueness indexes
    service_names: BTreeMap<String, ServiceId>,
    secret_names: BTreeMap<String, SecretId>,
    volume_names: BTreeMap<String, VolumeId>,
}

impl State {
    /// Creates a new empty state.
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Nodes
    // ========================================================================

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Ready worker nodes, the scheduler's candidate pool.
    pub fn schedulable_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values().filter(|n| n.schedulable())
    }

    pub fn node_name_exists(&self, name: &str) -> bool {
        self.nodes.values().any(|n| n.name == name)
    }

    pub(crate) fn node_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub(crate) fn insert_node(&mut self, node: Node) {
        self.nodes.insert(node.id, node);
    }

    pub(crate) fn remove_node(&mut self, id: &NodeId) -> Option<Node> {
        self.nodes.remove(id)
    }

    // ========================================================================
    // Services
    // ========================================================================

    pub fn service(&self, id: &ServiceId) -> Option<&Service> {
        self.services.get(id)
    }

    pub fn services(&self) -> impl Iterator<Item = &Service> {
        self.services.values()
    }

    pub fn service_count(&self) -> usize {
        self.services.len()
    }

    pub fn service_by_name(&self, name: &str) -> Option<&Service> {
        self.service_names.get(name).and_then(|id| self.services.get(id))
    }

    pub fn service_name_exists(&self, name: &str) -> bool {
        self.service_names.contains_key(name)
    }

    pub(crate) fn service_mut(&mut self, id: &ServiceId) -> Option<&mut Service> {
        self.services.get_mut(id)
    }

    pub(crate) fn insert_service(&mut self, service: Service) {
        self.service_names.insert(service.name.clone(), service.id);
        self.services.insert(service.id, service);
    }

    pub(crate) fn rename_service(&mut self, id: ServiceId, old: &str, new: String) {
        self.service_names.remove(old);
        self.service_names.insert(new, id);
    }

    pub(crate) fn remove_service(&mut self, id: &ServiceId) -> Option<Service> {
        let service = self.services.remove(id)?;
        self.service_names.remove(&service.name);
        Some(service)
    }

    /// True if any service references the given secret.
    pub fn secret_in_use(&self, id: &SecretId) -> bool {
        self.services.values().any(|s| s.secrets.contains(id))
    }

    /// True if any service references the given volume.
    pub fn volume_in_use(&self, id: &VolumeId) -> bool {
        self.services.values().any(|s| s.volumes.contains(id))
    }

    // ========================================================================
    // Instances
    // ========================================================================

    pub fn instance(&self, id: &InstanceId) -> Option<&Instance> {
        self.instances.get(id)
    }

    pub fn instances(&self) -> impl Iterator<Item = &Instance> {
        self.instances.values()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Instances where service-id == `id`.
    pub fn instances_of(&self, id: ServiceId) -> impl Iterator<Item = &Instance> {
        self.instances.values().filter(move |i| i.service_id == id)
    }

    /// Instances assigned to the given node.
    pub fn instances_on(&self, id: NodeId) -> impl Iterator<Item = &Instance> {
        self.instances.values().filter(move |i| i.node_id == Some(id))
    }

    /// Count of live replicas for a service: desired=running and actual
    /// not yet terminal.
    pub fn live_replicas(&self, id: ServiceId) -> usize {
        self.instances_of(id).filter(|i| i.is_live()).count()
    }

    /// Sum of reservations held by non-terminal instances assigned to
    /// the node. The capacity conservation invariant is
    /// `reserved_on(node) ≤ node.capacity` at all times.
    pub fn reserved_on(&self, id: NodeId) -> Resources {
        self.instances_on(id)
            .filter(|i| !i.actual.is_terminal())
            .fold(Resources::ZERO, |acc, i| acc.saturating_add(i.reservation))
    }

    /// Declared capacity minus current reservations, for ready nodes.
    pub fn free_on(&self, node: &Node) -> Resources {
        node.capacity.saturating_sub(self.reserved_on(node.id))
    }

    pub(crate) fn instance_mut(&mut self, id: &InstanceId) -> Option<&mut Instance> {
        self.instances.get_mut(id)
    }

    pub(crate) fn insert_instance(&mut self, instance: Instance) {
        self.instances.insert(instance.id, instance);
    }

    pub(crate) fn remove_instance(&mut self, id: &InstanceId) -> Option<Instance> {
        self.instances.remove(id)
    }

    /// Ids of instances owned by a service (collected to avoid holding
    /// a borrow across the cascade mutation).
    pub(crate) fn instance_ids_of(&self, id: ServiceId) -> Vec<InstanceId> {
        self.instances_of(id).map(|i| i.id).collect()
    }

    // ========================================================================
    // Secrets / Volumes
    // ========================================================================

    pub fn secret(&self, id: &SecretId) -> Option<&Secret> {
        self.secrets.get(id)
    }

    pub fn secrets(&self) -> impl Iterator<Item = &Secret> {
        self.secrets.values()
    }

    pub fn secret_name_exists(&self, name: &str) -> bool {
        self.secret_names.contains_key(name)
    }

    pub(crate) fn insert_secret(&mut self, secret: Secret) {
        self.secret_names.insert(secret.name.clone(), secret.id);
        self.secrets.insert(secret.id, secret);
    }

    pub(crate) fn remove_secret(&mut self, id: &SecretId) -> Option<Secret> {
        let secret = self.secrets.remove(id)?;
        self.secret_names.remove(&secret.name);
        Some(secret)
    }

    pub fn volume(&self, id: &VolumeId) -> Option<&Volume> {
        self.volumes.get(id)
    }

    pub fn volumes(&self) -> impl Iterator<Item = &Volume> {
        self.volumes.values()
    }

    pub fn volume_name_exists(&self, name: &str) -> bool {
        self.volume_names.contains_key(name)
    }

    pub(crate) fn insert_volume(&mut self, volume: Volume) {
        self.volume_names.insert(volume.name.clone(), volume.id);
        self.volumes.insert(volume.id, volume);
    }

    pub(crate) fn remove_volume(&mut self, id: &VolumeId) -> Option<Volume> {
        let volume = self.volumes.remove(id)?;
        self.volume_names.remove(&volume.name);
        Some(volume)
    }

    // ========================================================================
    // Ready-node helpers for global-mode reconciliation
    // ========================================================================

    /// True if the node exists and has the given status.
    pub fn node_has_status(&self, id: NodeId, status: NodeStatus) -> bool {
        self.nodes.get(&id).is_some_and(|n| n.status == status)
    }
}
