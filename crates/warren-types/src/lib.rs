//! # warren-types: Core entity model for Warren
//!
//! This crate contains the shared types used across the Warren control
//! plane:
//! - Entity IDs ([`NodeId`], [`ServiceId`], [`InstanceId`], [`SecretId`], [`VolumeId`])
//! - Temporal types ([`Timestamp`])
//! - Resource accounting ([`CpuMillis`], [`MemoryBytes`], [`Resources`])
//! - Cluster entities ([`Node`], [`Service`], [`Instance`], [`Secret`], [`Volume`])
//! - Lifecycle enums ([`NodeStatus`], [`DesiredState`], [`ActualState`], [`DeployState`])
//! - Health tracking ([`HealthState`], [`ProbeResult`])
//!
//! Everything here is plain data: no IO, no clocks (except the explicit
//! [`Timestamp::now`] shell helpers), no references between entities.
//! Relations are expressed by ID and resolved by lookup in the state
//! machine that owns the maps.

use std::{
    collections::BTreeMap,
    fmt::{Debug, Display},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Entity IDs - All Copy (16-byte UUIDs, caller-assigned)
// ============================================================================

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(Uuid);

        impl $name {
            /// Wraps an existing UUID (restoration from storage or wire).
            pub fn new(id: Uuid) -> Self {
                Self(id)
            }

            /// Generates a fresh random ID.
            ///
            /// IDs are caller-assigned: the submitter generates the ID
            /// before its first attempt so that retries after an ambiguous
            /// timeout are collision-rejected rather than duplicated.
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            /// Returns the underlying UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

entity_id! {
    /// Unique identifier for a compute host in the cluster.
    NodeId
}

entity_id! {
    /// Unique identifier for a declarative service specification.
    ServiceId
}

entity_id! {
    /// Unique identifier for one execution of a service.
    InstanceId
}

entity_id! {
    /// Unique identifier for a secret.
    SecretId
}

entity_id! {
    /// Unique identifier for a volume.
    VolumeId
}

// ============================================================================
// Timestamp - Copy (8-byte value with monotonic guarantee)
// ============================================================================

/// Wall-clock timestamp with monotonic guarantee within the system.
///
/// Stored as nanoseconds since Unix epoch (1970-01-01 00:00:00 UTC).
/// This gives us ~584 years of range, well beyond any practical use.
///
/// The state machine never reads clocks: commands carry timestamps
/// stamped by the submitting shell, which keeps apply deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The Unix epoch (1970-01-01 00:00:00 UTC).
    pub const EPOCH: Timestamp = Timestamp(0);

    /// Creates a timestamp from nanoseconds since Unix epoch.
    pub fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Returns the timestamp as nanoseconds since Unix epoch.
    pub fn as_nanos(&self) -> u64 {
        self.0
    }

    /// Returns the timestamp as seconds since Unix epoch (truncates).
    pub fn as_secs(&self) -> u64 {
        self.0 / 1_000_000_000
    }

    /// Creates a timestamp for the current time.
    ///
    /// # Panics
    ///
    /// Panics if the system clock is before Unix epoch (should never happen).
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is before Unix epoch");
        Self(duration.as_nanos() as u64)
    }

    /// Creates a timestamp ensuring monotonicity: `max(now, last + 1ns)`.
    pub fn now_monotonic(last: Option<Timestamp>) -> Self {
        let now = Self::now();
        match last {
            Some(prev) if now.0 <= prev.0 => Timestamp(prev.0.saturating_add(1)),
            _ => now,
        }
    }

    /// Adds a duration, saturating at the maximum representable time.
    pub fn saturating_add(self, d: Duration) -> Self {
        Timestamp(self.0.saturating_add(d.as_nanos() as u64))
    }

    /// Returns the elapsed time since `earlier`, or zero if `earlier`
    /// is in the future.
    pub fn saturating_since(self, earlier: Timestamp) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let secs = self.0 / 1_000_000_000;
        let nanos = self.0 % 1_000_000_000;
        write!(f, "{secs}.{nanos:09}")
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::EPOCH
    }
}

impl From<u64> for Timestamp {
    fn from(nanos: u64) -> Self {
        Self(nanos)
    }
}

impl From<Timestamp> for u64 {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}

// ============================================================================
// Resources - Copy (integer millicores / bytes, hard reservations)
// ============================================================================

/// CPU measured in millicores (1000 = one full core).
///
/// # Examples
///
/// ```
/// # use warren_types::CpuMillis;
/// let half_core = CpuMillis::new(500);
/// assert_eq!(half_core.as_u64(), 500);
/// assert_eq!(half_core.to_string(), "500m");
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct CpuMillis(u64);

impl CpuMillis {
    pub const ZERO: CpuMillis = CpuMillis(0);

    pub fn new(millis: u64) -> Self {
        Self(millis)
    }

    /// CPU for `n` whole cores.
    pub fn cores(n: u64) -> Self {
        Self(n * 1000)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn saturating_add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }

    pub fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl Display for CpuMillis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}m", self.0)
    }
}

impl From<u64> for CpuMillis {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Memory measured in bytes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct MemoryBytes(u64);

impl MemoryBytes {
    pub const ZERO: MemoryBytes = MemoryBytes(0);

    pub fn new(bytes: u64) -> Self {
        Self(bytes)
    }

    /// Memory for `n` mebibytes.
    pub fn mib(n: u64) -> Self {
        Self(n * 1024 * 1024)
    }

    /// Memory for `n` gibibytes.
    pub fn gib(n: u64) -> Self {
        Self(n * 1024 * 1024 * 1024)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn saturating_add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }

    pub fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl Display for MemoryBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}B", self.0)
    }
}

impl From<u64> for MemoryBytes {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// A pair of CPU and memory amounts.
///
/// Used both for node capacity and for instance reservations.
/// Reservations are hard: a node is ineligible for placement if it
/// cannot meet the full request, even by one unit.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Resources {
    pub cpu: CpuMillis,
    pub memory: MemoryBytes,
}

impl Resources {
    pub const ZERO: Resources = Resources {
        cpu: CpuMillis::ZERO,
        memory: MemoryBytes::ZERO,
    };

    pub fn new(cpu: CpuMillis, memory: MemoryBytes) -> Self {
        Self { cpu, memory }
    }

    /// Returns true if `self` can accommodate `request` in both dimensions.
    pub fn fits(&self, request: &Resources) -> bool {
        self.cpu >= request.cpu && self.memory >= request.memory
    }

    pub fn saturating_add(self, rhs: Resources) -> Self {
        Self {
            cpu: self.cpu.saturating_add(rhs.cpu),
            memory: self.memory.saturating_add(rhs.memory),
        }
    }

    pub fn saturating_sub(self, rhs: Resources) -> Self {
        Self {
            cpu: self.cpu.saturating_sub(rhs.cpu),
            memory: self.memory.saturating_sub(rhs.memory),
        }
    }

    /// Fraction of `capacity` that `self` represents, as the mean of the
    /// per-dimension fractions. Used by the scheduler's spread tie-break.
    pub fn fraction_of(&self, capacity: &Resources) -> f64 {
        let cpu = if capacity.cpu.as_u64() == 0 {
            0.0
        } else {
            self.cpu.as_u64() as f64 / capacity.cpu.as_u64() as f64
        };
        let mem = if capacity.memory.as_u64() == 0 {
            0.0
        } else {
            self.memory.as_u64() as f64 / capacity.memory.as_u64() as f64
        };
        (cpu + mem) / 2.0
    }
}

// ============================================================================
// Entity Names - validation shared by services, secrets, and volumes
// ============================================================================

/// Maximum length of an entity name.
pub const MAX_NAME_LEN: usize = 63;

/// Returns true if `name` is a valid entity name.
///
/// Names are lowercase alphanumerics and dashes, must start and end with
/// an alphanumeric, and are at most [`MAX_NAME_LEN`] characters.
pub fn is_valid_name(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return false;
    }
    let bytes = name.as_bytes();
    let alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    if !alnum(bytes[0]) || !alnum(bytes[bytes.len() - 1]) {
        return false;
    }
    bytes.iter().all(|&b| alnum(b) || b == b'-')
}

// ============================================================================
// Node - a compute host
// ============================================================================

/// Role a node plays in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeRole {
    /// Participates in consensus and runs the control loops.
    Manager,
    /// Runs workload instances.
    Worker,
}

impl Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeRole::Manager => write!(f, "manager"),
            NodeRole::Worker => write!(f, "worker"),
        }
    }
}

/// Liveness/availability status of a node.
///
/// `Ready` and `Down` are owned by the reconciler (heartbeat-driven);
/// `Drain` is operator-owned and is never flipped back by heartbeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum NodeStatus {
    #[default]
    Ready,
    Down,
    Drain,
}

impl Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeStatus::Ready => write!(f, "ready"),
            NodeStatus::Down => write!(f, "down"),
            NodeStatus::Drain => write!(f, "drain"),
        }
    }
}

/// A compute host registered with the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub role: NodeRole,
    pub status: NodeStatus,
    /// Declared capacity. Reservations are deducted from this.
    pub capacity: Resources,
    pub last_heartbeat: Timestamp,
    /// Address the node's agent is reachable at (opaque to the core).
    pub address: String,
}

impl Node {
    /// Returns true if this node is eligible to host new instances.
    pub fn schedulable(&self) -> bool {
        self.role == NodeRole::Worker && self.status == NodeStatus::Ready
    }
}

// ============================================================================
// Service - declarative specification for a set of instances
// ============================================================================

/// Replication mode of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ServiceMode {
    /// Fixed replica count spread across nodes.
    #[default]
    Replicated,
    /// Exactly one instance per ready worker node.
    Global,
}

/// What to do when an instance exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum RestartPolicy {
    #[default]
    Always,
    OnFailure,
    Never,
}

/// Strategy used when transitioning a service to a new version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DeployStrategy {
    #[default]
    Rolling,
    BlueGreen,
    Canary,
}

impl Display for DeployStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeployStrategy::Rolling => write!(f, "rolling"),
            DeployStrategy::BlueGreen => write!(f, "blue-green"),
            DeployStrategy::Canary => write!(f, "canary"),
        }
    }
}

/// Where a service stands in a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DeployState {
    /// Serving production traffic.
    #[default]
    Active,
    /// Parked previous (or candidate) version.
    Standby,
    /// Small-subset validation of a new version.
    Canary,
    /// Replaced after a failed or reverted deployment.
    RolledBack,
}

impl Display for DeployState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeployState::Active => write!(f, "active"),
            DeployState::Standby => write!(f, "standby"),
            DeployState::Canary => write!(f, "canary"),
            DeployState::RolledBack => write!(f, "rolled-back"),
        }
    }
}

/// Deployment bookkeeping attached to every service.
///
/// The deployer is stateless between calls; this record plus replica
/// counts is the entire persisted progress of a deployment, so a manager
/// failover mid-deployment leaves an observable, recoverable state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DeployMeta {
    pub state: DeployState,
    /// Version tag of the most recent deployment, if any.
    pub version: Option<String>,
    /// For clones created by blue/green or canary: the service they
    /// were cloned from.
    pub origin: Option<ServiceId>,
}

/// Parameters governing update execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateConfig {
    pub strategy: DeployStrategy,
    /// Instances replaced per batch in a rolling update.
    pub parallelism: u32,
    /// Pause between rolling batches.
    pub delay: Duration,
    /// Canary traffic weights, in percent, ending at 100.
    pub canary_steps: Vec<u8>,
    /// Soak time at each canary weight before advancing.
    pub stability_window: Duration,
    /// How long a fresh instance may be unhealthy before the gate fails.
    pub grace_period: Duration,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            strategy: DeployStrategy::Rolling,
            parallelism: 1,
            delay: Duration::from_secs(5),
            canary_steps: vec![10, 25, 50, 100],
            stability_window: Duration::from_secs(300),
            grace_period: Duration::from_secs(30),
        }
    }
}

/// What a health probe targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthProbe {
    /// HTTP GET against a path and port; 2xx is healthy.
    Http { path: String, port: u16 },
    /// Command executed in the container; exit 0 is healthy.
    Command { argv: Vec<String> },
}

/// Health check specification. Probes are executed by the worker agent;
/// the core only consumes the reported results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub probe: HealthProbe,
    pub interval: Duration,
    pub timeout: Duration,
    /// Consecutive failures before an instance flips to unhealthy.
    pub retries: u32,
    /// Window after monitoring starts during which failures are ignored
    /// by the reconciler.
    pub start_period: Duration,
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self {
            probe: HealthProbe::Http {
                path: "/".to_string(),
                port: 80,
            },
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(3),
            retries: 3,
            start_period: Duration::from_secs(10),
        }
    }
}

/// A filesystem mount requested by a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mount {
    pub source: String,
    pub target: String,
    pub read_only: bool,
}

/// A declarative specification for a set of replicated instances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    /// Unique across the cluster; see [`is_valid_name`].
    pub name: String,
    pub image: String,
    pub replicas: u32,
    pub mode: ServiceMode,
    pub env: BTreeMap<String, String>,
    pub mounts: Vec<Mount>,
    pub secrets: Vec<SecretId>,
    pub volumes: Vec<VolumeId>,
    /// Per-instance resource request (hard reservation).
    pub resources: Resources,
    pub restart: RestartPolicy,
    pub update: UpdateConfig,
    pub health_check: Option<HealthCheck>,
    /// Incremented on every spec mutation.
    pub generation: u64,
    pub deploy: DeployMeta,
    pub labels: BTreeMap<String, String>,
    pub created_at: Timestamp,
}

// ============================================================================
// Instance - one running/intended execution of a service
// ============================================================================

/// What the control plane wants this instance to be doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DesiredState {
    #[default]
    Running,
    Shutdown,
}

/// What the worker agent last reported the instance to be doing.
///
/// Transitions are monotonic through the rank ordering
/// pending → assigned → running → complete/failed. A failure may be
/// reported from any non-terminal state; nothing ever moves backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ActualState {
    #[default]
    Pending,
    Assigned,
    Running,
    Complete,
    Failed,
}

impl ActualState {
    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ActualState::Complete | ActualState::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            ActualState::Pending => 0,
            ActualState::Assigned => 1,
            ActualState::Running => 2,
            ActualState::Complete | ActualState::Failed => 3,
        }
    }

    /// Returns true if moving from `self` to `next` is a legal
    /// (forward, non-terminal-escaping) transition.
    ///
    /// # Examples
    ///
    /// ```
    /// # use warren_types::ActualState;
    /// assert!(ActualState::Pending.can_transition_to(ActualState::Failed));
    /// assert!(!ActualState::Complete.can_transition_to(ActualState::Running));
    /// ```
    pub fn can_transition_to(self, next: ActualState) -> bool {
        if self.is_terminal() {
            return false;
        }
        next.rank() > self.rank()
    }
}

impl Display for ActualState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActualState::Pending => write!(f, "pending"),
            ActualState::Assigned => write!(f, "assigned"),
            ActualState::Running => write!(f, "running"),
            ActualState::Complete => write!(f, "complete"),
            ActualState::Failed => write!(f, "failed"),
        }
    }
}

/// Hysteretic health record attached to an instance.
///
/// Rather than tracking probe edges, this stores consecutive counters
/// and a current flag: the flag flips to unhealthy only after
/// `retries` consecutive failures, and flips back on any success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthState {
    pub healthy: bool,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub last_check: Option<Timestamp>,
    pub last_message: String,
    /// When probing began; the reconciler ignores unhealthy flags until
    /// the configured start period has elapsed from here.
    pub monitoring_start: Option<Timestamp>,
}

impl HealthState {
    /// A fresh tracker: healthy until proven otherwise.
    pub fn new() -> Self {
        Self {
            healthy: true,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_check: None,
            last_message: String::new(),
            monitoring_start: None,
        }
    }

    /// Feeds one probe result into the tracker.
    ///
    /// `retries` is the configured consecutive-failure threshold.
    pub fn observe(&mut self, result: &ProbeResult, retries: u32) {
        if self.monitoring_start.is_none() {
            self.monitoring_start = Some(result.checked_at);
        }
        self.last_check = Some(result.checked_at);
        self.last_message = result.message.clone();

        if result.healthy {
            self.consecutive_successes += 1;
            self.consecutive_failures = 0;
            self.healthy = true;
        } else {
            self.consecutive_failures += 1;
            self.consecutive_successes = 0;
            if self.consecutive_failures >= retries {
                self.healthy = false;
            }
        }
    }

    /// Returns true once probing has run for at least `start_period`.
    pub fn past_grace(&self, start_period: Duration, now: Timestamp) -> bool {
        match self.monitoring_start {
            Some(start) => now.saturating_since(start) >= start_period,
            None => false,
        }
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

/// One probe execution reported by a worker agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub healthy: bool,
    pub message: String,
    pub checked_at: Timestamp,
}

/// One running (or intended) execution of a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub id: InstanceId,
    pub service_id: ServiceId,
    /// Empty until the scheduler places the instance.
    pub node_id: Option<NodeId>,
    pub desired: DesiredState,
    pub actual: ActualState,
    /// Image reference captured at scheduling time, so in-flight
    /// instances are not retagged by a concurrent service update.
    pub image: String,
    pub reservation: Resources,
    pub health: HealthState,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    pub last_error: Option<String>,
    /// Why the instance is still unscheduled, for operator diagnosis.
    pub pending_reason: Option<String>,
}

impl Instance {
    /// Counts toward a service's live replicas: wanted running and not
    /// yet terminal.
    pub fn is_live(&self) -> bool {
        self.desired == DesiredState::Running && !self.actual.is_terminal()
    }

    /// Holds a reservation on its node: assigned and not yet terminal.
    pub fn holds_reservation(&self) -> bool {
        self.node_id.is_some() && !self.actual.is_terminal()
    }
}

// ============================================================================
// Secret / Volume - referenced by services, deletion blocked while in use
// ============================================================================

/// Opaque secret metadata. Payload encryption and distribution are
/// outside the core; the state machine only tracks identity and
/// references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    pub id: SecretId,
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub created_at: Timestamp,
}

/// Named volume metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub id: VolumeId,
    pub name: String,
    pub driver: String,
    pub labels: BTreeMap<String, String>,
    pub created_at: Timestamp,
}

#[cfg(test)]
mod tests;
