//! # Warren: a distributed container orchestrator control plane
//!
//! Warren accepts declarative service specifications ("run N replicas of
//! image X") and maintains that desired state across a fleet of worker
//! machines despite node failures, container crashes, and unhealthy
//! workloads.
//!
//! This crate is the manager facade: [`Warren::open`] restores the
//! replicated store from disk, starts the consensus drive loop, the
//! scheduler, and the reconciler, and hands out the store, deployer,
//! and event handles the surrounding binary (RPC, CLI, worker agents)
//! builds on.
//!
//! ```ignore
//! let config = warren_config::ConfigLoader::new().load()?;
//! let warren = Warren::open(config)?;
//!
//! let store = warren.store();
//! store.submit(Command::CreateService { .. }).await?;
//!
//! warren.shutdown().await;
//! ```

mod manager;

pub use manager::{ClusterInfo, Warren, WarrenError};

// The surface the surrounding binary builds on.
pub use warren_config::{ConfigLoader, WarrenConfig};
pub use warren_deploy::{DeployError, Deployer};
pub use warren_kernel::{Command, Event, ServiceSpec, State};
pub use warren_store::{Store, StoreError, StoreStats};
pub use warren_types::{
    ActualState, DeployState, DeployStrategy, DesiredState, HealthCheck, Instance, InstanceId,
    Node, NodeId, NodeStatus, Secret, SecretId, Service, ServiceId, Timestamp, Volume, VolumeId,
};
