//! Deployment error types.

use warren_store::StoreError;
use warren_types::ServiceId;

/// Errors from deployment operations.
#[derive(thiserror::Error, Debug)]
pub enum DeployError {
    #[error("service {0} not found")]
    ServiceNotFound(ServiceId),

    #[error("no standby version recorded for service {0}")]
    NoStandby(ServiceId),

    /// The clone (or canary) never became healthy within the gate.
    #[error("health gate timed out for service {0}")]
    HealthGateTimeout(ServiceId),

    /// Canary progression aborted and the stable version was restored.
    #[error("rolled back due to health check failures")]
    RolledBack,

    /// A command kept failing after transient retries; the deployment
    /// stopped in a partially-updated but observable state.
    #[error("submit failed persistently: {0}")]
    Store(#[from] StoreError),
}
