//! # warren-reconciler: Drift detection and corrective convergence
//!
//! The reconciler handles the deviations the scheduler does not: dead
//! nodes, failed and unhealthy instances, workloads stranded by node
//! loss, drained nodes, and terminal-instance garbage collection. Each
//! tick reads one snapshot, runs the passes in [`plan`], and submits
//! the corrective commands.
//!
//! The loop is level-triggered: every emitted command is safe to
//! re-issue, because a tick's observations may be acted on again before
//! their effects land in the next snapshot.

mod plan;
mod runner;

pub use plan::{Thresholds, plan};
pub use runner::{ReconcilerConfig, run};
