//! # warren-scheduler: Placement and replica reconciliation
//!
//! On every tick the scheduler reads one snapshot and, per service,
//! makes the count of live instances match the declared replicas, then
//! places every pending unassigned instance on an eligible node.
//!
//! Decision logic is the pure [`plan`] function over a snapshot; the
//! [`run`] loop submits the planned commands through the store. Every
//! command is idempotent or collision-rejected, so a command that
//! applies twice (or races the reconciler) converges rather than
//! corrupting state. Leadership loss mid-tick is a soft skip: the next
//! tick on the new leader re-plans from fresh state.

mod plan;
mod runner;

pub use plan::{PENDING_NO_CAPACITY, plan};
pub use runner::{SchedulerConfig, run};
