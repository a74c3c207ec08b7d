//! # warren-store: The replicated store
//!
//! The single writer of the cluster model. Mutations enter as
//! [`warren_kernel::Command`] values through [`Store::submit`], are
//! committed via consensus, applied to the kernel state machine, and
//! published to the event bus. Reads are consistent snapshots
//! ([`Store::read_snapshot`]) — a cheap `Arc` clone, safe to hold across
//! a whole decision-loop tick.
//!
//! ## Leader-only writes
//!
//! `submit` on a non-leader fails fast with
//! [`StoreError::NotLeader`] carrying the current leader's address when
//! known; callers forward there. During an election window writes fail
//! and the decision loops soft-skip their tick.
//!
//! ## Snapshots
//!
//! The drive loop snapshots the kernel state when enough entries have
//! applied since the last image or enough time has elapsed, then
//! truncates the log through the consensus node.

mod driver;
mod error;
mod store;

pub use error::StoreError;
pub use store::{Store, StoreConfig, StoreStats};
