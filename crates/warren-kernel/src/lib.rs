//! # warren-kernel: Functional core of the Warren control plane
//!
//! The kernel is the pure, deterministic heart of the orchestrator. It
//! receives committed commands and produces state changes plus events for
//! the bus.
//!
//! ## Key Principles
//!
//! - **No IO**: the kernel never touches disk, network, or any external resource
//! - **No clocks**: timestamps arrive inside commands, stamped by the submitting shell
//! - **No randomness**: same input always produces same output
//! - **Validate, then mutate**: every command arm checks all rejection
//!   conditions before the first mutation, so a rejected command leaves
//!   the state untouched
//!
//! ## Architecture
//!
//! - [`command`]: the typed mutation log ([`Command`], [`ServiceSpec`])
//! - [`state`]: the cluster model ([`State`]) — maps keyed by id, relations by lookup
//! - [`kernel`]: [`apply_committed`] — a total function over command variants
//! - [`events`]: applied-command notifications ([`Event`])

pub mod command;
pub mod events;
pub mod kernel;
pub mod state;


pub use command::{Command, ServiceSpec};
pub use events::Event;
pub use kernel::{KernelError, apply_committed};
pub use state::State;
