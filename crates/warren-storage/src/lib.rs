//! # warren-storage: Durable state for the consensus node
//!
//! Three stores, one directory:
//!
//! ```text
//! {data_dir}/
//! ├── log.warren          <- replicated log entries, keyed by index
//! ├── meta.warren         <- current term and voted-for
//! └── snapshots/
//!     └── snapshot-00000000000000008192.snap
//! ```
//!
//! The encoding is `postcard` with length-prefixed records; the layout
//! here is format-level only — consumers depend on the semantics (a log
//! keyed by monotonically increasing index, atomic metadata, a latest
//! snapshot), not the bytes.

mod error;
mod log;
mod meta;
mod snapshot;

pub use error::StorageError;
pub use log::{LogEntry, LogStore};
pub use meta::{MetaStore, RaftMeta};
pub use snapshot::{SnapshotBlob, SnapshotStore};
