//! Storage error types.

use std::path::PathBuf;

/// Errors from the durable stores.
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt record in {path} at byte {at}: {reason}")]
    Corrupt {
        path: PathBuf,
        at: u64,
        reason: String,
    },

    #[error("log index {index} out of range [{first}, {last}]")]
    IndexOutOfRange { index: u64, first: u64, last: u64 },

    #[error("non-contiguous append: expected index {expected}, got {got}")]
    NonContiguous { expected: u64, got: u64 },

    #[error("encode failed: {0}")]
    Encode(String),
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
