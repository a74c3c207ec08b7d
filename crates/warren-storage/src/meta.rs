//! Consensus metadata store: current term and voted-for.
//!
//! Written atomically (tmp + rename) before any message that promises
//! the vote or acknowledges the term, so a restarted node can never
//! vote twice in the same term.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::StorageError;

const META_FILENAME: &str = "meta.warren";

/// Persistent per-node consensus state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RaftMeta {
    pub current_term: u64,
    /// Peer voted for in `current_term`, if any.
    pub voted_for: Option<u64>,
}

/// Atomic store for [`RaftMeta`].
#[derive(Debug)]
pub struct MetaStore {
    path: PathBuf,
}

impl MetaStore {
    pub fn open(dir: &Path) -> Result<Self, StorageError> {
        fs::create_dir_all(dir).map_err(|e| StorageError::io(dir, e))?;
        Ok(Self {
            path: dir.join(META_FILENAME),
        })
    }

    /// Loads the stored metadata, defaulting to term 0 on first boot.
    pub fn load(&self) -> Result<RaftMeta, StorageError> {
        if !self.path.exists() {
            return Ok(RaftMeta::default());
        }
        let mut bytes = Vec::new();
        File::open(&self.path)
            .and_then(|mut f| f.read_to_end(&mut bytes))
            .map_err(|e| StorageError::io(&self.path, e))?;
        postcard::from_bytes(&bytes).map_err(|e| StorageError::Corrupt {
            path: self.path.clone(),
            at: 0,
            reason: e.to_string(),
        })
    }

    /// Persists metadata durably before returning.
    pub fn save(&self, meta: RaftMeta) -> Result<(), StorageError> {
        let bytes =
            postcard::to_allocvec(&meta).map_err(|e| StorageError::Encode(e.to_string()))?;
        let tmp = self.path.with_extension("warren.tmp");
        {
            let mut file = File::create(&tmp).map_err(|e| StorageError::io(&tmp, e))?;
            file.write_all(&bytes).map_err(|e| StorageError::io(&tmp, e))?;
            file.sync_data().map_err(|e| StorageError::io(&tmp, e))?;
        }
        fs::rename(&tmp, &self.path).map_err(|e| StorageError::io(&self.path, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_on_first_boot() {
        let dir = TempDir::new().unwrap();
        let store = MetaStore::open(dir.path()).unwrap();
        assert_eq!(store.load().unwrap(), RaftMeta::default());
    }

    #[test]
    fn save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = MetaStore::open(dir.path()).unwrap();
        let meta = RaftMeta {
            current_term: 7,
            voted_for: Some(2),
        };
        store.save(meta).unwrap();
        assert_eq!(store.load().unwrap(), meta);

        // A fresh handle sees the same state.
        let reopened = MetaStore::open(dir.path()).unwrap();
        assert_eq!(reopened.load().unwrap(), meta);
    }
}
