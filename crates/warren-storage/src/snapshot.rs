//! Snapshot directory: serialized state-machine images used to truncate
//! the log and catch up lagging peers.
//!
//! Only the newest snapshot matters; older files are pruned after a
//! successful save.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::StorageError;

const SNAPSHOT_DIR: &str = "snapshots";
const SNAPSHOT_EXT: &str = "snap";

/// A complete state-machine image at a log position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotBlob {
    /// Last log index covered by this snapshot.
    pub last_index: u64,
    /// Term of that entry.
    pub last_term: u64,
    /// Serialized state machine, opaque to the store.
    pub state: Vec<u8>,
}

/// File-per-snapshot store with latest-wins retention.
#[derive(Debug)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn open(data_dir: &Path) -> Result<Self, StorageError> {
        let dir = data_dir.join(SNAPSHOT_DIR);
        fs::create_dir_all(&dir).map_err(|e| StorageError::io(&dir, e))?;
        Ok(Self { dir })
    }

    fn path_for(&self, index: u64) -> PathBuf {
        self.dir.join(format!("snapshot-{index:020}.{SNAPSHOT_EXT}"))
    }

    /// Writes a snapshot atomically, then prunes older files.
    pub fn save(&self, blob: &SnapshotBlob) -> Result<(), StorageError> {
        let bytes =
            postcard::to_allocvec(blob).map_err(|e| StorageError::Encode(e.to_string()))?;
        let path = self.path_for(blob.last_index);
        let tmp = path.with_extension("snap.tmp");
        {
            let mut file = File::create(&tmp).map_err(|e| StorageError::io(&tmp, e))?;
            file.write_all(&bytes).map_err(|e| StorageError::io(&tmp, e))?;
            file.sync_data().map_err(|e| StorageError::io(&tmp, e))?;
        }
        fs::rename(&tmp, &path).map_err(|e| StorageError::io(&path, e))?;

        self.prune_older_than(blob.last_index);
        Ok(())
    }

    /// Loads the newest snapshot, if any.
    ///
    /// A snapshot that fails to decode is skipped in favor of the next
    /// newest; recovery prefers an older image over refusing to start.
    pub fn load_latest(&self) -> Result<Option<SnapshotBlob>, StorageError> {
        let mut indexed = self.list()?;
        indexed.sort_unstable();
        for index in indexed.into_iter().rev() {
            let path = self.path_for(index);
            let mut bytes = Vec::new();
            File::open(&path)
                .and_then(|mut f| f.read_to_end(&mut bytes))
                .map_err(|e| StorageError::io(&path, e))?;
            match postcard::from_bytes::<SnapshotBlob>(&bytes) {
                Ok(blob) => return Ok(Some(blob)),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable snapshot");
                }
            }
        }
        Ok(None)
    }

    fn list(&self) -> Result<Vec<u64>, StorageError> {
        let mut indexes = Vec::new();
        let entries = fs::read_dir(&self.dir).map_err(|e| StorageError::io(&self.dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::io(&self.dir, e))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(index) = name
                .strip_prefix("snapshot-")
                .and_then(|rest| rest.strip_suffix(&format!(".{SNAPSHOT_EXT}")))
                .and_then(|digits| digits.parse::<u64>().ok())
            {
                indexes.push(index);
            }
        }
        Ok(indexes)
    }

    fn prune_older_than(&self, keep: u64) {
        let Ok(indexes) = self.list() else { return };
        for index in indexes {
            if index < keep {
                let path = self.path_for(index);
                if let Err(e) = fs::remove_file(&path) {
                    tracing::warn!(path = %path.display(), error = %e, "failed to prune snapshot");
                }
            }
        }
    }
}
