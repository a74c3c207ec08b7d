//! Append-only log store keyed by monotonically increasing index.
//!
//! Entries live both in memory (the consensus node needs random access
//! to the un-snapshotted window) and on disk as length-prefixed postcard
//! records. The window is bounded by the snapshot threshold, so
//! truncation and compaction rewrite the file from memory rather than
//! maintaining segment machinery for a log that never grows past a few
//! thousand entries.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::StorageError;

const LOG_FILENAME: &str = "log.warren";

/// One replicated log record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Leader term the entry was created in.
    pub term: u64,
    /// Position in the log, starting at 1 (0 is "before any entry").
    pub index: u64,
    /// Encoded command, opaque to the log.
    pub data: Vec<u8>,
}

/// Durable, index-keyed log with an in-memory window.
#[derive(Debug)]
pub struct LogStore {
    path: PathBuf,
    /// Entries from `first_index` upward, contiguous.
    entries: Vec<LogEntry>,
    /// Index of `entries[0]`; entries below it were compacted into a
    /// snapshot. Equals `last_snapshot_index + 1`.
    first_index: u64,
    file: File,
}

impl LogStore {
    /// Opens (or creates) the log in `dir`, replaying existing records.
    ///
    /// A torn tail record (crash mid-append) is discarded and the file
    /// truncated to the last complete record.
    pub fn open(dir: &Path) -> Result<Self, StorageError> {
        fs::create_dir_all(dir).map_err(|e| StorageError::io(dir, e))?;
        let path = dir.join(LOG_FILENAME);

        let mut bytes = Vec::new();
        if path.exists() {
            File::open(&path)
                .and_then(|mut f| f.read_to_end(&mut bytes))
                .map_err(|e| StorageError::io(&path, e))?;
        }

        let (entries, valid_len) = decode_records(&bytes);
        if valid_len < bytes.len() as u64 {
            tracing::warn!(
                path = %path.display(),
                discarded = bytes.len() as u64 - valid_len,
                "discarding torn tail record"
            );
            let file = OpenOptions::new()
                .write(true)
                .open(&path)
                .map_err(|e| StorageError::io(&path, e))?;
            file.set_len(valid_len).map_err(|e| StorageError::io(&path, e))?;
        }

        let first_index = entries.first().map_or(1, |e| e.index);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| StorageError::io(&path, e))?;

        Ok(Self {
            path,
            entries,
            first_index,
            file,
        })
    }

    /// Index of the first retained entry (1 if nothing was compacted).
    pub fn first_index(&self) -> u64 {
        self.first_index
    }

    /// Index of the last entry, or `first_index - 1` when empty.
    pub fn last_index(&self) -> u64 {
        self.entries
            .last()
            .map_or(self.first_index.saturating_sub(1), |e| e.index)
    }

    /// Term of the entry at `index`, if retained.
    pub fn term_of(&self, index: u64) -> Option<u64> {
        self.get(index).map(|e| e.term)
    }

    pub fn get(&self, index: u64) -> Option<&LogEntry> {
        if index < self.first_index {
            return None;
        }
        self.entries.get((index - self.first_index) as usize)
    }

    /// Entries in `[from, to]`, clamped to the retained window.
    pub fn range(&self, from: u64, to: u64) -> &[LogEntry] {
        let lo = from.max(self.first_index);
        let hi = to.min(self.last_index());
        if lo > hi {
            return &[];
        }
        let start = (lo - self.first_index) as usize;
        let end = (hi - self.first_index + 1) as usize;
        &self.entries[start..end]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends entries, which must continue the log contiguously.
    pub fn append(&mut self, new: &[LogEntry]) -> Result<(), StorageError> {
        for entry in new {
            let expected = self.last_index() + 1;
            if entry.index != expected {
                return Err(StorageError::NonContiguous {
                    expected,
                    got: entry.index,
                });
            }
            let record = encode_record(entry)?;
            self.file
                .write_all(&record)
                .map_err(|e| StorageError::io(&self.path, e))?;
            self.entries.push(entry.clone());
        }
        self.file.flush().map_err(|e| StorageError::io(&self.path, e))?;
        self.file
            .sync_data()
            .map_err(|e| StorageError::io(&self.path, e))?;
        Ok(())
    }

    /// Drops every entry at `index` and above (conflict resolution after
    /// a leader change), rewriting the file.
    pub fn truncate_from(&mut self, index: u64) -> Result<(), StorageError> {
        if index > self.last_index() {
            return Ok(());
        }
        let keep = index.saturating_sub(self.first_index) as usize;
        self.entries.truncate(keep);
        self.rewrite()
    }

    /// Drops every entry up to and including `index` (absorbed into a
    /// snapshot), rewriting the file.
    pub fn compact_until(&mut self, index: u64) -> Result<(), StorageError> {
        if index < self.first_index {
            return Ok(());
        }
        let drop = (index - self.first_index + 1).min(self.entries.len() as u64) as usize;
        self.entries.drain(..drop);
        self.first_index = index + 1;
        self.rewrite()
    }

    fn rewrite(&mut self) -> Result<(), StorageError> {
        let tmp = self.path.with_extension("warren.tmp");
        {
            let mut file = File::create(&tmp).map_err(|e| StorageError::io(&tmp, e))?;
            for entry in &self.entries {
                let record = encode_record(entry)?;
                file.write_all(&record).map_err(|e| StorageError::io(&tmp, e))?;
            }
            file.sync_data().map_err(|e| StorageError::io(&tmp, e))?;
        }
        fs::rename(&tmp, &self.path).map_err(|e| StorageError::io(&self.path, e))?;
        self.file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| StorageError::io(&self.path, e))?;
        Ok(())
    }
}

/// `u32` length prefix followed by the postcard body.
fn encode_record(entry: &LogEntry) -> Result<Vec<u8>, StorageError> {
    let body = postcard::to_allocvec(entry).map_err(|e| StorageError::Encode(e.to_string()))?;
    let mut record = Vec::with_capacity(4 + body.len());
    record.extend_from_slice(&(body.len() as u32).to_le_bytes());
    record.extend_from_slice(&body);
    Ok(record)
}

/// Decodes complete records, returning them plus the byte length of the
/// valid prefix.
fn decode_records(bytes: &[u8]) -> (Vec<LogEntry>, u64) {
    let mut entries = Vec::new();
    let mut at = 0usize;
    loop {
        let Some(header) = bytes.get(at..at + 4) else {
            break;
        };
        let len = u32::from_le_bytes(header.try_into().expect("slice of 4")) as usize;
        let Some(body) = bytes.get(at + 4..at + 4 + len) else {
            break;
        };
        match postcard::from_bytes::<LogEntry>(body) {
            Ok(entry) => entries.push(entry),
            Err(_) => break,
        }
        at += 4 + len;
    }
    (entries, at as u64)
}
