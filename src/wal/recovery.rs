//! WAL Recovery
//!
//! Handles crash recovery by replaying the WAL.
//!
//! The log is streamed frame by frame; it is never loaded whole.

use std::fs::{self, OpenOptions};
use std::path::Path;

use tracing::warn;

use crate::error::Result;

use super::entry::Frame;
use super::{WalEntry, WalReader};

/// Handles WAL recovery after crash
pub struct WalRecovery;

/// Result of a recovery operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of entries successfully recovered
    pub entries_recovered: u64,

    /// Number of corrupted entries skipped
    pub entries_corrupted: u64,

    /// Last valid LSN
    pub last_lsn: u64,

    /// Whether the WAL was truncated (partial writes removed)
    pub was_truncated: bool,

    /// Length in bytes of the valid prefix
    pub valid_len: u64,
}

impl WalRecovery {
    /// Recover entries from a WAL file
    ///
    /// This will:
    /// 1. Read all valid entries
    /// 2. Stop at the first partial or corrupted entry
    /// 3. Truncate the file to the valid prefix
    /// 4. Return all valid entries in order
    pub fn recover(path: &Path) -> Result<(Vec<WalEntry>, RecoveryResult)> {
        let mut entries = Vec::new();
        let result = Self::replay(path, |entry| {
            entries.push(entry);
            Ok(())
        })?;
        Ok((entries, result))
    }

    /// Stream every valid entry to `apply`, then truncate like [`Self::recover`]
    ///
    /// Entries are handed over one at a time, in LSN order, as they are read.
    /// An error from `apply` aborts the replay before anything is truncated.
    pub fn replay<F>(path: &Path, apply: F) -> Result<RecoveryResult>
    where
        F: FnMut(WalEntry) -> Result<()>,
    {
        let result = Self::scan(path, apply)?;

        if result.was_truncated {
            warn!(
                path = %path.display(),
                valid_len = result.valid_len,
                last_lsn = result.last_lsn,
                "Truncating WAL to last valid entry"
            );
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(result.valid_len)?;
            file.sync_all()?;
        }

        Ok(result)
    }

    /// Verify integrity of a WAL file without modifying it
    pub fn verify(path: &Path) -> Result<RecoveryResult> {
        Self::scan(path, |_| Ok(()))
    }

    fn scan<F>(path: &Path, mut on_entry: F) -> Result<RecoveryResult>
    where
        F: FnMut(WalEntry) -> Result<()>,
    {
        let file_len = fs::metadata(path)?.len();
        let mut reader = WalReader::open(path)?;
        let mut result = RecoveryResult::default();

        while let Some(frame) = reader.next_frame()? {
            let offset = result.valid_len;
            match frame {
                Frame::Entry(entry, _) if entry.lsn > result.last_lsn => {
                    result.entries_recovered += 1;
                    result.last_lsn = entry.lsn;
                    result.valid_len = reader.position();
                    on_entry(entry)?;
                }
                Frame::Entry(entry, _) => {
                    warn!(offset, lsn = entry.lsn, last_lsn = result.last_lsn, "WAL entry out of sequence");
                    result.entries_corrupted += 1;
                    break;
                }
                Frame::Incomplete => {
                    warn!(offset, "WAL ends with a partial entry");
                    break;
                }
                Frame::Corrupt(reason) => {
                    warn!(offset, %reason, "Corrupted WAL entry");
                    result.entries_corrupted += 1;
                    break;
                }
            }
        }

        result.was_truncated = result.valid_len < file_len;

        Ok(result)
    }
}
