//! WAL Writer
//!
//! Handles appending entries to the WAL file.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::config::WalSyncStrategy;
use crate::error::{QuillError, Result};

use super::{Operation, WalEntry, WalRecovery};

/// Writes entries to the WAL file
pub struct WalWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    /// LSN the next append will use
    next_lsn: u64,
    sync_strategy: WalSyncStrategy,
    /// Entries written since the last fsync
    uncommitted: usize,
    /// Set once a write or fsync fails; the file tail is then unknown
    failed: bool,
    /// Make the next fsync fail
    #[cfg(test)]
    pub(crate) fail_next_sync: bool,
}

impl WalWriter {
    /// Open or create a WAL file
    ///
    /// Scans an existing file to continue its LSN sequence. The file must
    /// not have a damaged tail; run [`WalRecovery::recover`] first.
    pub fn open(path: &Path, sync_strategy: WalSyncStrategy) -> Result<Self> {
        let last_lsn = if path.exists() {
            let scan = WalRecovery::verify(path)?;
            if scan.was_truncated {
                return Err(QuillError::WalCorruption(format!(
                    "{} has an invalid tail after LSN {}; recover it before appending",
                    path.display(),
                    scan.last_lsn
                )));
            }
            scan.last_lsn
        } else {
            0
        };

        Self::resume(path, sync_strategy, last_lsn)
    }

    /// Open a WAL whose last valid LSN is already known
    ///
    /// For files that recovery has just cut back to whole entries; the
    /// file is not scanned again.
    pub fn resume(path: &Path, sync_strategy: WalSyncStrategy, last_lsn: u64) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            next_lsn: last_lsn + 1,
            sync_strategy,
            uncommitted: 0,
            failed: false,
            #[cfg(test)]
            fail_next_sync: false,
        })
    }

    /// Append one transaction's operations as a single entry
    ///
    /// Returns the LSN assigned to the entry. [`QuillError::WalSync`] means
    /// the entry is in the file but the fsync due after it failed.
    pub fn append(&mut self, tx_id: u64, operations: Vec<Operation>) -> Result<u64> {
        if self.failed {
            return Err(QuillError::WalWrite(format!(
                "{} is unusable after a failed write or sync",
                self.path.display()
            )));
        }

        let lsn = self.next_lsn;
        let bytes = WalEntry::new(lsn, tx_id, operations).serialize()?;

        if let Err(e) = self.writer.write_all(&bytes).and_then(|_| self.writer.flush()) {
            self.failed = true;
            return Err(QuillError::WalWrite(e.to_string()));
        }

        self.next_lsn += 1;
        self.uncommitted += 1;

        let due = match self.sync_strategy {
            WalSyncStrategy::EveryWrite => true,
            WalSyncStrategy::EveryNEntries { count } => self.uncommitted >= count,
        };
        if due {
            self.sync().map_err(|e| QuillError::WalSync {
                lsn,
                reason: e.to_string(),
            })?;
        }

        Ok(lsn)
    }

    /// Force sync to disk
    ///
    /// A failure also stops further appends.
    pub fn sync(&mut self) -> Result<()> {
        if let Err(e) = self.sync_file() {
            // The kernel may have dropped the dirty pages
            self.failed = true;
            return Err(e.into());
        }
        self.uncommitted = 0;
        Ok(())
    }

    /// Get the LSN the next append will receive
    pub fn current_lsn(&self) -> u64 {
        self.next_lsn
    }

    /// Entries appended since the last fsync
    pub fn uncommitted_count(&self) -> usize {
        self.uncommitted
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sync_file(&mut self) -> io::Result<()> {
        #[cfg(test)]
        if std::mem::take(&mut self.fail_next_sync) {
            return Err(io::Error::new(io::ErrorKind::Other, "injected fsync failure"));
        }
        self.writer.flush()?;
        self.writer.get_ref().sync_data()
    }
}
