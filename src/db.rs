//! Database Module
//!
//! The database handle that coordinates state, transactions and the WAL.
//!
//! ## Responsibilities
//! - Replay the WAL into the in-memory state on open
//! - Hand out read and write transactions
//! - Log committed write transactions
//! - Sync the WAL on close

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{QuillError, Result};
use crate::state::State;
use crate::tx::Tx;
use crate::wal::{Operation, RecoveryResult, WalRecovery, WalWriter};

/// An open QuillKV database
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Writes**: a write transaction holds `state` exclusively from
///   `begin` until it commits or rolls back, and mutates it in place
///   - commit order: WAL append → release the lock
///   - rollback: undo records restore the state before the lock is released
///
/// - **Reads**: a read transaction holds `state` shared for its lifetime
///   - any number of readers run together
///   - a reader never sees a half-applied write transaction
///
/// Share a `Db` between threads with `Arc<Db>`. A thread that holds any
/// transaction must not begin a write transaction, and a thread holding a
/// write transaction must not begin any other.
pub struct Db {
    /// Database configuration
    config: Config,

    /// Path of the mutation log
    wal_path: PathBuf,

    /// Committed state; write-locked by the open write transaction
    state: RwLock<State>,

    /// Write-ahead log (exclusive access needed)
    wal: Mutex<WalWriter>,

    /// Next transaction id
    next_tx_id: AtomicU64,
}

impl Db {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const WAL_FILENAME: &'static str = "wal.log";

    /// Open or create a database with the given config
    ///
    /// On startup:
    /// 1. Open/create data directory
    /// 2. Stream the WAL into memory, one transaction at a time
    /// 3. Cut off any damaged tail
    /// 4. Ready to serve transactions
    pub fn open(config: Config) -> Result<Self> {
        // Step 1: Data directory
        if !config.data_dir.exists() {
            if !config.create_if_missing {
                return Err(QuillError::Config(format!(
                    "data directory {} does not exist",
                    config.data_dir.display()
                )));
            }
            fs::create_dir_all(&config.data_dir)?;
        }

        let wal_path = config.data_dir.join(Self::WAL_FILENAME);

        // Step 2 + 3: Replay and recover
        let mut state = State::new();
        let mut last_tx_id = 0;

        let recovery = if wal_path.exists() {
            WalRecovery::replay(&wal_path, |entry| {
                for operation in &entry.operations {
                    state.apply(operation).map_err(|e| {
                        QuillError::WalCorruption(format!(
                            "replaying {} from LSN {} failed: {}",
                            operation.name(),
                            entry.lsn,
                            e
                        ))
                    })?;
                }
                last_tx_id = last_tx_id.max(entry.tx_id);
                Ok(())
            })?
        } else {
            RecoveryResult::default()
        };

        if recovery.entries_recovered > 0 || recovery.entries_corrupted > 0 {
            info!(
                recovered = recovery.entries_recovered,
                corrupted = recovery.entries_corrupted,
                last_lsn = recovery.last_lsn,
                "WAL recovery complete"
            );
        }
        if recovery.was_truncated {
            warn!(valid_len = recovery.valid_len, "WAL tail discarded during recovery");
        }

        let wal = WalWriter::resume(&wal_path, config.wal_sync_strategy, recovery.last_lsn)?;

        info!(
            data_dir = %config.data_dir.display(),
            buckets = state.bucket_count(),
            next_lsn = wal.current_lsn(),
            "Database opened"
        );

        Ok(Self {
            config,
            wal_path,
            state: RwLock::new(state),
            wal: Mutex::new(wal),
            next_tx_id: AtomicU64::new(last_tx_id + 1),
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        let config = Config::builder().data_dir(path.as_ref()).build();
        Self::open(config)
    }

    /// Start a transaction
    ///
    /// A writable transaction waits until every open transaction has
    /// ended. A read transaction waits only for an open write transaction.
    pub fn begin(&self, writable: bool) -> Tx<'_> {
        if writable {
            let state = self.state.write();
            let id = self.next_tx_id.fetch_add(1, Ordering::SeqCst);
            Tx::write(self, id, state)
        } else {
            let state = self.state.read_recursive();
            let id = self.next_tx_id.fetch_add(1, Ordering::SeqCst);
            Tx::read(self, id, state)
        }
    }

    /// Run `f` in a write transaction
    ///
    /// Commits when `f` returns `Ok`, rolls back when it returns `Err`.
    pub fn update<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Tx<'_>) -> Result<T>,
    {
        let mut tx = self.begin(true);
        match f(&mut tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                tx.rollback();
                Err(e)
            }
        }
    }

    /// Run `f` in a read transaction
    pub fn view<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Tx<'_>) -> Result<T>,
    {
        let mut tx = self.begin(false);
        let result = f(&mut tx);
        tx.rollback();
        result
    }

    /// Append a write transaction's operations to the WAL
    ///
    /// Called by `Tx::commit` while the transaction still holds the state.
    pub(crate) fn log_commit(&self, tx_id: u64, operations: Vec<Operation>) -> Result<()> {
        let count = operations.len();
        match self.wal.lock().append(tx_id, operations) {
            Ok(lsn) => {
                debug!(tx_id, lsn, operations = count, "Write transaction committed");
                Ok(())
            }
            Err(e @ QuillError::WalSync { .. }) => {
                warn!(tx_id, error = %e, "Committed entry is not synced; WAL closed for writes");
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Force the WAL to disk
    pub fn sync(&self) -> Result<()> {
        self.wal.lock().sync()
    }

    /// Close the database gracefully
    ///
    /// Syncs the WAL so every committed transaction is on disk
    pub fn close(self) -> Result<()> {
        self.wal.lock().sync()?;
        info!(data_dir = %self.config.data_dir.display(), "Database closed");
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Get the WAL file path
    pub fn wal_path(&self) -> &Path {
        &self.wal_path
    }

    /// LSN the next committed write transaction will receive
    pub fn current_lsn(&self) -> u64 {
        self.wal.lock().current_lsn()
    }

    /// Number of committed buckets
    pub fn bucket_count(&self) -> usize {
        self.state.read_recursive().bucket_count()
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}
