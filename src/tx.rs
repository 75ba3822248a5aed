//! Transactions
//!
//! A [`Tx`] is either read-only or writable.
//!
//! - **Read**: holds a shared lock on the committed state; sees exactly
//!   that state until it ends, since no writer can run meanwhile.
//! - **Write**: holds the exclusive lock and mutates the state in place.
//!   Each successful mutation is recorded twice: as an [`Operation`] for
//!   the WAL and as an [`Undo`] record. `commit` logs the operations;
//!   `rollback` (or drop, or a failed commit) replays the undo records
//!   newest first.

use bytes::Bytes;
use parking_lot::{RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use crate::bucket::{BucketIter, DataStructure};
use crate::db::Db;
use crate::error::{QuillError, Result};
use crate::state::{State, Undo};
use crate::wal::Operation;
use crate::zset::{Node, RangeOpts, SortedSet};

enum TxInner<'db> {
    Read {
        state: RwLockReadGuard<'db, State>,
    },
    Write {
        state: RwLockWriteGuard<'db, State>,
        log: Vec<Operation>,
        undo: Vec<Undo>,
    },
}

/// A transaction over a [`Db`]
pub struct Tx<'db> {
    db: &'db Db,
    id: u64,
    inner: TxInner<'db>,
}

impl<'db> Tx<'db> {
    pub(crate) fn read(db: &'db Db, id: u64, state: RwLockReadGuard<'db, State>) -> Self {
        Self {
            db,
            id,
            inner: TxInner::Read { state },
        }
    }

    pub(crate) fn write(db: &'db Db, id: u64, state: RwLockWriteGuard<'db, State>) -> Self {
        Self {
            db,
            id,
            inner: TxInner::Write {
                state,
                log: Vec::new(),
                undo: Vec::new(),
            },
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_writable(&self) -> bool {
        matches!(self.inner, TxInner::Write { .. })
    }

    /// Make the transaction's mutations durable and visible
    ///
    /// On error the mutations are undone, except after
    /// [`QuillError::WalSync`]: the entry is already in the log, so the
    /// changes stay.
    pub fn commit(mut self) -> Result<()> {
        let TxInner::Write { log, undo, .. } = &mut self.inner else {
            return Ok(());
        };
        if log.is_empty() {
            debug!(tx_id = self.id, "Write transaction committed with no changes");
            return Ok(());
        }

        match self.db.log_commit(self.id, std::mem::take(log)) {
            Ok(()) => {
                undo.clear();
                Ok(())
            }
            Err(e @ QuillError::WalSync { .. }) => {
                undo.clear();
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Discard the transaction's mutations
    pub fn rollback(mut self) {
        self.revert();
    }

    // =========================================================================
    // Buckets
    // =========================================================================

    /// Declare a bucket
    pub fn new_bucket(&mut self, kind: DataStructure, name: &str) -> Result<()> {
        let (state, log, undo) = self.write_parts()?;
        state.new_bucket(kind, name, undo)?;
        log.push(Operation::NewBucket {
            kind,
            name: name.to_string(),
        });
        Ok(())
    }

    /// Delete a bucket and all of its keys
    pub fn delete_bucket(&mut self, kind: DataStructure, name: &str) -> Result<()> {
        let (state, log, undo) = self.write_parts()?;
        state.delete_bucket(kind, name, undo)?;
        log.push(Operation::DeleteBucket {
            kind,
            name: name.to_string(),
        });
        Ok(())
    }

    pub fn bucket_exists(&self, kind: DataStructure, name: &str) -> bool {
        self.state().bucket_exists(kind, name)
    }

    /// Names of `kind` buckets matching the glob `pattern`, ascending
    pub fn iterate_buckets(&self, kind: DataStructure, pattern: &str) -> BucketIter<'_> {
        self.state().buckets(kind, pattern)
    }

    // =========================================================================
    // Sorted Set Mutations
    // =========================================================================

    /// Add `value` with `score`, or move an existing `value` to `score`
    ///
    /// Returns `true` when the value was not in the set before.
    pub fn zadd(&mut self, bucket: &str, key: &[u8], score: f64, value: &[u8]) -> Result<bool> {
        let key = Bytes::copy_from_slice(key);
        let value = Bytes::copy_from_slice(value);

        let (state, log, undo) = self.write_parts()?;
        let added = state.zadd(bucket, &key, score, value.clone(), undo)?;
        log.push(Operation::ZAdd {
            bucket: bucket.to_string(),
            key,
            score,
            value,
        });
        Ok(added)
    }

    /// Remove `value`; returns `false` without error when it is absent
    pub fn zrem(&mut self, bucket: &str, key: &[u8], value: &[u8]) -> Result<bool> {
        let (state, log, undo) = self.write_parts()?;
        let removed = state.zrem(bucket, key, value, undo)?;
        if removed {
            log.push(Operation::ZRem {
                bucket: bucket.to_string(),
                key: Bytes::copy_from_slice(key),
                value: Bytes::copy_from_slice(value),
            });
        }
        Ok(removed)
    }

    /// Remove and return the highest-scored member
    pub fn zpop_max(&mut self, bucket: &str, key: &[u8]) -> Result<Node> {
        let (state, log, undo) = self.write_parts()?;
        let node = state.zpop_max(bucket, key, undo)?;
        log.push(Operation::ZPopMax {
            bucket: bucket.to_string(),
            key: Bytes::copy_from_slice(key),
        });
        Ok(node)
    }

    /// Remove and return the lowest-scored member
    pub fn zpop_min(&mut self, bucket: &str, key: &[u8]) -> Result<Node> {
        let (state, log, undo) = self.write_parts()?;
        let node = state.zpop_min(bucket, key, undo)?;
        log.push(Operation::ZPopMin {
            bucket: bucket.to_string(),
            key: Bytes::copy_from_slice(key),
        });
        Ok(node)
    }

    /// Remove members with rank in `[start, end]`, returning how many
    ///
    /// Ranks are 1-based; -1 is the last member. A missing key removes
    /// nothing; a start that resolves after the end is `InvalidRange`.
    pub fn zrem_range_by_rank(&mut self, bucket: &str, key: &[u8], start: i64, end: i64) -> Result<usize> {
        let (state, log, undo) = self.write_parts()?;
        let removed = state.zrem_range_by_rank(bucket, key, start, end, undo)?;
        if removed > 0 {
            log.push(Operation::ZRemRangeByRank {
                bucket: bucket.to_string(),
                key: Bytes::copy_from_slice(key),
                start,
                end,
            });
        }
        Ok(removed)
    }

    // =========================================================================
    // Sorted Set Reads
    // =========================================================================

    /// Number of members; 0 when the key holds nothing
    pub fn zcard(&self, bucket: &str, key: &[u8]) -> Result<usize> {
        Ok(self
            .state()
            .bucket(bucket)?
            .get(key)
            .map_or(0, SortedSet::len))
    }

    /// Number of members with score between `min` and `max`
    pub fn zcount(&self, bucket: &str, key: &[u8], min: f64, max: f64, opts: RangeOpts) -> Result<usize> {
        check_score_bounds(min, max)?;
        Ok(self.sorted_set(bucket, key)?.count(min, max, &opts))
    }

    pub fn zscore(&self, bucket: &str, key: &[u8], value: &[u8]) -> Result<f64> {
        self.sorted_set(bucket, key)?
            .score(value)
            .ok_or(QuillError::MemberNotFound)
    }

    /// Every member with its score; callers must not rely on the order
    pub fn zmembers(&self, bucket: &str, key: &[u8]) -> Result<Vec<Node>> {
        Ok(self.sorted_set(bucket, key)?.iter().collect())
    }

    pub fn zpeek_max(&self, bucket: &str, key: &[u8]) -> Result<Node> {
        self.sorted_set(bucket, key)?
            .peek_max()
            .ok_or(QuillError::KeyNotFound)
    }

    pub fn zpeek_min(&self, bucket: &str, key: &[u8]) -> Result<Node> {
        self.sorted_set(bucket, key)?
            .peek_min()
            .ok_or(QuillError::KeyNotFound)
    }

    /// Members with rank in `[start, end]` in ascending order
    ///
    /// Ranks are 1-based; negative ranks count from the tail.
    pub fn zrange_by_rank(&self, bucket: &str, key: &[u8], start: i64, end: i64) -> Result<Vec<Node>> {
        Ok(self.sorted_set(bucket, key)?.range_by_rank(start, end))
    }

    /// Members with score between `min` and `max` in ascending order
    pub fn zrange_by_score(
        &self,
        bucket: &str,
        key: &[u8],
        min: f64,
        max: f64,
        opts: RangeOpts,
    ) -> Result<Vec<Node>> {
        check_score_bounds(min, max)?;
        Ok(self.sorted_set(bucket, key)?.range_by_score(min, max, &opts))
    }

    /// Ascending rank of `value` (1 = lowest score)
    pub fn zrank(&self, bucket: &str, key: &[u8], value: &[u8]) -> Result<usize> {
        self.sorted_set(bucket, key)?
            .rank(value)
            .ok_or(QuillError::MemberNotFound)
    }

    /// Descending rank of `value` (1 = highest score)
    pub fn zrev_rank(&self, bucket: &str, key: &[u8], value: &[u8]) -> Result<usize> {
        self.sorted_set(bucket, key)?
            .rev_rank(value)
            .ok_or(QuillError::MemberNotFound)
    }

    /// Keys of `bucket` matching the glob `pattern`, sorted
    pub fn zkeys(&self, bucket: &str, pattern: &str) -> Result<Vec<Bytes>> {
        self.state().keys(bucket, pattern)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn state(&self) -> &State {
        match &self.inner {
            TxInner::Read { state } => &**state,
            TxInner::Write { state, .. } => &**state,
        }
    }

    fn sorted_set(&self, bucket: &str, key: &[u8]) -> Result<&SortedSet> {
        self.state().sorted_set(bucket, key)
    }

    fn write_parts(&mut self) -> Result<(&mut State, &mut Vec<Operation>, &mut Vec<Undo>)> {
        match &mut self.inner {
            TxInner::Read { .. } => Err(QuillError::TxNotWritable),
            TxInner::Write { state, log, undo } => Ok((&mut **state, log, undo)),
        }
    }

    /// Undo every mutation not yet made durable
    fn revert(&mut self) {
        let TxInner::Write { state, undo, .. } = &mut self.inner else {
            return;
        };
        if undo.is_empty() {
            return;
        }

        let reverted = undo.len();
        while let Some(record) = undo.pop() {
            state.revert(record);
        }
        debug!(tx_id = self.id, reverted, "Write transaction rolled back");
    }
}

impl Drop for Tx<'_> {
    fn drop(&mut self) {
        self.revert();
    }
}

fn check_score_bounds(min: f64, max: f64) -> Result<()> {
    if min.is_nan() || max.is_nan() {
        return Err(QuillError::InvalidRange("score bounds must not be NaN".to_string()));
    }
    if min > max {
        return Err(QuillError::InvalidRange(format!(
            "min score {min} is greater than max score {max}"
        )));
    }
    Ok(())
}
