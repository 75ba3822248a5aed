//! Database state
//!
//! Buckets → keys → sorted sets. The open write transaction mutates this
//! in place; each successful mutation pushes an [`Undo`] record so the
//! transaction can put everything back if it does not commit.
//!
//! Every mutation is reachable through [`State::apply`], which is how WAL
//! entries are replayed on open; transactions call the same methods.

use std::collections::{BTreeMap, HashMap};

use bytes::Bytes;

use crate::bucket::{matches_pattern, BucketIter, DataStructure};
use crate::error::{QuillError, Result};
use crate::wal::Operation;
use crate::zset::{normalize_rank, Node, SortedSet};

/// Keys of one bucket
#[derive(Debug)]
pub struct Bucket {
    kind: DataStructure,
    sets: HashMap<Bytes, SortedSet>,
}

impl Bucket {
    fn new(kind: DataStructure) -> Self {
        Self {
            kind,
            sets: HashMap::new(),
        }
    }

    pub fn kind(&self) -> DataStructure {
        self.kind
    }

    pub fn get(&self, key: &[u8]) -> Option<&SortedSet> {
        self.sets.get(key)
    }

    /// Run `f` on the set under `key`, dropping the key if `f` empties it
    fn update<T>(&mut self, key: &[u8], f: impl FnOnce(&mut SortedSet) -> T) -> Option<T> {
        let set = self.sets.get_mut(key)?;
        let out = f(set);
        if set.is_empty() {
            self.sets.remove(key);
        }
        Some(out)
    }
}

/// Inverse of one applied mutation
#[derive(Debug)]
pub enum Undo {
    /// Forget a bucket the transaction declared
    DropBucket(String),

    /// Bring back a deleted bucket with everything it held
    RestoreBucket(String, Bucket),

    /// Take out a member the transaction added
    Remove {
        bucket: String,
        key: Bytes,
        value: Bytes,
    },

    /// Put members back at the scores they had
    Reinsert {
        bucket: String,
        key: Bytes,
        nodes: Vec<Node>,
    },
}

/// Everything a transaction can see
#[derive(Debug, Default)]
pub struct State {
    buckets: BTreeMap<String, Bucket>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    // =========================================================================
    // Buckets
    // =========================================================================

    pub fn bucket_exists(&self, kind: DataStructure, name: &str) -> bool {
        self.buckets
            .get(name)
            .is_some_and(|bucket| bucket.kind == kind)
    }

    pub fn new_bucket(&mut self, kind: DataStructure, name: &str, undo: &mut Vec<Undo>) -> Result<()> {
        if self.buckets.contains_key(name) {
            return Err(QuillError::BucketAlreadyExists(name.to_string()));
        }
        self.buckets.insert(name.to_string(), Bucket::new(kind));
        undo.push(Undo::DropBucket(name.to_string()));
        Ok(())
    }

    pub fn delete_bucket(&mut self, kind: DataStructure, name: &str, undo: &mut Vec<Undo>) -> Result<()> {
        if !self.bucket_exists(kind, name) {
            return Err(QuillError::BucketNotFound(name.to_string()));
        }
        if let Some(bucket) = self.buckets.remove(name) {
            undo.push(Undo::RestoreBucket(name.to_string(), bucket));
        }
        Ok(())
    }

    pub fn buckets(&self, kind: DataStructure, pattern: &str) -> BucketIter<'_> {
        BucketIter::new(self.buckets.iter(), kind, pattern)
    }

    /// Sorted-set bucket by name
    pub fn bucket(&self, name: &str) -> Result<&Bucket> {
        match self.buckets.get(name) {
            Some(bucket) if bucket.kind == DataStructure::SortedSet => Ok(bucket),
            _ => Err(QuillError::BucketNotFound(name.to_string())),
        }
    }

    fn bucket_mut(&mut self, name: &str) -> Result<&mut Bucket> {
        match self.buckets.get_mut(name) {
            Some(bucket) if bucket.kind == DataStructure::SortedSet => Ok(bucket),
            _ => Err(QuillError::BucketNotFound(name.to_string())),
        }
    }

    // =========================================================================
    // Sorted Set Reads
    // =========================================================================

    /// The set under `key`; `KeyNotFound` if the key holds nothing
    pub fn sorted_set(&self, bucket: &str, key: &[u8]) -> Result<&SortedSet> {
        self.bucket(bucket)?.get(key).ok_or(QuillError::KeyNotFound)
    }

    /// Keys of a bucket whose (lossy UTF-8) form matches `pattern`, sorted
    pub fn keys(&self, bucket: &str, pattern: &str) -> Result<Vec<Bytes>> {
        let mut keys: Vec<Bytes> = self
            .bucket(bucket)?
            .sets
            .keys()
            .filter(|key| matches_pattern(pattern, &String::from_utf8_lossy(key)))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    // =========================================================================
    // Sorted Set Mutations
    // =========================================================================

    /// Add `value` with `score`, creating the set on first use
    ///
    /// Returns `true` when the value is new to the set.
    pub fn zadd(
        &mut self,
        bucket: &str,
        key: &Bytes,
        score: f64,
        value: Bytes,
        undo: &mut Vec<Undo>,
    ) -> Result<bool> {
        if score.is_nan() {
            return Err(QuillError::InvalidScore);
        }
        let set = self.bucket_mut(bucket)?.sets.entry(key.clone()).or_default();

        let previous = set.score(&value);
        let added = set.insert(value.clone(), score);

        undo.push(match previous {
            Some(old) => Undo::Reinsert {
                bucket: bucket.to_string(),
                key: key.clone(),
                nodes: vec![Node::new(old, value)],
            },
            None => Undo::Remove {
                bucket: bucket.to_string(),
                key: key.clone(),
                value,
            },
        });
        Ok(added)
    }

    /// Remove `value`; absent keys and members are not an error
    pub fn zrem(&mut self, bucket: &str, key: &[u8], value: &[u8], undo: &mut Vec<Undo>) -> Result<bool> {
        let removed = self
            .bucket_mut(bucket)?
            .update(key, |set| set.remove(value))
            .flatten();

        let Some(score) = removed else {
            return Ok(false);
        };
        undo.push(Undo::Reinsert {
            bucket: bucket.to_string(),
            key: Bytes::copy_from_slice(key),
            nodes: vec![Node::new(score, Bytes::copy_from_slice(value))],
        });
        Ok(true)
    }

    pub fn zpop_max(&mut self, bucket: &str, key: &[u8], undo: &mut Vec<Undo>) -> Result<Node> {
        self.pop(bucket, key, SortedSet::pop_max, undo)
    }

    pub fn zpop_min(&mut self, bucket: &str, key: &[u8], undo: &mut Vec<Undo>) -> Result<Node> {
        self.pop(bucket, key, SortedSet::pop_min, undo)
    }

    /// Remove ranks `start..=end` (negative = from tail), returning the count
    pub fn zrem_range_by_rank(
        &mut self,
        bucket: &str,
        key: &[u8],
        start: i64,
        end: i64,
        undo: &mut Vec<Undo>,
    ) -> Result<usize> {
        let target = self.bucket_mut(bucket)?;
        let Some(len) = target.get(key).map(SortedSet::len) else {
            return Ok(0);
        };

        let (first, last) = (normalize_rank(start, len), normalize_rank(end, len));
        if first > last {
            return Err(QuillError::InvalidRange(format!(
                "start rank {start} resolves after end rank {end} ({first} > {last})"
            )));
        }

        let nodes = target
            .update(key, |set| set.remove_range_by_rank(start, end))
            .unwrap_or_default();
        let removed = nodes.len();
        if removed > 0 {
            undo.push(Undo::Reinsert {
                bucket: bucket.to_string(),
                key: Bytes::copy_from_slice(key),
                nodes,
            });
        }
        Ok(removed)
    }

    fn pop(
        &mut self,
        bucket: &str,
        key: &[u8],
        take: fn(&mut SortedSet) -> Option<Node>,
        undo: &mut Vec<Undo>,
    ) -> Result<Node> {
        let node = self
            .bucket_mut(bucket)?
            .update(key, take)
            .flatten()
            .ok_or(QuillError::KeyNotFound)?;
        undo.push(Undo::Reinsert {
            bucket: bucket.to_string(),
            key: Bytes::copy_from_slice(key),
            nodes: vec![node.clone()],
        });
        Ok(node)
    }

    // =========================================================================
    // Undo and Replay
    // =========================================================================

    /// Reverse one mutation
    ///
    /// Records must be reverted newest first; each one then finds the
    /// state exactly as its mutation left it.
    pub fn revert(&mut self, record: Undo) {
        match record {
            Undo::DropBucket(name) => {
                self.buckets.remove(&name);
            }
            Undo::RestoreBucket(name, bucket) => {
                self.buckets.insert(name, bucket);
            }
            Undo::Remove { bucket, key, value } => {
                if let Some(bucket) = self.buckets.get_mut(&bucket) {
                    bucket.update(&key, |set| set.remove(&value));
                }
            }
            Undo::Reinsert { bucket, key, nodes } => {
                if let Some(bucket) = self.buckets.get_mut(&bucket) {
                    let set = bucket.sets.entry(key).or_default();
                    for node in nodes {
                        set.insert(node.value, node.score);
                    }
                }
            }
        }
    }

    /// Apply one logged mutation
    pub fn apply(&mut self, operation: &Operation) -> Result<()> {
        let undo = &mut Vec::new();
        match operation {
            Operation::NewBucket { kind, name } => self.new_bucket(*kind, name, undo),
            Operation::DeleteBucket { kind, name } => self.delete_bucket(*kind, name, undo),
            Operation::ZAdd {
                bucket,
                key,
                score,
                value,
            } => self.zadd(bucket, key, *score, value.clone(), undo).map(drop),
            Operation::ZRem { bucket, key, value } => self.zrem(bucket, key, value, undo).map(drop),
            Operation::ZPopMax { bucket, key } => self.zpop_max(bucket, key, undo).map(drop),
            Operation::ZPopMin { bucket, key } => self.zpop_min(bucket, key, undo).map(drop),
            Operation::ZRemRangeByRank {
                bucket,
                key,
                start,
                end,
            } => self
                .zrem_range_by_rank(bucket, key, *start, *end, undo)
                .map(drop),
        }
    }
}
