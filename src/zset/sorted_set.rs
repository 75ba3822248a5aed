//! SortedSet implementation
//!
//! Skip list + score map. All rank arguments are 1-based.

use std::collections::HashMap;

use bytes::Bytes;

use super::range::{resolve_rank_range, RangeOpts, ScoreRange};
use super::skiplist::{Entries, SkipList};
use super::Node;

/// A set of unique values ordered by score
#[derive(Debug, Clone)]
pub struct SortedSet {
    /// (score, value) order
    index: SkipList,
    /// value → current score
    scores: HashMap<Bytes, f64>,
}

impl SortedSet {
    /// Create a new empty SortedSet
    pub fn new() -> Self {
        Self {
            index: SkipList::new(),
            scores: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn contains(&self, value: &[u8]) -> bool {
        self.scores.contains_key(value)
    }

    /// Insert a value or move it to a new score
    ///
    /// Returns `true` if the value was not present before. NaN scores
    /// must be rejected by the caller.
    pub fn insert(&mut self, value: impl Into<Bytes>, score: f64) -> bool {
        debug_assert!(!score.is_nan(), "NaN score reached the sorted set");
        let value = value.into();
        // -0.0 and 0.0 share one position
        let score = if score == 0.0 { 0.0 } else { score };

        match self.scores.get(&value).copied() {
            Some(old) if old == score => false,
            Some(old) => {
                self.index.remove(old, &value);
                self.index.insert(score, value.clone());
                self.scores.insert(value, score);
                false
            }
            None => {
                self.index.insert(score, value.clone());
                self.scores.insert(value, score);
                true
            }
        }
    }

    /// Remove a value, returning its score
    pub fn remove(&mut self, value: &[u8]) -> Option<f64> {
        let score = self.scores.remove(value)?;
        self.index.remove(score, value);
        Some(score)
    }

    pub fn score(&self, value: &[u8]) -> Option<f64> {
        self.scores.get(value).copied()
    }

    /// Ascending rank, 1 = lowest score
    pub fn rank(&self, value: &[u8]) -> Option<usize> {
        let score = self.score(value)?;
        Some(self.index.count_le(score, value))
    }

    /// Descending rank, 1 = highest score
    pub fn rev_rank(&self, value: &[u8]) -> Option<usize> {
        self.rank(value).map(|rank| self.len() + 1 - rank)
    }

    pub fn peek_min(&self) -> Option<Node> {
        self.index.first().map(|slot| self.node_at(slot))
    }

    pub fn peek_max(&self) -> Option<Node> {
        self.index.last().map(|slot| self.node_at(slot))
    }

    pub fn pop_min(&mut self) -> Option<Node> {
        let node = self.peek_min()?;
        self.remove(&node.value);
        Some(node)
    }

    pub fn pop_max(&mut self) -> Option<Node> {
        let node = self.peek_max()?;
        self.remove(&node.value);
        Some(node)
    }

    /// Nodes with rank in `[start, end]`, ascending
    ///
    /// Negative ranks count from the tail (-1 is the highest score).
    pub fn range_by_rank(&self, start: i64, end: i64) -> Vec<Node> {
        match resolve_rank_range(start, end, self.len()) {
            Some((start, end)) => self.rank_window(start, end).map(to_node).collect(),
            None => Vec::new(),
        }
    }

    /// Nodes whose score lies in the range, ascending, capped by `opts.limit`
    pub fn range_by_score(&self, min: f64, max: f64, opts: &RangeOpts) -> Vec<Node> {
        let range = ScoreRange::from_opts(min, max, opts);
        self.score_window(&range).take(opts.take()).map(to_node).collect()
    }

    /// Number of nodes `range_by_score` would return
    pub fn count(&self, min: f64, max: f64, opts: &RangeOpts) -> usize {
        let range = ScoreRange::from_opts(min, max, opts);
        let (Some(first), Some(last)) = (
            self.index.first_in_range(&range),
            self.index.last_in_range(&range),
        ) else {
            return 0;
        };

        let count = self.index.rank_of(last) - self.index.rank_of(first) + 1;
        count.min(opts.take())
    }

    /// Remove every node with rank in `[start, end]`, returning them ascending
    pub fn remove_range_by_rank(&mut self, start: i64, end: i64) -> Vec<Node> {
        let Some((start, end)) = resolve_rank_range(start, end, self.len()) else {
            return Vec::new();
        };

        // Each removal shifts later ranks down by one, so the next victim
        // is always found at `start`.
        let mut removed = Vec::with_capacity(end - start + 1);
        for _ in start..=end {
            let Some(slot) = self.index.select(start) else {
                break;
            };
            let node = self.node_at(slot);
            self.remove(&node.value);
            removed.push(node);
        }
        removed
    }

    /// Ascending iterator over all nodes
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            entries: self
                .index
                .entries(self.index.first(), self.index.last(), self.index.len()),
        }
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn node_at(&self, slot: usize) -> Node {
        to_node(self.index.entry(slot))
    }

    fn rank_window(&self, start: usize, end: usize) -> Entries<'_> {
        let front = self.index.select(start);
        let back = self.index.select(end);
        self.index.entries(front, back, end - start + 1)
    }

    fn score_window(&self, range: &ScoreRange) -> Entries<'_> {
        match (self.index.first_in_range(range), self.index.last_in_range(range)) {
            (Some(first), Some(last)) => {
                let len = self.index.rank_of(last) - self.index.rank_of(first) + 1;
                self.index.entries(Some(first), Some(last), len)
            }
            _ => self.index.entries(None, None, 0),
        }
    }
}

impl Default for SortedSet {
    fn default() -> Self {
        Self::new()
    }
}

fn to_node((score, value): (f64, &Bytes)) -> Node {
    Node {
        score,
        value: value.clone(),
    }
}

/// Ascending iterator over the nodes of a [`SortedSet`]
///
/// Finite and double-ended; call [`SortedSet::iter`] again to restart.
#[derive(Clone)]
pub struct Iter<'a> {
    entries: Entries<'a>,
}

impl Iterator for Iter<'_> {
    type Item = Node;

    fn next(&mut self) -> Option<Node> {
        self.entries.next().map(to_node)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl DoubleEndedIterator for Iter<'_> {
    fn next_back(&mut self) -> Option<Node> {
        self.entries.next_back().map(to_node)
    }
}

impl ExactSizeIterator for Iter<'_> {}

impl<'a> IntoIterator for &'a SortedSet {
    type Item = Node;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Iter<'a> {
        self.iter()
    }
}
