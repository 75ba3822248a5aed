//! Sorted Set Module
//!
//! The ordered-set core used by every sorted-set bucket.
//!
//! ## Responsibilities
//! - Keep members ordered by (score, value) with O(log n) insert/delete
//! - O(1) score lookup by value
//! - Rank and rank-window queries (1-based, negative ranks from the tail)
//! - Score-range queries with open/closed bounds and limits
//!
//! ## Data Structure Choice
//! An indexed skip list (spans on every link) paired with a
//! `HashMap<value, score>`:
//! - The map answers `score`/`contains` and finds the old position on update
//! - The skip list answers `rank`, `select` and range scans in O(log n + k)
//!
//! ```text
//!  L2  HEAD ──────────3────────────▶ c ──────────────1─────▶ ∅
//!  L1  HEAD ──1──▶ a ──────2───────▶ c ──1──▶ d ─────0─────▶ ∅
//!  L0  HEAD ──1──▶ a ──1──▶ b ──1──▶ c ──1──▶ d ─────0─────▶ ∅
//! ```

mod range;
mod skiplist;
mod sorted_set;

use bytes::Bytes;

pub use range::{normalize_rank, resolve_rank_range, RangeOpts, ScoreRange};
pub use sorted_set::{Iter, SortedSet};

/// A member as seen by callers: its score and value
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub score: f64,
    pub value: Bytes,
}

impl Node {
    pub fn new(score: f64, value: impl Into<Bytes>) -> Self {
        Self {
            score,
            value: value.into(),
        }
    }
}
