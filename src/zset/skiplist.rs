//! Indexed skip list
//!
//! Arena-backed skip list ordered by (score, value). Every forward link
//! stores its span, the number of level-0 hops it covers, so that the
//! 1-based rank of an entry is the sum of the spans along the search path.
//!
//! A link whose `forward` is `None` has a span equal to the number of
//! entries after its owner.

use std::cmp::Ordering;

use bytes::Bytes;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use super::range::ScoreRange;

/// Maximum tower height
pub(crate) const MAX_LEVEL: usize = 32;

/// Chance that a node is promoted one more level
const PROMOTE_PROBABILITY: f64 = 0.25;

/// Arena slot of the header node
const HEAD: usize = 0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Link {
    forward: Option<usize>,
    span: usize,
}

#[derive(Debug, Clone)]
struct SkipNode {
    score: f64,
    value: Bytes,
    backward: Option<usize>,
    levels: Vec<Link>,
}

/// Total order used by the index: score first, value bytes on ties
pub(crate) fn compare(a_score: f64, a_value: &[u8], b_score: f64, b_value: &[u8]) -> Ordering {
    a_score
        .total_cmp(&b_score)
        .then_with(|| a_value.cmp(b_value))
}

/// Ordered index over (score, value) pairs
///
/// The caller guarantees that a value is inserted at most once; the
/// score index in [`super::SortedSet`] enforces this.
#[derive(Debug, Clone)]
pub(crate) struct SkipList {
    /// Node arena; slot 0 is the header, released slots are recycled
    nodes: Vec<SkipNode>,
    free: Vec<usize>,
    /// Current number of levels in use (>= 1)
    level: usize,
    len: usize,
    tail: Option<usize>,
    rng: SmallRng,
}

impl SkipList {
    pub(crate) fn new() -> Self {
        Self::with_rng(SmallRng::from_entropy())
    }

    fn with_rng(rng: SmallRng) -> Self {
        let header = SkipNode {
            score: 0.0,
            value: Bytes::new(),
            backward: None,
            levels: vec![Link::default(); MAX_LEVEL],
        };

        Self {
            nodes: vec![header],
            free: Vec::new(),
            level: 1,
            len: 0,
            tail: None,
            rng,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Slot of the lowest entry
    pub(crate) fn first(&self) -> Option<usize> {
        self.nodes[HEAD].levels[0].forward
    }

    /// Slot of the highest entry
    pub(crate) fn last(&self) -> Option<usize> {
        self.tail
    }

    pub(crate) fn entry(&self, slot: usize) -> (f64, &Bytes) {
        let node = &self.nodes[slot];
        (node.score, &node.value)
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Insert a (score, value) pair, returning its slot
    pub(crate) fn insert(&mut self, score: f64, value: Bytes) -> usize {
        let mut update = [HEAD; MAX_LEVEL];
        let mut rank = [0usize; MAX_LEVEL];
        let mut x = HEAD;

        for i in (0..self.level).rev() {
            rank[i] = if i + 1 == self.level { 0 } else { rank[i + 1] };
            while let Some(next) = self.nodes[x].levels[i].forward {
                if !self.precedes(next, score, &value) {
                    break;
                }
                rank[i] += self.nodes[x].levels[i].span;
                x = next;
            }
            update[i] = x;
        }

        let level = self.random_level();
        if level > self.level {
            for i in self.level..level {
                rank[i] = 0;
                update[i] = HEAD;
                self.nodes[HEAD].levels[i].span = self.len;
            }
            self.level = level;
        }

        let slot = self.alloc(score, value, level);

        for i in 0..level {
            let prev = update[i];
            let link = self.nodes[prev].levels[i];
            let covered = rank[0] - rank[i];

            self.nodes[slot].levels[i] = Link {
                forward: link.forward,
                span: link.span - covered,
            };
            self.nodes[prev].levels[i] = Link {
                forward: Some(slot),
                span: covered + 1,
            };
        }

        // Untouched upper levels now skip over one more entry
        for i in level..self.level {
            self.nodes[update[i]].levels[i].span += 1;
        }

        self.nodes[slot].backward = (update[0] != HEAD).then_some(update[0]);
        match self.nodes[slot].levels[0].forward {
            Some(next) => self.nodes[next].backward = Some(slot),
            None => self.tail = Some(slot),
        }

        self.len += 1;
        slot
    }

    /// Remove the entry equal to (score, value); false if absent
    pub(crate) fn remove(&mut self, score: f64, value: &[u8]) -> bool {
        let mut update = [HEAD; MAX_LEVEL];
        let mut x = HEAD;

        for i in (0..self.level).rev() {
            while let Some(next) = self.nodes[x].levels[i].forward {
                if !self.precedes(next, score, value) {
                    break;
                }
                x = next;
            }
            update[i] = x;
        }

        let candidate = self.nodes[x].levels[0].forward;
        match candidate {
            Some(target) if self.is_entry(target, score, value) => {
                self.unlink(target, &update);
                true
            }
            _ => false,
        }
    }

    fn unlink(&mut self, slot: usize, update: &[usize; MAX_LEVEL]) {
        for i in 0..self.level {
            let prev = update[i];
            if self.nodes[prev].levels[i].forward == Some(slot) {
                let removed = self.nodes[slot].levels[i];
                let link = &mut self.nodes[prev].levels[i];
                link.span = link.span + removed.span - 1;
                link.forward = removed.forward;
            } else {
                self.nodes[prev].levels[i].span -= 1;
            }
        }

        let backward = self.nodes[slot].backward;
        match self.nodes[slot].levels[0].forward {
            Some(next) => self.nodes[next].backward = backward,
            None => self.tail = backward,
        }

        while self.level > 1 && self.nodes[HEAD].levels[self.level - 1].forward.is_none() {
            self.level -= 1;
        }

        self.len -= 1;
        self.release(slot);
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Number of entries ordered at or before (score, value)
    ///
    /// For a present entry this is its 1-based rank.
    pub(crate) fn count_le(&self, score: f64, value: &[u8]) -> usize {
        let mut rank = 0;
        let mut x = HEAD;

        for i in (0..self.level).rev() {
            while let Some(next) = self.nodes[x].levels[i].forward {
                let node = &self.nodes[next];
                if compare(node.score, &node.value, score, value) == Ordering::Greater {
                    break;
                }
                rank += self.nodes[x].levels[i].span;
                x = next;
            }
        }

        rank
    }

    /// 1-based rank of the entry stored in `slot`
    pub(crate) fn rank_of(&self, slot: usize) -> usize {
        let node = &self.nodes[slot];
        self.count_le(node.score, &node.value)
    }

    /// Slot holding the entry at 1-based `rank`
    pub(crate) fn select(&self, rank: usize) -> Option<usize> {
        if rank == 0 || rank > self.len {
            return None;
        }

        let mut traversed = 0;
        let mut x = HEAD;

        for i in (0..self.level).rev() {
            while let Some(next) = self.nodes[x].levels[i].forward {
                let span = self.nodes[x].levels[i].span;
                if traversed + span > rank {
                    break;
                }
                traversed += span;
                x = next;
            }
            if traversed == rank {
                return Some(x);
            }
        }

        None
    }

    /// Lowest entry whose score falls inside `range`
    pub(crate) fn first_in_range(&self, range: &ScoreRange) -> Option<usize> {
        if range.is_empty() {
            return None;
        }

        let mut x = HEAD;
        for i in (0..self.level).rev() {
            while let Some(next) = self.nodes[x].levels[i].forward {
                if range.gte_min(self.nodes[next].score) {
                    break;
                }
                x = next;
            }
        }

        let first = self.nodes[x].levels[0].forward?;
        range.lte_max(self.nodes[first].score).then_some(first)
    }

    /// Highest entry whose score falls inside `range`
    pub(crate) fn last_in_range(&self, range: &ScoreRange) -> Option<usize> {
        if range.is_empty() {
            return None;
        }

        let mut x = HEAD;
        for i in (0..self.level).rev() {
            while let Some(next) = self.nodes[x].levels[i].forward {
                if !range.lte_max(self.nodes[next].score) {
                    break;
                }
                x = next;
            }
        }

        if x == HEAD {
            return None;
        }
        range.gte_min(self.nodes[x].score).then_some(x)
    }

    /// Walk entries from `front` to `back` inclusive, `len` entries in total
    pub(crate) fn entries(&self, front: Option<usize>, back: Option<usize>, len: usize) -> Entries<'_> {
        Entries {
            list: self,
            front,
            back,
            remaining: len,
        }
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn random_level(&mut self) -> usize {
        let mut level = 1;
        while level < MAX_LEVEL && self.rng.gen::<f64>() < PROMOTE_PROBABILITY {
            level += 1;
        }
        level
    }

    fn alloc(&mut self, score: f64, value: Bytes, level: usize) -> usize {
        let node = SkipNode {
            score,
            value,
            backward: None,
            levels: vec![Link::default(); level],
        };

        match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = node;
                slot
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn release(&mut self, slot: usize) {
        let node = &mut self.nodes[slot];
        node.value = Bytes::new();
        node.levels = Vec::new();
        node.backward = None;
        self.free.push(slot);
    }

    /// True when the entry in `slot` sorts strictly before (score, value)
    fn precedes(&self, slot: usize, score: f64, value: &[u8]) -> bool {
        let node = &self.nodes[slot];
        compare(node.score, &node.value, score, value) == Ordering::Less
    }

    fn is_entry(&self, slot: usize, score: f64, value: &[u8]) -> bool {
        let node = &self.nodes[slot];
        compare(node.score, &node.value, score, value) == Ordering::Equal
    }
}

/// Double-ended walk over a contiguous run of entries
#[derive(Clone)]
pub(crate) struct Entries<'a> {
    list: &'a SkipList,
    front: Option<usize>,
    back: Option<usize>,
    remaining: usize,
}

impl<'a> Iterator for Entries<'a> {
    type Item = (f64, &'a Bytes);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let slot = self.front?;
        let node = &self.list.nodes[slot];
        self.front = node.levels[0].forward;
        self.remaining -= 1;
        Some((node.score, &node.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl DoubleEndedIterator for Entries<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let slot = self.back?;
        let node = &self.list.nodes[slot];
        self.back = node.backward;
        self.remaining -= 1;
        Some((node.score, &node.value))
    }
}

impl ExactSizeIterator for Entries<'_> {}
