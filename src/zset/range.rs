//! Score ranges and rank windows

/// Options for score range queries (`zcount`, `zrange_by_score`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RangeOpts {
    /// Maximum number of nodes to return or count; 0 means unlimited
    pub limit: usize,

    /// Search `(start, end]` instead of `[start, end]`
    pub exclude_start: bool,

    /// Search `[start, end)` instead of `[start, end]`
    pub exclude_end: bool,
}

impl RangeOpts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn exclude_start(mut self, exclude: bool) -> Self {
        self.exclude_start = exclude;
        self
    }

    pub fn exclude_end(mut self, exclude: bool) -> Self {
        self.exclude_end = exclude;
        self
    }

    /// The limit as an iterator bound
    pub(crate) fn take(&self) -> usize {
        if self.limit == 0 {
            usize::MAX
        } else {
            self.limit
        }
    }
}

/// A score interval with optionally open ends
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreRange {
    pub min: f64,
    pub max: f64,
    pub exclude_min: bool,
    pub exclude_max: bool,
}

impl ScoreRange {
    pub fn new(min: f64, max: f64, exclude_min: bool, exclude_max: bool) -> Self {
        Self {
            min,
            max,
            exclude_min,
            exclude_max,
        }
    }

    pub fn from_opts(min: f64, max: f64, opts: &RangeOpts) -> Self {
        Self::new(min, max, opts.exclude_start, opts.exclude_end)
    }

    /// Score is above the lower bound
    pub fn gte_min(&self, score: f64) -> bool {
        if self.exclude_min {
            score > self.min
        } else {
            score >= self.min
        }
    }

    /// Score is below the upper bound
    pub fn lte_max(&self, score: f64) -> bool {
        if self.exclude_max {
            score < self.max
        } else {
            score <= self.max
        }
    }

    pub fn contains(&self, score: f64) -> bool {
        self.gte_min(score) && self.lte_max(score)
    }

    /// No score can satisfy the range
    pub fn is_empty(&self) -> bool {
        if self.min.is_nan() || self.max.is_nan() || self.min > self.max {
            return true;
        }
        self.min == self.max && (self.exclude_min || self.exclude_max)
    }
}

/// Map a possibly negative 1-based rank onto `1..=len` coordinates
///
/// `-1` is the last entry, `-len` the first. The result is not clamped.
pub fn normalize_rank(rank: i64, len: usize) -> i64 {
    if rank < 0 {
        len as i64 + rank + 1
    } else {
        rank
    }
}

/// Resolve an inclusive rank window against a set of `len` entries
///
/// Returns `None` when the window selects nothing: the set is empty,
/// the start lies past the end, or the bounds cross after resolution.
pub fn resolve_rank_range(start: i64, end: i64, len: usize) -> Option<(usize, usize)> {
    if len == 0 {
        return None;
    }

    let start = normalize_rank(start, len).max(1);
    let end = normalize_rank(end, len).min(len as i64);

    (start <= end).then_some((start as usize, end as usize))
}
