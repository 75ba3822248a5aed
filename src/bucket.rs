//! Buckets
//!
//! A bucket is a named namespace whose keys all hold one declared kind of
//! data structure. Names are matched with shell-style globs (`*`, `?`).

use std::collections::btree_map;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::state::Bucket;

/// Data structure a bucket is declared for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum DataStructure {
    /// Keys hold sorted sets
    SortedSet,
}

impl DataStructure {
    pub fn name(&self) -> &'static str {
        match self {
            DataStructure::SortedSet => "sorted_set",
        }
    }
}

impl fmt::Display for DataStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Match `name` against a glob where `*` is any run and `?` any one char
pub fn matches_pattern(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();

    let (mut p, mut n) = (0, 0);
    // Last `*` seen and the name position it is currently absorbing up to
    let mut star: Option<(usize, usize)> = None;

    while n < name.len() {
        match pattern.get(p) {
            Some('*') => {
                star = Some((p, n));
                p += 1;
            }
            Some('?') => {
                p += 1;
                n += 1;
            }
            Some(c) if *c == name[n] => {
                p += 1;
                n += 1;
            }
            _ => match star {
                Some((star_p, star_n)) => {
                    p = star_p + 1;
                    n = star_n + 1;
                    star = Some((star_p, star_n + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|c| *c == '*')
}

/// Lazy iterator over bucket names of one kind matching a pattern
///
/// Yields names in ascending order. Stop consuming to end early; clone it
/// (or ask the transaction again) to restart.
#[derive(Clone)]
pub struct BucketIter<'a> {
    buckets: btree_map::Iter<'a, String, Bucket>,
    kind: DataStructure,
    pattern: String,
}

impl<'a> BucketIter<'a> {
    pub(crate) fn new(
        buckets: btree_map::Iter<'a, String, Bucket>,
        kind: DataStructure,
        pattern: impl Into<String>,
    ) -> Self {
        Self {
            buckets,
            kind,
            pattern: pattern.into(),
        }
    }
}

impl<'a> Iterator for BucketIter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let kind = self.kind;
        let pattern = &self.pattern;
        self.buckets
            .by_ref()
            .find(|(name, bucket)| bucket.kind() == kind && matches_pattern(pattern, name))
            .map(|(name, _)| name.as_str())
    }
}
