//! Pure diff between two consecutive trending windows.
//!
//! Classifies every token as added, removed, or moved. The three output
//! collections are built from hash maps and carry no meaningful order;
//! consumers must treat them as sets.

use event_schema::{RankedRecord, TokenKey};
use std::collections::HashMap;

/// Per-token changes between a previous and a current window.
#[derive(Debug, Default, Clone)]
pub struct WindowDiff {
    /// Tokens present only in the current window, with their new rank.
    pub added: Vec<(TokenKey, u32)>,
    /// Tokens present only in the previous window, with their old rank.
    pub removed: Vec<(TokenKey, u32)>,
    /// Tokens in both windows whose rank delta met the threshold,
    /// with (old rank, new rank).
    pub moved: Vec<(TokenKey, u32, u32)>,
}

impl WindowDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.moved.is_empty()
    }

    pub fn change_count(&self) -> usize {
        self.added.len() + self.removed.len() + self.moved.len()
    }
}

/// Compare two windows.
///
/// A token in both windows counts as moved when
/// `|old_rank - new_rank| >= move_threshold`. A threshold of 1 makes any
/// rank change count; a threshold beyond the window size disables MOVED
/// detection entirely, which is a valid configuration rather than an edge
/// case.
///
/// An empty `prev` is the bootstrap case: everything in `curr` is added and
/// nothing is removed or moved.
pub fn diff_windows(prev: &[RankedRecord], curr: &[RankedRecord], move_threshold: u32) -> WindowDiff {
    let prev_ranks: HashMap<TokenKey, u32> = prev.iter().map(|r| (r.key(), r.rank)).collect();
    let curr_ranks: HashMap<TokenKey, u32> = curr.iter().map(|r| (r.key(), r.rank)).collect();

    let mut diff = WindowDiff::default();

    for (key, &new_rank) in &curr_ranks {
        match prev_ranks.get(key) {
            None => diff.added.push((key.clone(), new_rank)),
            Some(&old_rank) => {
                if old_rank.abs_diff(new_rank) >= move_threshold {
                    diff.moved.push((key.clone(), old_rank, new_rank));
                }
            }
        }
    }

    for (key, &old_rank) in &prev_ranks {
        if !curr_ranks.contains_key(key) {
            diff.removed.push((key.clone(), old_rank));
        }
    }

    diff
}
