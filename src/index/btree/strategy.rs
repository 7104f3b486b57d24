//! Split policies.
//!
//! The tree always splits an overflowing node into two; the policy decides
//! where. [`Balanced`] splits at the median and keeps every non-root node
//! at least half full. [`Append`] leaves the left node full and moves only
//! the tail right, which packs pages tightly for ascending key loads.

use std::fmt;

/// Chooses split points and the occupancy the tree must maintain.
///
/// `len` is always the overflowing size: capacity + 1.
pub trait InsertStrategy: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// Entries that stay in the left leaf; the rest move right.
    fn leaf_split_point(&self, len: usize) -> usize;

    /// Index of the key promoted out of an internal node. Keys before it
    /// stay left, keys after it move right.
    fn internal_split_point(&self, len: usize) -> usize;

    /// Fewest records a non-root leaf may hold.
    fn min_leaf_keys(&self, capacity: usize) -> usize;

    /// Fewest separator keys a non-root internal node may hold.
    fn min_internal_keys(&self, capacity: usize) -> usize;

    /// Whether every split this policy makes leaves both halves at
    /// [`Balanced`] occupancy.
    fn keeps_half_full(&self) -> bool;
}

/// Median split with half-full nodes.
#[derive(Debug, Clone, Copy, Default)]
pub struct Balanced;

impl InsertStrategy for Balanced {
    fn name(&self) -> &'static str {
        "balanced"
    }

    fn leaf_split_point(&self, len: usize) -> usize {
        len / 2
    }

    fn internal_split_point(&self, len: usize) -> usize {
        len / 2
    }

    fn min_leaf_keys(&self, capacity: usize) -> usize {
        capacity.div_ceil(2)
    }

    fn min_internal_keys(&self, capacity: usize) -> usize {
        capacity / 2
    }

    fn keeps_half_full(&self) -> bool {
        true
    }
}

/// Tail split: the left node stays full.
#[derive(Debug, Clone, Copy, Default)]
pub struct Append;

impl InsertStrategy for Append {
    fn name(&self) -> &'static str {
        "append"
    }

    fn leaf_split_point(&self, len: usize) -> usize {
        len - 1
    }

    fn internal_split_point(&self, len: usize) -> usize {
        len - 2
    }

    fn min_leaf_keys(&self, _capacity: usize) -> usize {
        1
    }

    fn min_internal_keys(&self, _capacity: usize) -> usize {
        1
    }

    fn keeps_half_full(&self) -> bool {
        false
    }
}

/// Strategy selected by the `balance` option.
pub fn strategy_for(balance: bool) -> Box<dyn InsertStrategy> {
    if balance {
        Box::new(Balanced)
    } else {
        Box::new(Append)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balanced_leaf_halves_meet_minimum() {
        for capacity in 3..40 {
            let len = capacity + 1;
            let left = Balanced.leaf_split_point(len);
            let right = len - left;
            let min = Balanced.min_leaf_keys(capacity);
            assert!(left >= min && right >= min, "capacity {}", capacity);
            assert!(left <= capacity && right <= capacity);
        }
    }

    #[test]
    fn test_balanced_internal_halves_meet_minimum() {
        for capacity in 3..40 {
            let len = capacity + 1;
            let at = Balanced.internal_split_point(len);
            let right = len - at - 1;
            let min = Balanced.min_internal_keys(capacity);
            assert!(at >= min && right >= min, "capacity {}", capacity);
        }
    }

    #[test]
    fn test_append_moves_tail_only() {
        assert_eq!(Append.leaf_split_point(5), 4);
        // Left keeps keys 0..3, key 3 is promoted, key 4 moves right.
        assert_eq!(Append.internal_split_point(5), 3);
    }

    #[test]
    fn test_strategy_for() {
        assert_eq!(strategy_for(true).name(), "balanced");
        assert_eq!(strategy_for(false).name(), "append");
        assert!(strategy_for(true).keeps_half_full());
        assert!(!strategy_for(false).keeps_half_full());
    }
}
