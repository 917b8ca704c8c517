//! Defines the Aggregator trait for combining values per key.

use std::fmt::Debug;

use serde::{Deserialize, Serialize};

/// Aggregator trait for combining values for a key.
///
/// V: input value type
/// C: combiner (intermediate/output) type
///
/// Implementations must be associative and commutative: partial combiners
/// built on different partitions are merged in arbitrary order. Merging
/// returns `None` when the accumulator would overflow.
pub trait Aggregator<V, C>: Send + Sync + Debug {
    /// Create a combiner from the first value for a key.
    fn create_combiner(&self, v: V) -> C;

    /// Merge a new value into an existing combiner.
    fn merge_value(&self, c: C, v: V) -> Option<C>;

    /// Merge two combiners.
    fn merge_combiners(&self, c1: C, c2: C) -> Option<C>;
}

/// The built-in integer combiners.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Combiner {
    /// Sum of the values.
    #[default]
    Sum,
    /// Number of values.
    Count,
    /// Largest value.
    Max,
    /// Smallest value.
    Min,
}

impl Aggregator<i64, i64> for Combiner {
    fn create_combiner(&self, v: i64) -> i64 {
        match self {
            Combiner::Count => 1,
            Combiner::Sum | Combiner::Max | Combiner::Min => v,
        }
    }

    fn merge_value(&self, c: i64, v: i64) -> Option<i64> {
        match self {
            Combiner::Sum => c.checked_add(v),
            Combiner::Count => c.checked_add(1),
            Combiner::Max => Some(c.max(v)),
            Combiner::Min => Some(c.min(v)),
        }
    }

    fn merge_combiners(&self, c1: i64, c2: i64) -> Option<i64> {
        match self {
            Combiner::Sum | Combiner::Count => c1.checked_add(c2),
            Combiner::Max => Some(c1.max(c2)),
            Combiner::Min => Some(c1.min(c2)),
        }
    }
}

impl std::str::FromStr for Combiner {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sum" => Ok(Combiner::Sum),
            "count" => Ok(Combiner::Count),
            "max" => Ok(Combiner::Max),
            "min" => Ok(Combiner::Min),
            other => Err(format!("unknown combiner '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fold(combiner: Combiner, values: &[i64]) -> i64 {
        let mut iter = values.iter().copied();
        let first = combiner.create_combiner(iter.next().unwrap());
        iter.fold(first, |c, v| combiner.merge_value(c, v).unwrap())
    }

    #[test]
    fn test_sum_and_count() {
        assert_eq!(fold(Combiner::Sum, &[10, 5, 7]), 22);
        assert_eq!(fold(Combiner::Count, &[10, 5, 7]), 3);
    }

    #[test]
    fn test_max_and_min() {
        assert_eq!(fold(Combiner::Max, &[3, 9, -1]), 9);
        assert_eq!(fold(Combiner::Min, &[3, 9, -1]), -1);
    }

    #[test]
    fn test_partials_merge_like_single_fold() {
        for combiner in [Combiner::Sum, Combiner::Count, Combiner::Max, Combiner::Min] {
            let whole = fold(combiner, &[4, 8, 15, 16, 23, 42]);
            let left = fold(combiner, &[4, 8, 15]);
            let right = fold(combiner, &[16, 23, 42]);
            assert_eq!(combiner.merge_combiners(right, left), Some(whole));
        }
    }

    #[test]
    fn test_overflow_is_reported() {
        assert_eq!(Combiner::Sum.merge_value(i64::MAX, 1), None);
        assert_eq!(Combiner::Sum.merge_combiners(i64::MIN, -1), None);
    }

    #[test]
    fn test_from_str() {
        assert_eq!("SUM".parse::<Combiner>().unwrap(), Combiner::Sum);
        assert!("avg".parse::<Combiner>().is_err());
    }
}
