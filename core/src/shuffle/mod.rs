//! Local shuffle: merging per-partition partial aggregates.
//!
//! Every partial is split into hash buckets so that each key lands in
//! exactly one bucket; buckets are then combined in parallel and
//! concatenated. Because buckets hold disjoint keys the concatenation needs
//! no further merging.

pub mod aggregator;
pub mod partitioner;

pub use aggregator::*;
pub use partitioner::*;

use tracing::debug;

use crate::aggregate::Aggregate;
use crate::error::Result;
use crate::key::Key;
use crate::scheduler::{LocalScheduler, Task};

/// Merge partial aggregates with `combiner` using `num_buckets` reduce
/// buckets on the scheduler's pool.
pub fn merge_partials(
    scheduler: &LocalScheduler,
    partials: Vec<Aggregate>,
    combiner: Combiner,
    num_buckets: usize,
) -> Result<Aggregate> {
    if partials.len() <= 1 {
        return Ok(partials.into_iter().next().unwrap_or_default());
    }

    let partitioner = HashPartitioner::new(num_buckets);
    let mut buckets: Vec<Vec<(Key, i64)>> = vec![Vec::new(); partitioner.num_partitions()];
    for partial in partials {
        for (key, total) in partial.into_entries() {
            buckets[partitioner.partition_for(&key)].push((key, total));
        }
    }
    debug!(
        "Merging partial aggregates across {} buckets",
        buckets.len()
    );

    let tasks = buckets
        .into_iter()
        .enumerate()
        .map(|(index, bucket)| {
            Task::new(index, move |_| {
                let mut merged = Aggregate::new();
                for (key, total) in bucket {
                    merged.add_combined(combiner, key, total)?;
                }
                Ok(merged)
            })
        })
        .collect();

    let merged_buckets = scheduler.execute_tasks(tasks)?;
    Ok(Aggregate::from_entries(
        merged_buckets.into_iter().flat_map(Aggregate::into_entries),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_partials_matches_sequential_merge() {
        let scheduler = LocalScheduler::new(3).unwrap();
        let partials = vec![
            Aggregate::from_entries([(Key::from("A"), 10), (Key::from("B"), 5)]),
            Aggregate::from_entries([(Key::from("A"), 7)]),
            Aggregate::from_entries([(Key::from("C"), 2), (Key::from("B"), 1)]),
        ];

        let mut sequential = Aggregate::new();
        for partial in partials.clone() {
            sequential.merge(partial, Combiner::Sum).unwrap();
        }

        let merged = merge_partials(&scheduler, partials, Combiner::Sum, 4).unwrap();
        assert_eq!(merged, sequential);
        assert_eq!(merged.get(&Key::from("A")), Some(17));
    }

    #[test]
    fn test_merge_single_partial_is_identity() {
        let scheduler = LocalScheduler::new(1).unwrap();
        let partial = Aggregate::from_entries([(Key::from("A"), 1)]);
        let merged = merge_partials(&scheduler, vec![partial.clone()], Combiner::Max, 2).unwrap();
        assert_eq!(merged, partial);
    }

    #[test]
    fn test_merge_no_partials() {
        let scheduler = LocalScheduler::new(1).unwrap();
        assert!(merge_partials(&scheduler, Vec::new(), Combiner::Sum, 2)
            .unwrap()
            .is_empty());
    }
}
