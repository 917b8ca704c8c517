//! Defines partitioners for distributing keys across reduce buckets.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// A partitioner that uses the hash of the key to pick a bucket.
#[derive(Clone, Debug)]
pub struct HashPartitioner {
    num_partitions: usize,
    seed: u64,
}

impl HashPartitioner {
    /// A zero partition count is treated as one.
    pub fn new(num_partitions: usize) -> Self {
        Self::with_seed(num_partitions, 0)
    }

    pub fn with_seed(num_partitions: usize, seed: u64) -> Self {
        Self {
            num_partitions: num_partitions.max(1),
            seed,
        }
    }

    pub fn num_partitions(&self) -> usize {
        self.num_partitions
    }

    pub fn partition_for<K: Hash + ?Sized>(&self, key: &K) -> usize {
        let mut hasher = DefaultHasher::new();
        self.seed.hash(&mut hasher);
        key.hash(&mut hasher);
        (hasher.finish() % self.num_partitions as u64) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_in_range_and_stable() {
        let partitioner = HashPartitioner::new(4);
        for key in ["apple", "banana", "cherry", "date"] {
            let p = partitioner.partition_for(key);
            assert!(p < 4);
            assert_eq!(p, partitioner.partition_for(key));
        }
    }

    #[test]
    fn test_zero_partitions_clamped() {
        let partitioner = HashPartitioner::new(0);
        assert_eq!(partitioner.num_partitions(), 1);
        assert_eq!(partitioner.partition_for(&42_u64), 0);
    }
}
