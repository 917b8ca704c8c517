//! Partitioned, immutable collections of raw lines.
//!
//! A `Dataset` holds its lines behind an `Arc` and describes partitions as
//! contiguous index ranges, so handing a partition to a worker thread never
//! copies data.

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

/// Raw input lines split into `num_partitions` contiguous chunks.
#[derive(Clone)]
pub struct Dataset {
    lines: Arc<Vec<String>>,
    num_partitions: usize,
}

impl fmt::Debug for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dataset")
            .field("lines_len", &self.lines.len())
            .field("num_partitions", &self.num_partitions)
            .finish()
    }
}

impl Dataset {
    /// Create a dataset with a single partition
    pub fn from_lines(lines: Vec<String>) -> Self {
        Self::from_lines_with_partitions(lines, 1)
    }

    /// Create a dataset with the specified number of partitions
    pub fn from_lines_with_partitions(lines: Vec<String>, num_partitions: usize) -> Self {
        Self {
            lines: Arc::new(lines),
            num_partitions: num_partitions.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn num_partitions(&self) -> usize {
        self.num_partitions
    }

    fn partition_range(&self, index: usize) -> Range<usize> {
        let len = self.lines.len();
        let partition_size = len.div_ceil(self.num_partitions);
        let start = (index * partition_size).min(len);
        let end = (start + partition_size).min(len);
        start..end
    }

    /// Lines belonging to partition `index`; empty past the last partition
    pub fn partition(&self, index: usize) -> &[String] {
        &self.lines[self.partition_range(index)]
    }

    /// A cheap handle to one partition that can be moved to a worker
    pub fn partition_handle(&self, index: usize) -> PartitionHandle {
        PartitionHandle {
            lines: Arc::clone(&self.lines),
            range: self.partition_range(index),
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

/// Owned view of one partition.
#[derive(Debug, Clone)]
pub struct PartitionHandle {
    lines: Arc<Vec<String>>,
    range: Range<usize>,
}

impl PartitionHandle {
    pub fn lines(&self) -> &[String] {
        &self.lines[self.range.clone()]
    }
}
