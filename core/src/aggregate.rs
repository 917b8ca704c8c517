//! Per-key accumulators.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use crate::error::{Result, TallyError};
use crate::key::Key;
use crate::shuffle::{Aggregator, Combiner};

/// Mapping from key to an integer accumulator, built by folding a
/// [`Combiner`] over every value that shares the key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aggregate {
    entries: HashMap<Key, i64>,
}

impl Aggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an aggregate from already combined totals. Later duplicates
    /// replace earlier ones.
    pub fn from_entries<I: IntoIterator<Item = (Key, i64)>>(entries: I) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &Key) -> Option<i64> {
        self.entries.get(key).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Key, &i64)> {
        self.entries.iter()
    }

    pub fn into_entries(self) -> impl Iterator<Item = (Key, i64)> {
        self.entries.into_iter()
    }

    /// Fold one raw value into the accumulator for `key`.
    pub fn add_value(&mut self, combiner: Combiner, key: Key, value: i64) -> Result<()> {
        match self.entries.entry(key) {
            Entry::Occupied(mut slot) => {
                let merged = combiner
                    .merge_value(*slot.get(), value)
                    .ok_or_else(|| overflow(slot.key()))?;
                *slot.get_mut() = merged;
            }
            Entry::Vacant(slot) => {
                slot.insert(combiner.create_combiner(value));
            }
        }
        Ok(())
    }

    /// Merge an already combined total for `key`.
    pub fn add_combined(&mut self, combiner: Combiner, key: Key, total: i64) -> Result<()> {
        match self.entries.entry(key) {
            Entry::Occupied(mut slot) => {
                let merged = combiner
                    .merge_combiners(*slot.get(), total)
                    .ok_or_else(|| overflow(slot.key()))?;
                *slot.get_mut() = merged;
            }
            Entry::Vacant(slot) => {
                slot.insert(total);
            }
        }
        Ok(())
    }

    /// Merge another partial aggregate into this one.
    pub fn merge(&mut self, other: Aggregate, combiner: Combiner) -> Result<()> {
        for (key, total) in other.entries {
            self.add_combined(combiner, key, total)?;
        }
        Ok(())
    }

    /// Re-key every entry by a subset of its key parts and fold the totals
    /// as values with `combiner`.
    pub fn regroup(self, key_parts: &[usize], combiner: Combiner) -> Result<Aggregate> {
        let mut regrouped = Aggregate::new();
        for (key, total) in self.entries {
            regrouped.add_value(combiner, key.project(key_parts), total)?;
        }
        Ok(regrouped)
    }

    pub fn remove(&mut self, key: &Key) -> Option<i64> {
        self.entries.remove(key)
    }

    /// Entries ordered by key.
    pub fn into_sorted_by_key(self) -> Vec<(Key, i64)> {
        let mut rows: Vec<_> = self.entries.into_iter().collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        rows
    }

    /// Entries ordered by total descending, truncated to `limit`.
    pub fn ranked(self, limit: Option<usize>) -> Vec<(Key, i64)> {
        let mut rows: Vec<_> = self.entries.into_iter().collect();
        sort_by_total_desc(&mut rows);
        if let Some(limit) = limit {
            rows.truncate(limit);
        }
        rows
    }
}

/// Order rows by total descending; equal totals fall back to key order.
pub fn sort_by_total_desc(rows: &mut [(Key, i64)]) {
    rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
}

fn overflow(key: &Key) -> TallyError {
    TallyError::Overflow {
        key: key.to_string(),
    }
}
