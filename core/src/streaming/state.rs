//! State kept by a streaming aggregation between micro-batches.

use std::collections::HashMap;
use std::fmt::Debug;

use crate::key::Key;

/// Key/total store owned by one streaming query.
pub trait StateStore: Send + Debug {
    fn get(&self, key: &Key) -> Option<i64>;

    fn put(&mut self, key: Key, total: i64);

    fn remove(&mut self, key: &Key) -> Option<i64>;

    /// Snapshot of every entry, in no particular order.
    fn entries(&self) -> Vec<(Key, i64)>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory state store. State lives as long as the query.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    totals: HashMap<Key, i64>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn get(&self, key: &Key) -> Option<i64> {
        self.totals.get(key).copied()
    }

    fn put(&mut self, key: Key, total: i64) {
        self.totals.insert(key, total);
    }

    fn remove(&mut self, key: &Key) -> Option<i64> {
        self.totals.remove(key)
    }

    fn entries(&self) -> Vec<(Key, i64)> {
        self.totals.iter().map(|(k, v)| (k.clone(), *v)).collect()
    }

    fn len(&self) -> usize {
        self.totals.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_remove() {
        let mut store = MemoryStateStore::new();
        assert!(store.is_empty());
        store.put(Key::from("A"), 17);
        store.put(Key::from("A"), 20);
        assert_eq!(store.get(&Key::from("A")), Some(20));
        assert_eq!(store.len(), 1);
        assert_eq!(store.remove(&Key::from("A")), Some(20));
        assert!(store.entries().is_empty());
    }
}
