//! In-memory write buffer for membership inserts.
//!
//! Analogous to an LSM-tree memtable: unsorted, keyed by vertex key,
//! single-writer. Drained into one sorted run per category on flush.

use std::collections::HashMap;

use crate::record::{Category, VertexKey};

#[derive(Debug, Default)]
pub struct WriteBuffer {
    entries: HashMap<VertexKey, Category>,
}

impl WriteBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: VertexKey) -> Option<Category> {
        self.entries.get(&key).copied()
    }

    /// Insert-or-ignore. Returns the existing category if `key` is buffered.
    pub fn insert(&mut self, key: VertexKey, category: Category) -> Option<Category> {
        match self.entries.entry(key) {
            std::collections::hash_map::Entry::Occupied(e) => Some(*e.get()),
            std::collections::hash_map::Entry::Vacant(e) => {
                e.insert(category);
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Empty the buffer, returning each category's keys in ascending order.
    pub fn drain_sorted(&mut self) -> [(Category, Vec<VertexKey>); 2] {
        let mut load = Vec::new();
        let mut update = Vec::new();
        for (key, category) in self.entries.drain() {
            match category {
                Category::Load => load.push(key),
                Category::Update => update.push(key),
            }
        }
        load.sort_unstable();
        update.sort_unstable();
        [(Category::Load, load), (Category::Update, update)]
    }
}
