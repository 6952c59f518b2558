//! Mutable-priority index with deterministic minimum extraction.
//!
//! Priorities change on every access, so a binary heap does not fit: it has
//! no cheap way to re-key or delete an arbitrary element. An ordered set of
//! `(priority, reference)` pairs plus a reverse map gives logarithmic upsert,
//! removal and pop-min.

use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;

use crate::engine::Priority;

/// Ordering entry. Field order gives the `(priority, reference)` sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct IndexEntry<R> {
    priority: Priority,
    reference: R,
}

#[derive(Debug)]
pub struct PriorityIndex<R> {
    entries: BTreeSet<IndexEntry<R>>,
    priorities: HashMap<R, Priority>,
}

impl<R: Ord + Hash + Copy> Default for PriorityIndex<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Ord + Hash + Copy> PriorityIndex<R> {
    pub fn new() -> Self {
        Self {
            entries: BTreeSet::new(),
            priorities: HashMap::new(),
        }
    }

    /// Set the priority of `reference`, replacing any previous entry.
    pub fn upsert(&mut self, reference: R, priority: Priority) {
        if let Some(old) = self.priorities.insert(reference, priority) {
            self.entries.remove(&IndexEntry {
                priority: old,
                reference,
            });
        }
        self.entries.insert(IndexEntry {
            priority,
            reference,
        });
    }

    /// Remove and return the entry with the smallest `(priority, reference)`.
    pub fn pop_min(&mut self) -> Option<(R, Priority)> {
        let entry = self.entries.pop_first()?;
        self.priorities.remove(&entry.reference);
        Some((entry.reference, entry.priority))
    }

    /// The entry `pop_min` would return, without removing it.
    pub fn peek_min(&self) -> Option<(R, Priority)> {
        self.entries
            .first()
            .map(|entry| (entry.reference, entry.priority))
    }

    /// Drop `reference` from the index. Returns its priority if it was present.
    pub fn remove(&mut self, reference: R) -> Option<Priority> {
        let priority = self.priorities.remove(&reference)?;
        self.entries.remove(&IndexEntry {
            priority,
            reference,
        });
        Some(priority)
    }

    pub fn priority_of(&self, reference: R) -> Option<Priority> {
        self.priorities.get(&reference).copied()
    }

    pub fn contains(&self, reference: R) -> bool {
        self.priorities.contains_key(&reference)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.priorities.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pop_min_order() {
        let mut index = PriorityIndex::new();
        index.upsert(1u64, 30);
        index.upsert(2, 10);
        index.upsert(3, 20);

        assert_eq!(index.pop_min(), Some((2, 10)));
        assert_eq!(index.pop_min(), Some((3, 20)));
        assert_eq!(index.pop_min(), Some((1, 30)));
        assert_eq!(index.pop_min(), None);
    }

    #[test]
    fn test_ties_break_on_reference() {
        let mut index = PriorityIndex::new();
        index.upsert(9u64, 5);
        index.upsert(4, 5);
        index.upsert(7, 5);

        assert_eq!(index.pop_min().map(|(r, _)| r), Some(4));
        assert_eq!(index.pop_min().map(|(r, _)| r), Some(7));
        assert_eq!(index.pop_min().map(|(r, _)| r), Some(9));
    }

    #[test]
    fn test_upsert_replaces_old_priority() {
        let mut index = PriorityIndex::new();
        index.upsert(1u64, 1);
        index.upsert(2, 2);
        index.upsert(1, 3);

        assert_eq!(index.len(), 2);
        assert_eq!(index.priority_of(1), Some(3));
        assert_eq!(index.peek_min(), Some((2, 2)));
        assert_eq!(index.pop_min(), Some((2, 2)));
        assert_eq!(index.pop_min(), Some((1, 3)));
        assert!(index.is_empty());
    }

    #[test]
    fn test_remove() {
        let mut index = PriorityIndex::new();
        index.upsert(1u64, 1);
        index.upsert(2, 2);
        assert_eq!(index.remove(1), Some(1));
        assert_eq!(index.remove(1), None);
        assert!(!index.contains(1));
        assert_eq!(index.pop_min(), Some((2, 2)));
    }

    #[test]
    fn test_identical_runs_pop_identically() {
        fn run() -> Vec<u64> {
            let mut index = PriorityIndex::new();
            let mut popped = Vec::new();
            for step in 0..2000u64 {
                let r = crate::hash::mix64(step);
                index.upsert(r % 50, (r >> 32) as Priority % 8);
                if step % 7 == 0 {
                    if let Some((reference, _)) = index.pop_min() {
                        popped.push(reference);
                    }
                }
            }
            while let Some((reference, _)) = index.pop_min() {
                popped.push(reference);
            }
            popped
        }
        assert_eq!(run(), run());
    }
}
