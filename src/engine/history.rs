//! Ghost log of recently evicted objects.
//!
//! Budgeted by total bytes rather than entry count, since simulated objects
//! have heterogeneous sizes. Entries form a doubly linked list in an arena,
//! oldest at the head, with a map from object id to arena index so that
//! superseding an existing entry is O(1).

use std::collections::HashMap;

use generational_arena::{Arena, Index};

use crate::engine::{EngineError, ObjId};

/// What the history remembers about one evicted object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryEntry {
    pub id: ObjId,
    pub size: u64,
    /// Access count at the moment of eviction.
    pub access_count: u32,
    /// `now - insertion_time` at the moment of eviction.
    pub age_at_eviction: u64,
}

#[derive(Debug)]
struct Node {
    entry: HistoryEntry,
    prev: Option<Index>,
    next: Option<Index>,
}

#[derive(Debug)]
pub struct EvictionHistory {
    nodes: Arena<Node>,
    lookup: HashMap<ObjId, Index>,
    /// Oldest entry.
    head: Option<Index>,
    /// Most recent entry.
    tail: Option<Index>,
    total_size: u64,
    budget: u64,
}

impl EvictionHistory {
    /// Create a history holding at most `budget` bytes of entries.
    pub fn new(budget: u64) -> Result<Self, EngineError> {
        if budget == 0 {
            return Err(EngineError::InvalidHistoryBudget(budget));
        }
        Ok(Self {
            nodes: Arena::new(),
            lookup: HashMap::new(),
            head: None,
            tail: None,
            total_size: 0,
            budget,
        })
    }

    /// Record an eviction.
    ///
    /// An older entry for the same id is dropped first. Afterwards the oldest
    /// entries are purged until the total fits the budget, which may include
    /// the new entry itself if it alone exceeds the budget.
    pub fn insert(&mut self, id: ObjId, size: u64, access_count: u32, age_at_eviction: u64) {
        self.remove(id);

        let index = self.nodes.insert(Node {
            entry: HistoryEntry {
                id,
                size,
                access_count,
                age_at_eviction,
            },
            prev: self.tail,
            next: None,
        });
        match self.tail {
            Some(tail) => self.nodes[tail].next = Some(index),
            None => self.head = Some(index),
        }
        self.tail = Some(index);
        self.lookup.insert(id, index);
        self.total_size += size;

        while self.total_size > self.budget {
            let Some(head) = self.head else { break };
            let oldest = self.nodes[head].entry.id;
            self.remove(oldest);
        }
    }

    pub fn contains(&self, id: ObjId) -> bool {
        self.lookup.contains_key(&id)
    }

    /// Whether `id` was evicted within the most recent `k_bytes` of evictions.
    ///
    /// Walks back from the newest entry, adding up sizes of the entries passed
    /// over; the search stops once that running total reaches `k_bytes`.
    pub fn in_last_k_bytes(&self, id: ObjId, k_bytes: u64) -> bool {
        let mut scanned = 0u64;
        let mut cur = self.tail;
        while let Some(index) = cur {
            if scanned >= k_bytes {
                break;
            }
            let node = &self.nodes[index];
            if node.entry.id == id {
                return true;
            }
            scanned += node.entry.size;
            cur = node.prev;
        }
        false
    }

    pub fn get(&self, id: ObjId) -> Option<&HistoryEntry> {
        self.lookup.get(&id).map(|&index| &self.nodes[index].entry)
    }

    /// Iterate entries from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> + '_ {
        let mut cur = self.head;
        std::iter::from_fn(move || {
            let index = cur?;
            let node = &self.nodes[index];
            cur = node.next;
            Some(&node.entry)
        })
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.lookup.clear();
        self.head = None;
        self.tail = None;
        self.total_size = 0;
    }

    /// Sum of the sizes of all tracked entries.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn budget(&self) -> u64 {
        self.budget
    }

    pub fn len(&self) -> usize {
        self.lookup.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lookup.is_empty()
    }

    fn remove(&mut self, id: ObjId) -> Option<HistoryEntry> {
        let index = self.lookup.remove(&id)?;
        let node = self.nodes.remove(index)?;

        match node.prev {
            Some(prev) => self.nodes[prev].next = node.next,
            None => self.head = node.next,
        }
        match node.next {
            Some(next) => self.nodes[next].prev = node.prev,
            None => self.tail = node.prev,
        }
        self.total_size -= node.entry.size;
        Some(node.entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(history: &EvictionHistory) -> Vec<ObjId> {
        history.iter().map(|e| e.id).collect()
    }

    #[test]
    fn test_zero_budget_rejected() {
        assert!(matches!(
            EvictionHistory::new(0),
            Err(EngineError::InvalidHistoryBudget(0))
        ));
    }

    #[test]
    fn test_recency_window() {
        let mut history = EvictionHistory::new(100).unwrap();
        history.insert(1, 10, 1, 5);
        history.insert(2, 20, 1, 5);
        history.insert(3, 30, 1, 5);

        assert!(history.in_last_k_bytes(3, 25));
        assert!(!history.in_last_k_bytes(1, 25));
        // 30 + 20 bytes scanned before reaching id 1.
        assert!(history.in_last_k_bytes(1, 51));
        assert!(!history.in_last_k_bytes(1, 50));
        assert!(!history.in_last_k_bytes(3, 0));
        assert!(!history.in_last_k_bytes(42, 1000));
    }

    #[test]
    fn test_budget_purges_oldest() {
        let mut history = EvictionHistory::new(50).unwrap();
        history.insert(1, 20, 1, 0);
        history.insert(2, 20, 1, 0);
        history.insert(3, 20, 1, 0);

        assert_eq!(ids(&history), vec![2, 3]);
        assert_eq!(history.total_size(), 40);
        assert!(!history.contains(1));
    }

    #[test]
    fn test_reinsert_supersedes_entry() {
        let mut history = EvictionHistory::new(100).unwrap();
        history.insert(1, 10, 1, 3);
        history.insert(2, 10, 1, 3);
        history.insert(1, 15, 4, 9);

        assert_eq!(ids(&history), vec![2, 1]);
        assert_eq!(history.total_size(), 25);
        let entry = history.get(1).unwrap();
        assert_eq!(entry.size, 15);
        assert_eq!(entry.access_count, 4);
        assert_eq!(entry.age_at_eviction, 9);
    }

    #[test]
    fn test_oversized_entry_does_not_stick() {
        let mut history = EvictionHistory::new(10).unwrap();
        history.insert(1, 5, 1, 0);
        history.insert(2, 11, 1, 0);
        assert!(history.is_empty());
        assert_eq!(history.total_size(), 0);
    }

    #[test]
    fn test_budget_invariant_under_churn() {
        let mut history = EvictionHistory::new(1000).unwrap();
        for i in 0..5000u64 {
            let id = crate::hash::mix64(i) % 97;
            let size = 1 + crate::hash::mix64(i ^ 0xABCD) % 120;
            history.insert(id, size, 1, i);
            assert!(history.total_size() <= history.budget());
        }
        let mut seen = ids(&history);
        let total: u64 = history.iter().map(|e| e.size).sum();
        assert_eq!(total, history.total_size());
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), history.len());
    }

    #[test]
    fn test_clear() {
        let mut history = EvictionHistory::new(100).unwrap();
        history.insert(1, 10, 1, 0);
        history.clear();
        assert!(history.is_empty());
        assert_eq!(history.total_size(), 0);
        assert!(history.get(1).is_none());
        history.insert(2, 10, 1, 0);
        assert_eq!(ids(&history), vec![2]);
    }
}
