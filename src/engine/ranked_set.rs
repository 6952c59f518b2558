//! Order-statistics multiset.
//!
//! A treap stored in a flat arena and augmented with subtree sizes, so
//! insert, remove, rank and percentile queries all run in expected
//! logarithmic time. Equal values are kept apart by a private sequence number
//! that only ever grows, which gives the tree a strict total order without
//! comparing anything but the values themselves.

use std::cmp::Ordering;

use crate::hash::mix64;

/// Arena slot of a tree node.
type Link = Option<usize>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Key<T> {
    value: T,
    uid: u64,
}

#[derive(Debug, Clone)]
struct Node<T> {
    key: Key<T>,
    /// Max-heap priority, derived from `key.uid`.
    heap_priority: u64,
    /// Number of nodes in the subtree rooted here.
    size: usize,
    left: Link,
    right: Link,
}

/// An ordered multiset answering "which value sits at percentile p".
///
/// Duplicates are allowed and each occurrence is removable on its own.
/// Which physical occurrence `remove` takes is unspecified; only the
/// multiset content is observable.
#[derive(Debug, Clone)]
pub struct RankedSet<T> {
    nodes: Vec<Node<T>>,
    free: Vec<usize>,
    root: Link,
    len: usize,
    next_uid: u64,
}

impl<T: Ord + Copy + Default> Default for RankedSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Ord + Copy + Default> RankedSet<T> {
    /// Create an empty set.
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            root: None,
            len: 0,
            next_uid: 0,
        }
    }

    /// Number of live occurrences.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the set holds no values.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Add one occurrence of `value`.
    pub fn insert(&mut self, value: T) {
        let key = Key {
            value,
            uid: self.next_uid,
        };
        self.next_uid += 1;

        let node = self.alloc(key);
        let (left, right) = self.split(self.root, key);
        let left = self.merge(left, Some(node));
        self.root = self.merge(left, right);
        self.len += 1;
    }

    /// Remove one occurrence of `value`. Returns whether anything was removed.
    pub fn remove(&mut self, value: T) -> bool {
        let Some(key) = self.lower_bound(value) else {
            return false;
        };
        if key.value != value {
            return false;
        }
        self.root = self.erase(self.root, key);
        self.len -= 1;
        true
    }

    /// Value at rank `floor(p * len)`, with `p` clamped to `[0, 1]` and the
    /// rank clamped to the last element.
    ///
    /// Returns `T::default()` when the set is empty; that is a sentinel,
    /// not a percentile.
    pub fn percentile(&self, p: f64) -> T {
        if self.len == 0 {
            return T::default();
        }
        let p = p.clamp(0.0, 1.0);
        let idx = ((p * self.len as f64) as usize).min(self.len - 1);
        self.select(idx).unwrap_or_default()
    }

    /// Value at zero-based rank `idx` in ascending order.
    pub fn select(&self, mut idx: usize) -> Option<T> {
        if idx >= self.len {
            return None;
        }
        let mut cur = self.root;
        while let Some(n) = cur {
            let node = &self.nodes[n];
            let left_size = self.size_of(node.left);
            match idx.cmp(&left_size) {
                Ordering::Less => cur = node.left,
                Ordering::Equal => return Some(node.key.value),
                Ordering::Greater => {
                    idx -= left_size + 1;
                    cur = node.right;
                }
            }
        }
        None
    }

    /// Number of stored values strictly less than `value`.
    pub fn rank(&self, value: T) -> usize {
        let probe = Key { value, uid: 0 };
        let mut rank = 0;
        let mut cur = self.root;
        while let Some(n) = cur {
            let node = &self.nodes[n];
            if node.key < probe {
                rank += self.size_of(node.left) + 1;
                cur = node.right;
            } else {
                cur = node.left;
            }
        }
        rank
    }

    /// Smallest value, or `T::default()` when empty.
    pub fn min(&self) -> T {
        let mut cur = self.root;
        let mut found = T::default();
        while let Some(n) = cur {
            found = self.nodes[n].key.value;
            cur = self.nodes[n].left;
        }
        found
    }

    /// Largest value, or `T::default()` when empty.
    pub fn max(&self) -> T {
        let mut cur = self.root;
        let mut found = T::default();
        while let Some(n) = cur {
            found = self.nodes[n].key.value;
            cur = self.nodes[n].right;
        }
        found
    }

    /// Iterate values in ascending order.
    pub fn iter(&self) -> Iter<'_, T> {
        let mut iter = Iter {
            set: self,
            stack: Vec::new(),
        };
        iter.push_left(self.root);
        iter
    }

    /// Drop every value. The tie-break counter keeps counting.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.root = None;
        self.len = 0;
    }

    fn alloc(&mut self, key: Key<T>) -> usize {
        let node = Node {
            key,
            heap_priority: mix64(key.uid),
            size: 1,
            left: None,
            right: None,
        };
        match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = node;
                slot
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn size_of(&self, link: Link) -> usize {
        link.map_or(0, |n| self.nodes[n].size)
    }

    fn update(&mut self, n: usize) {
        let size = 1 + self.size_of(self.nodes[n].left) + self.size_of(self.nodes[n].right);
        self.nodes[n].size = size;
    }

    fn lower_bound(&self, value: T) -> Option<Key<T>> {
        let probe = Key { value, uid: 0 };
        let mut best = None;
        let mut cur = self.root;
        while let Some(n) = cur {
            let node = &self.nodes[n];
            if node.key >= probe {
                best = Some(node.key);
                cur = node.left;
            } else {
                cur = node.right;
            }
        }
        best
    }

    /// Split `t` into keys `< key` and keys `>= key`.
    fn split(&mut self, t: Link, key: Key<T>) -> (Link, Link) {
        let Some(n) = t else {
            return (None, None);
        };
        if self.nodes[n].key < key {
            let (left, right) = self.split(self.nodes[n].right, key);
            self.nodes[n].right = left;
            self.update(n);
            (Some(n), right)
        } else {
            let (left, right) = self.split(self.nodes[n].left, key);
            self.nodes[n].left = right;
            self.update(n);
            (left, Some(n))
        }
    }

    /// Join two trees where every key in `a` is below every key in `b`.
    fn merge(&mut self, a: Link, b: Link) -> Link {
        match (a, b) {
            (None, other) | (other, None) => other,
            (Some(x), Some(y)) => {
                if self.nodes[x].heap_priority > self.nodes[y].heap_priority {
                    let merged = self.merge(self.nodes[x].right, Some(y));
                    self.nodes[x].right = merged;
                    self.update(x);
                    Some(x)
                } else {
                    let merged = self.merge(Some(x), self.nodes[y].left);
                    self.nodes[y].left = merged;
                    self.update(y);
                    Some(y)
                }
            }
        }
    }

    fn erase(&mut self, t: Link, key: Key<T>) -> Link {
        let n = t?;
        match key.cmp(&self.nodes[n].key) {
            Ordering::Equal => {
                let (left, right) = (self.nodes[n].left, self.nodes[n].right);
                self.free.push(n);
                self.merge(left, right)
            }
            Ordering::Less => {
                let left = self.erase(self.nodes[n].left, key);
                self.nodes[n].left = left;
                self.update(n);
                Some(n)
            }
            Ordering::Greater => {
                let right = self.erase(self.nodes[n].right, key);
                self.nodes[n].right = right;
                self.update(n);
                Some(n)
            }
        }
    }

    #[cfg(test)]
    fn check_invariants(&self) {
        fn walk<T: Ord + Copy>(set: &RankedSet<T>, link: Link, parent_prio: u64) -> usize {
            let Some(n) = link else { return 0 };
            let node = &set.nodes[n];
            assert!(node.heap_priority <= parent_prio, "heap order violated");
            if let Some(l) = node.left {
                assert!(set.nodes[l].key < node.key, "left child out of order");
            }
            if let Some(r) = node.right {
                assert!(set.nodes[r].key > node.key, "right child out of order");
            }
            let size = 1
                + walk(set, node.left, node.heap_priority)
                + walk(set, node.right, node.heap_priority);
            assert_eq!(size, node.size, "stale subtree size");
            size
        }
        assert_eq!(walk(self, self.root, u64::MAX), self.len);
    }
}

/// Ascending iterator over a [`RankedSet`].
pub struct Iter<'a, T> {
    set: &'a RankedSet<T>,
    stack: Vec<usize>,
}

impl<T> Iter<'_, T> {
    fn push_left(&mut self, mut link: Link) {
        while let Some(n) = link {
            self.stack.push(n);
            link = self.set.nodes[n].left;
        }
    }
}

impl<T: Copy> Iterator for Iter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let n = self.stack.pop()?;
        let node = &self.set.nodes[n];
        let value = node.key.value;
        self.push_left(node.right);
        Some(value)
    }
}
