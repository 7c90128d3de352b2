//! Fixed-capacity FIFO history.
//!
//! Backed by a single arena that grows up to `capacity` and then overwrites
//! the oldest slot in place, so pushing never reallocates once full.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct History<T> {
    slots: Vec<T>,
    /// Index of the oldest entry once the arena is full (always 0 before that).
    head: usize,
    capacity: usize,
}

impl<T> History<T> {
    /// Create an empty history. A capacity of zero is bumped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        History {
            slots: Vec::with_capacity(capacity),
            head: 0,
            capacity,
        }
    }

    /// Append a value, evicting and returning the oldest one when full.
    pub fn push(&mut self, value: T) -> Option<T> {
        if self.slots.len() < self.capacity {
            self.slots.push(value);
            return None;
        }

        let evicted = std::mem::replace(&mut self.slots[self.head], value);
        self.head = (self.head + 1) % self.capacity;
        Some(evicted)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() == self.capacity
    }

    /// Entry by age: `0` is the oldest retained value.
    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.slots.len() {
            return None;
        }
        self.slots.get((self.head + index) % self.slots.len())
    }

    /// Entry counted back from the newest: `0` is the latest value.
    pub fn get_back(&self, index: usize) -> Option<&T> {
        let len = self.slots.len();
        if index >= len {
            return None;
        }
        self.get(len - 1 - index)
    }

    pub fn latest(&self) -> Option<&T> {
        self.get_back(0)
    }

    pub fn oldest(&self) -> Option<&T> {
        self.get(0)
    }

    /// Iterate oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + '_ {
        let (wrapped, front) = self.slots.split_at(self.head);
        front.iter().chain(wrapped.iter())
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.head = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_below_capacity() {
        let mut history = History::new(3);
        assert!(history.is_empty());
        assert_eq!(history.push(1), None);
        assert_eq!(history.push(2), None);
        assert_eq!(history.len(), 2);
        assert_eq!(history.latest(), Some(&2));
        assert_eq!(history.oldest(), Some(&1));
    }

    #[test]
    fn test_fifo_eviction_by_content() {
        let mut history = History::new(3);
        for i in 0..3 {
            history.push(i);
        }
        assert!(history.is_full());

        assert_eq!(history.push(3), Some(0));
        assert_eq!(history.push(4), Some(1));

        let contents: Vec<i32> = history.iter().copied().collect();
        assert_eq!(contents, vec![2, 3, 4]);
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let mut history = History::new(20);
        for i in 0..1_000 {
            history.push(i);
            assert!(history.len() <= 20);
        }

        let contents: Vec<i32> = history.iter().copied().collect();
        let expected: Vec<i32> = (980..1_000).collect();
        assert_eq!(contents, expected);
    }

    #[test]
    fn test_indexing_after_wrap() {
        let mut history = History::new(4);
        for i in 0..10 {
            history.push(i);
        }
        assert_eq!(history.get(0), Some(&6));
        assert_eq!(history.get(3), Some(&9));
        assert_eq!(history.get(4), None);
        assert_eq!(history.get_back(0), Some(&9));
        assert_eq!(history.get_back(1), Some(&8));
        assert_eq!(history.get_back(4), None);

        let reversed: Vec<i32> = history.iter().rev().copied().collect();
        assert_eq!(reversed, vec![9, 8, 7, 6]);
    }

    #[test]
    fn test_zero_capacity_is_bumped() {
        let mut history = History::new(0);
        assert_eq!(history.capacity(), 1);
        history.push("a");
        assert_eq!(history.push("b"), Some("a"));
        assert_eq!(history.latest(), Some(&"b"));
    }

    #[test]
    fn test_clear() {
        let mut history = History::new(2);
        history.push(1);
        history.push(2);
        history.push(3);
        history.clear();
        assert!(history.is_empty());
        history.push(7);
        assert_eq!(history.iter().copied().collect::<Vec<_>>(), vec![7]);
    }
}
