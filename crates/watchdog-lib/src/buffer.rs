//! Bounded newest-first history
//!
//! Used for the sampler's sample history and the collector's heartbeat
//! intervals. Index 0 is always the most recent insert; once the buffer
//! is full the oldest entry (the tail) is dropped.

use serde::Serialize;
use std::collections::VecDeque;

/// Default capacity for both sample and heartbeat histories
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Ring buffer that keeps the newest entry at the front
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct RingBuffer<T> {
    #[serde(skip)]
    capacity: usize,
    buffer: VecDeque<T>,
}

impl<T> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            buffer: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    /// Insert at the front, evicting the tail when over capacity.
    /// Returns the evicted entry, if any.
    pub fn push_front(&mut self, item: T) -> Option<T> {
        self.buffer.push_front(item);
        if self.buffer.len() > self.capacity {
            self.buffer.pop_back()
        } else {
            None
        }
    }

    /// Most recent entry
    pub fn front(&self) -> Option<&T> {
        self.buffer.front()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.buffer.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.buffer.iter()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Whole contents, newest first
    pub fn snapshot(&self) -> Vec<T> {
        self.buffer.iter().cloned().collect()
    }
}

impl<T> Default for RingBuffer<T> {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newest_entry_at_front() {
        let mut buffer = RingBuffer::new(3);
        buffer.push_front(1);
        buffer.push_front(2);
        buffer.push_front(3);

        assert_eq!(buffer.front(), Some(&3));
        assert_eq!(buffer.snapshot(), vec![3, 2, 1]);
    }

    #[test]
    fn test_evicts_oldest_when_full() {
        let mut buffer = RingBuffer::new(3);
        for i in 0..3 {
            assert!(buffer.push_front(i).is_none());
        }

        let evicted = buffer.push_front(3);
        assert_eq!(evicted, Some(0));
        assert_eq!(buffer.snapshot(), vec![3, 2, 1]);
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let mut buffer = RingBuffer::default();
        for i in 0..250 {
            buffer.push_front(i);
            assert!(buffer.len() <= DEFAULT_HISTORY_CAPACITY);
            assert_eq!(buffer.front(), Some(&i));
        }

        assert_eq!(buffer.len(), DEFAULT_HISTORY_CAPACITY);
        assert_eq!(buffer.get(99), Some(&150));
    }

    #[test]
    fn test_serializes_as_plain_list() {
        let mut buffer = RingBuffer::new(2);
        buffer.push_front("a");
        buffer.push_front("b");

        let json = serde_json::to_string(&buffer).unwrap();
        assert_eq!(json, r#"["b","a"]"#);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut buffer = RingBuffer::new(0);
        buffer.push_front(1);
        buffer.push_front(2);
        assert_eq!(buffer.snapshot(), vec![2]);
    }
}
