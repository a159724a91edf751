//! Sequence implementation for the Disruptor
//!
//! The Sequence is used to track progress through the ring buffer and coordinate
//! between producers and consumers. Writes publish with release ordering and reads
//! observe with acquire ordering, so a consumer that sees an advanced sequence also
//! sees every slot write that preceded it.

use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// A sequence number padded to its own cache line
///
/// `CachePadded` keeps neighbouring sequences (the cursor and the consumer
/// sequences that live next to it in memory) from false sharing.
pub struct Sequence {
    value: CachePadded<AtomicI64>,
}

impl Sequence {
    /// Create a new sequence with the given initial value
    pub fn new(initial_value: i64) -> Self {
        Self {
            value: CachePadded::new(AtomicI64::new(initial_value)),
        }
    }

    /// Get the current sequence value
    #[inline]
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }

    /// Set the sequence value
    #[inline]
    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Release);
    }

    /// Atomically replace `expected` with `new`
    ///
    /// # Returns
    /// True if the value was `expected` and has been replaced
    #[inline]
    pub fn compare_and_set(&self, expected: i64, new: i64) -> bool {
        self.value
            .compare_exchange(expected, new, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Increment and get the new value
    #[inline]
    pub fn increment_and_get(&self) -> i64 {
        self.add_and_get(1)
    }

    /// Add a value and get the new result
    #[inline]
    pub fn add_and_get(&self, increment: i64) -> i64 {
        self.value.fetch_add(increment, Ordering::AcqRel) + increment
    }

    /// Get the minimum value over a set of sequences
    ///
    /// # Arguments
    /// * `sequences` - The sequences to inspect
    /// * `default` - Returned when `sequences` is empty
    pub fn minimum_sequence(sequences: &[Arc<Sequence>], default: i64) -> i64 {
        sequences
            .iter()
            .map(|sequence| sequence.get())
            .min()
            .unwrap_or(default)
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new(crate::disruptor::INITIAL_CURSOR_VALUE)
    }
}

impl std::fmt::Debug for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequence")
            .field("value", &self.get())
            .finish()
    }
}

impl std::fmt::Display for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_sequence_default() {
        let seq = Sequence::default();
        assert_eq!(seq.get(), crate::disruptor::INITIAL_CURSOR_VALUE);
    }

    #[test]
    fn test_sequence_set_get() {
        let seq = Sequence::new(0);
        seq.set(100);
        assert_eq!(seq.get(), 100);
    }

    #[test]
    fn test_sequence_increment() {
        let seq = Sequence::new(-1);
        assert_eq!(seq.increment_and_get(), 0);
        assert_eq!(seq.add_and_get(5), 5);
        assert_eq!(seq.get(), 5);
    }

    #[test]
    fn test_sequence_compare_and_set() {
        let seq = Sequence::new(10);

        assert!(seq.compare_and_set(10, 20));
        assert_eq!(seq.get(), 20);

        assert!(!seq.compare_and_set(10, 30));
        assert_eq!(seq.get(), 20);
    }

    #[test]
    fn test_minimum_sequence() {
        let sequences = vec![
            Arc::new(Sequence::new(10)),
            Arc::new(Sequence::new(5)),
            Arc::new(Sequence::new(20)),
        ];
        assert_eq!(Sequence::minimum_sequence(&sequences, i64::MAX), 5);
        assert_eq!(Sequence::minimum_sequence(&[], 42), 42);
    }

    #[test]
    fn test_sequence_is_cache_padded() {
        assert!(std::mem::size_of::<Sequence>() >= 64);
    }

    #[test]
    fn test_sequence_thread_safety() {
        let seq = Arc::new(Sequence::new(0));
        let mut handles = vec![];

        for _ in 0..10 {
            let seq_clone = Arc::clone(&seq);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    seq_clone.increment_and_get();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(seq.get(), 10000);
    }
}
