//! Producer handle
//!
//! A `Producer` couples the claim/publish protocol of a sequencer with slot
//! access on the ring buffer: claim, let the caller write the slot, publish.
//! Handles are not `Clone`; in multi-producer mode every publishing thread
//! asks the disruptor for its own handle.

use crate::disruptor::{DisruptorError, Result, RingBuffer, SequenceRange, Sequencer};
use std::sync::Arc;

/// Publishes events into a ring buffer
///
/// # Type Parameters
/// * `T` - The event type stored in the buffer
pub struct Producer<T> {
    sequencer: Arc<dyn Sequencer>,
    ring_buffer: Arc<RingBuffer<T>>,
}

impl<T> Producer<T>
where
    T: Send + Sync,
{
    pub(crate) fn new(sequencer: Arc<dyn Sequencer>, ring_buffer: Arc<RingBuffer<T>>) -> Self {
        Self {
            sequencer,
            ring_buffer,
        }
    }

    /// Claim one slot, waiting for consumers if the buffer is full, write it and publish it
    ///
    /// # Arguments
    /// * `write` - Receives the slot and its sequence
    ///
    /// # Returns
    /// The published sequence
    ///
    /// # Errors
    /// Returns `DisruptorError::Halted` if the disruptor has shut down, or shuts
    /// down while waiting
    pub fn publish<F>(&mut self, write: F) -> Result<i64>
    where
        F: FnOnce(&mut T, i64),
    {
        self.check_halted()?;
        let range = self.sequencer.next(1)?;
        self.write_and_publish_one(range, write);
        Ok(range.low())
    }

    /// Like `publish`, but fails instead of waiting when the buffer is full
    ///
    /// # Errors
    /// Returns `DisruptorError::InsufficientCapacity` if no slot is free; the
    /// write function is not called and nothing becomes visible to consumers.
    pub fn try_publish<F>(&mut self, write: F) -> Result<i64>
    where
        F: FnOnce(&mut T, i64),
    {
        self.check_halted()?;
        let range = self.sequencer.try_next(1)?;
        self.write_and_publish_one(range, write);
        Ok(range.low())
    }

    /// Claim `n` consecutive slots, write each of them and publish them together
    ///
    /// # Errors
    /// * `DisruptorError::InvalidClaim` if `n` is zero or exceeds the capacity
    /// * `DisruptorError::Halted` if the disruptor shuts down while waiting
    pub fn publish_batch<F>(&mut self, n: usize, write: F) -> Result<SequenceRange>
    where
        F: FnMut(&mut T, i64),
    {
        self.check_halted()?;
        let range = self.sequencer.next(n as i64)?;
        self.write_and_publish_batch(range, write);
        Ok(range)
    }

    /// Like `publish_batch`, but fails instead of waiting when the buffer is full
    ///
    /// # Errors
    /// * `DisruptorError::InsufficientCapacity` if fewer than `n` slots are free
    /// * `DisruptorError::InvalidClaim` if `n` is zero or exceeds the capacity
    pub fn try_publish_batch<F>(&mut self, n: usize, write: F) -> Result<SequenceRange>
    where
        F: FnMut(&mut T, i64),
    {
        self.check_halted()?;
        let range = self.sequencer.try_next(n as i64)?;
        self.write_and_publish_batch(range, write);
        Ok(range)
    }

    /// Number of slots that could be claimed right now
    pub fn remaining_capacity(&self) -> i64 {
        self.sequencer.remaining_capacity()
    }

    fn check_halted(&self) -> Result<()> {
        if self.sequencer.is_halted() {
            return Err(DisruptorError::Halted);
        }
        Ok(())
    }

    fn write_and_publish_one<F>(&mut self, range: SequenceRange, write: F)
    where
        F: FnOnce(&mut T, i64),
    {
        let sequence = range.low();
        // SAFETY: `sequence` is claimed by this producer and unpublished.
        let slot = unsafe { self.ring_buffer.get_mut(sequence) };
        write(slot, sequence);
        self.sequencer.publish(range);
    }

    fn write_and_publish_batch<F>(&mut self, range: SequenceRange, mut write: F)
    where
        F: FnMut(&mut T, i64),
    {
        for sequence in range.iter() {
            // SAFETY: the whole range is claimed by this producer and unpublished.
            let slot = unsafe { self.ring_buffer.get_mut(sequence) };
            write(slot, sequence);
        }
        self.sequencer.publish(range);
    }
}

impl<T> std::fmt::Debug for Producer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Producer")
            .field("cursor", &self.sequencer.cursor().get())
            .field("buffer_size", &self.sequencer.buffer_size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disruptor::{
        BusySpinWaitStrategy, MultiProducerSequencer, Sequence,
        SingleProducerSequencer,
    };

    fn producer(size: usize, multi: bool) -> (Producer<i64>, Arc<dyn Sequencer>, Arc<RingBuffer<i64>>) {
        let wait_strategy = Arc::new(BusySpinWaitStrategy::new());
        let sequencer: Arc<dyn Sequencer> = if multi {
            Arc::new(MultiProducerSequencer::new(size, wait_strategy))
        } else {
            Arc::new(SingleProducerSequencer::new(size, wait_strategy))
        };
        let ring_buffer = Arc::new(RingBuffer::new(size, || -1i64).unwrap());
        (
            Producer::new(Arc::clone(&sequencer), Arc::clone(&ring_buffer)),
            sequencer,
            ring_buffer,
        )
    }

    #[test]
    fn test_publish_writes_slot_and_moves_cursor() {
        for multi in [false, true] {
            let (mut producer, sequencer, ring_buffer) = producer(8, multi);

            let sequence = producer.publish(|slot, seq| *slot = seq * 100).unwrap();
            assert_eq!(sequence, 0);
            assert_eq!(sequencer.cursor().get(), 0);
            assert!(sequencer.is_available(0));
            assert_eq!(unsafe { *ring_buffer.get(0) }, 0);

            producer.publish(|slot, seq| *slot = seq * 100).unwrap();
            assert_eq!(unsafe { *ring_buffer.get(1) }, 100);
        }
    }

    #[test]
    fn test_publish_batch_writes_every_slot() {
        let (mut producer, sequencer, ring_buffer) = producer(8, true);
        let range = producer.publish_batch(4, |slot, seq| *slot = seq + 1).unwrap();

        assert_eq!(range, SequenceRange::new(0, 3));
        assert_eq!(sequencer.highest_published_sequence(0, 3), 3);
        let values: Vec<i64> = (0..4).map(|s| unsafe { *ring_buffer.get(s) }).collect();
        assert_eq!(values, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_try_publish_full_buffer_leaves_state_untouched() {
        let (mut producer, sequencer, ring_buffer) = producer(4, false);
        let consumer = Arc::new(Sequence::default());
        sequencer.add_gating_sequences(&[Arc::clone(&consumer)]);

        for _ in 0..4 {
            producer.try_publish(|slot, seq| *slot = seq).unwrap();
        }

        let mut called = false;
        let result = producer.try_publish(|slot, _| {
            called = true;
            *slot = 999;
        });
        assert!(matches!(result, Err(DisruptorError::InsufficientCapacity)));
        assert!(!called);
        assert_eq!(sequencer.cursor().get(), 3);
        assert_eq!(unsafe { *ring_buffer.get(0) }, 0);

        assert!(matches!(
            producer.try_publish_batch(2, |_, _| {}),
            Err(DisruptorError::InsufficientCapacity)
        ));

        consumer.set(1);
        assert_eq!(producer.remaining_capacity(), 2);
        let range = producer.try_publish_batch(2, |slot, seq| *slot = seq).unwrap();
        assert_eq!(range, SequenceRange::new(4, 5));
    }

    #[test]
    fn test_halted_sequencer_refuses_publication() {
        let (mut producer, sequencer, _) = producer(8, true);
        sequencer.halt();
        assert!(matches!(producer.publish(|_, _| {}), Err(DisruptorError::Halted)));
        assert!(matches!(producer.try_publish(|_, _| {}), Err(DisruptorError::Halted)));
        assert_eq!(sequencer.cursor().get(), -1);
    }

    #[test]
    fn test_oversized_batch_is_rejected() {
        let (mut producer, _, _) = producer(4, false);
        assert!(matches!(
            producer.publish_batch(5, |_, _| {}),
            Err(DisruptorError::InvalidClaim { requested: 5, capacity: 4 })
        ));
    }
}
