//! Ring Buffer Implementation
//!
//! This module provides the pre-allocated circular array of event slots. The
//! buffer itself holds no locks: every access is made safe by the sequence
//! gating protocol enforced by the sequencer and the sequence barriers.

use crate::disruptor::{is_power_of_two, DisruptorError, EventFactory, Result};
use std::cell::UnsafeCell;

/// The core ring buffer for storing events
///
/// The slot for sequence `s` is `s & (capacity - 1)`. Ownership of a slot
/// moves from the claiming producer to the consumers when its sequence is
/// published, and back to producers once every gating consumer has passed it.
///
/// # Type Parameters
/// * `T` - The event type stored in the buffer
pub struct RingBuffer<T> {
    slots: Box<[UnsafeCell<T>]>,
    index_mask: i64,
}

impl<T> RingBuffer<T> {
    /// Create a new ring buffer with the specified capacity and event factory
    ///
    /// # Arguments
    /// * `capacity` - The number of slots (must be a power of 2)
    /// * `event_factory` - Factory for creating events to pre-populate the buffer
    ///
    /// # Errors
    /// Returns `DisruptorError::InvalidCapacity` if capacity is not a power of 2
    pub fn new<F>(capacity: usize, event_factory: F) -> Result<Self>
    where
        F: EventFactory<T>,
    {
        if !is_power_of_two(capacity) {
            return Err(DisruptorError::InvalidCapacity(capacity));
        }

        let slots: Box<[UnsafeCell<T>]> = (0..capacity)
            .map(|_| UnsafeCell::new(event_factory.new_instance()))
            .collect();

        Ok(Self {
            slots,
            index_mask: (capacity - 1) as i64,
        })
    }

    /// Slot index for a sequence
    #[inline]
    pub fn index_of(&self, sequence: i64) -> usize {
        (sequence & self.index_mask) as usize
    }

    /// Get a shared reference to the event at the specified sequence
    ///
    /// # Safety
    /// `sequence` must have been published and must not yet be reclaimable by a
    /// producer, i.e. the caller's own sequence must still gate the producers.
    #[inline]
    pub unsafe fn get(&self, sequence: i64) -> &T {
        let slot = self.slots.get_unchecked(self.index_of(sequence));
        &*slot.get()
    }

    /// Get a mutable reference to the event at the specified sequence
    ///
    /// # Safety
    /// The caller must hold a claim on `sequence` that has not been published
    /// yet. No other reference to the slot may exist while the returned one
    /// is alive.
    #[allow(clippy::mut_from_ref)]
    #[inline]
    pub unsafe fn get_mut(&self, sequence: i64) -> &mut T {
        let slot = self.slots.get_unchecked(self.index_of(sequence));
        &mut *slot.get()
    }

    /// Get the number of slots
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

impl<T> std::fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity())
            .finish()
    }
}

// SAFETY: slots are only reached through `get`/`get_mut`, whose contracts hand
// a slot to exactly one writer or to readers only, ordered by sequence
// release/acquire pairs.
unsafe impl<T: Send> Send for RingBuffer<T> {}
unsafe impl<T: Send + Sync> Sync for RingBuffer<T> {}
