//! Sequencer Implementation
//!
//! Sequencers hand out sequence numbers to producers and publish them to
//! consumers. A claim is only granted once every gating sequence has moved
//! far enough that the claimed slots no longer hold unconsumed events, which
//! gives producers structural backpressure instead of unbounded buffering.

use crate::disruptor::{DisruptorError, Result, Sequence, WaitStrategy};
use crossbeam_utils::Backoff;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, Ordering};
use std::sync::Arc;
use std::thread;

/// An inclusive range of claimed sequences
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceRange {
    low: i64,
    high: i64,
}

impl SequenceRange {
    /// Create a range covering `low..=high`
    pub fn new(low: i64, high: i64) -> Self {
        debug_assert!(low <= high, "empty sequence range {low}..={high}");
        Self { low, high }
    }

    /// A range holding a single sequence
    pub fn single(sequence: i64) -> Self {
        Self::new(sequence, sequence)
    }

    /// First sequence of the range
    pub fn low(&self) -> i64 {
        self.low
    }

    /// Last sequence of the range
    pub fn high(&self) -> i64 {
        self.high
    }

    /// Number of sequences in the range
    pub fn len(&self) -> i64 {
        self.high - self.low + 1
    }

    /// Ranges always hold at least one sequence
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Check whether `sequence` lies in the range
    pub fn contains(&self, sequence: i64) -> bool {
        (self.low..=self.high).contains(&sequence)
    }

    /// Iterate over the sequences of the range
    pub fn iter(&self) -> std::ops::RangeInclusive<i64> {
        self.low..=self.high
    }
}

/// Trait for sequencers that coordinate access to the ring buffer
pub trait Sequencer: Send + Sync + std::fmt::Debug {
    /// The cursor shared with every barrier of this sequencer
    fn cursor(&self) -> &Arc<Sequence>;

    /// The number of slots in the ring buffer
    fn buffer_size(&self) -> usize;

    /// The wait strategy signalled on publish
    fn wait_strategy(&self) -> &Arc<dyn WaitStrategy>;

    /// Claim the next `n` sequences, waiting for consumers if the buffer is full
    ///
    /// # Errors
    /// * `DisruptorError::InvalidClaim` if `n` is not in `1..=buffer_size`
    /// * `DisruptorError::Halted` if the sequencer is halted while waiting
    fn next(&self, n: i64) -> Result<SequenceRange>;

    /// Claim the next `n` sequences without waiting
    ///
    /// # Errors
    /// * `DisruptorError::InsufficientCapacity` if the claim would overwrite unconsumed slots
    /// * `DisruptorError::InvalidClaim` if `n` is not in `1..=buffer_size`
    fn try_next(&self, n: i64) -> Result<SequenceRange>;

    /// Make a claimed, written range visible to consumers
    fn publish(&self, range: SequenceRange);

    /// Check whether a sequence has been published
    fn is_available(&self, sequence: i64) -> bool;

    /// Highest sequence in `low..=available` such that it and everything before it is published
    ///
    /// Returns `low - 1` when `low` itself is not yet published.
    fn highest_published_sequence(&self, low: i64, available: i64) -> i64;

    /// Check whether `required` more slots could be claimed right now
    fn has_available_capacity(&self, required: i64) -> bool;

    /// Number of slots that could be claimed right now
    fn remaining_capacity(&self) -> i64;

    /// Add sequences that producers must not overtake
    ///
    /// Added sequences are moved up to the current cursor so that a late
    /// consumer never gates on slots that were published before it existed.
    fn add_gating_sequences(&self, gating_sequences: &[Arc<Sequence>]);

    /// Remove a gating sequence
    ///
    /// # Returns
    /// True if the sequence was registered
    fn remove_gating_sequence(&self, sequence: &Arc<Sequence>) -> bool;

    /// Minimum over the gating sequences, or the cursor when there are none
    fn minimum_gating_sequence(&self) -> i64;

    /// Cancel every pending and future blocking claim with `DisruptorError::Halted`
    fn halt(&self);

    /// Check whether `halt` has been called
    fn is_halted(&self) -> bool;
}

/// State shared by both sequencer flavours
#[derive(Debug)]
struct SequencerCore {
    buffer_size: usize,
    wait_strategy: Arc<dyn WaitStrategy>,
    cursor: Arc<Sequence>,
    gating_sequences: RwLock<Vec<Arc<Sequence>>>,
    halted: AtomicBool,
}

impl SequencerCore {
    fn new(buffer_size: usize, wait_strategy: Arc<dyn WaitStrategy>) -> Self {
        assert!(
            crate::disruptor::is_power_of_two(buffer_size),
            "Buffer size must be a power of 2"
        );
        Self {
            buffer_size,
            wait_strategy,
            cursor: Arc::new(Sequence::default()),
            gating_sequences: RwLock::new(Vec::new()),
            halted: AtomicBool::new(false),
        }
    }

    fn check_claim(&self, n: i64) -> Result<()> {
        if n < 1 || n > self.buffer_size as i64 {
            return Err(DisruptorError::InvalidClaim {
                requested: n,
                capacity: self.buffer_size,
            });
        }
        Ok(())
    }

    fn minimum_gating(&self, default: i64) -> i64 {
        Sequence::minimum_sequence(&self.gating_sequences.read(), default)
    }

    fn add_gating_sequences(&self, gating_sequences: &[Arc<Sequence>]) {
        let mut sequences = self.gating_sequences.write();
        let cursor = self.cursor.get();
        for sequence in gating_sequences {
            sequence.set(cursor);
            sequences.push(Arc::clone(sequence));
        }
    }

    fn remove_gating_sequence(&self, sequence: &Arc<Sequence>) -> bool {
        let mut sequences = self.gating_sequences.write();
        match sequences.iter().position(|s| Arc::ptr_eq(s, sequence)) {
            Some(pos) => {
                sequences.remove(pos);
                true
            }
            None => false,
        }
    }

    /// One step of producer back-off while the buffer is full
    fn wait_for_consumers(&self, backoff: &Backoff) -> Result<()> {
        if self.halted.load(Ordering::Acquire) {
            return Err(DisruptorError::Halted);
        }
        if backoff.is_completed() {
            thread::yield_now();
        } else {
            backoff.snooze();
        }
        Ok(())
    }

    fn halt(&self) {
        self.halted.store(true, Ordering::Release);
    }

    fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }
}

/// Single producer sequencer
///
/// Only one thread may claim from this sequencer. The claim counter is private
/// to that thread, so claiming needs no read-modify-write, and publishing is a
/// plain release store of the cursor.
#[derive(Debug)]
pub struct SingleProducerSequencer {
    core: SequencerCore,
    /// Highest claimed sequence, touched only by the producer thread
    next_value: AtomicI64,
    /// Last observed gating minimum, touched only by the producer thread
    cached_value: AtomicI64,
}

impl SingleProducerSequencer {
    /// Create a new single producer sequencer
    ///
    /// # Arguments
    /// * `buffer_size` - The size of the ring buffer (must be a power of 2)
    /// * `wait_strategy` - The wait strategy signalled on publish
    ///
    /// # Panics
    /// Panics if buffer_size is not a power of 2
    pub fn new(buffer_size: usize, wait_strategy: Arc<dyn WaitStrategy>) -> Self {
        Self {
            core: SequencerCore::new(buffer_size, wait_strategy),
            next_value: AtomicI64::new(crate::disruptor::INITIAL_CURSOR_VALUE),
            cached_value: AtomicI64::new(crate::disruptor::INITIAL_CURSOR_VALUE),
        }
    }

    fn has_capacity(&self, required: i64) -> bool {
        let next_value = self.next_value.load(Ordering::Relaxed);
        let wrap_point = next_value + required - self.core.buffer_size as i64;
        let cached_gating_sequence = self.cached_value.load(Ordering::Relaxed);

        if wrap_point > cached_gating_sequence || cached_gating_sequence > next_value {
            let min_sequence = self.core.minimum_gating(next_value);
            self.cached_value.store(min_sequence, Ordering::Relaxed);
            if wrap_point > min_sequence {
                return false;
            }
        }
        true
    }
}

impl Sequencer for SingleProducerSequencer {
    fn cursor(&self) -> &Arc<Sequence> {
        &self.core.cursor
    }

    fn buffer_size(&self) -> usize {
        self.core.buffer_size
    }

    fn wait_strategy(&self) -> &Arc<dyn WaitStrategy> {
        &self.core.wait_strategy
    }

    fn next(&self, n: i64) -> Result<SequenceRange> {
        self.core.check_claim(n)?;

        let next_value = self.next_value.load(Ordering::Relaxed);
        let next_sequence = next_value + n;
        let wrap_point = next_sequence - self.core.buffer_size as i64;
        let cached_gating_sequence = self.cached_value.load(Ordering::Relaxed);

        if wrap_point > cached_gating_sequence || cached_gating_sequence > next_value {
            let backoff = Backoff::new();
            let min_sequence = loop {
                let min_sequence = self.core.minimum_gating(next_value);
                if wrap_point <= min_sequence {
                    break min_sequence;
                }
                self.core.wait_for_consumers(&backoff)?;
            };
            self.cached_value.store(min_sequence, Ordering::Relaxed);
        }

        self.next_value.store(next_sequence, Ordering::Relaxed);
        Ok(SequenceRange::new(next_sequence - n + 1, next_sequence))
    }

    fn try_next(&self, n: i64) -> Result<SequenceRange> {
        self.core.check_claim(n)?;

        if !self.has_capacity(n) {
            return Err(DisruptorError::InsufficientCapacity);
        }

        let next_sequence = self.next_value.load(Ordering::Relaxed) + n;
        self.next_value.store(next_sequence, Ordering::Relaxed);
        Ok(SequenceRange::new(next_sequence - n + 1, next_sequence))
    }

    fn publish(&self, range: SequenceRange) {
        self.core.cursor.set(range.high());
        self.core.wait_strategy.signal_all_when_blocking();
    }

    fn is_available(&self, sequence: i64) -> bool {
        let current = self.core.cursor.get();
        sequence <= current && sequence > current - self.core.buffer_size as i64
    }

    fn highest_published_sequence(&self, _low: i64, available: i64) -> i64 {
        available
    }

    fn has_available_capacity(&self, required: i64) -> bool {
        self.has_capacity(required)
    }

    fn remaining_capacity(&self) -> i64 {
        let next_value = self.next_value.load(Ordering::Relaxed);
        let consumed = self.core.minimum_gating(next_value);
        self.core.buffer_size as i64 - (next_value - consumed)
    }

    fn add_gating_sequences(&self, gating_sequences: &[Arc<Sequence>]) {
        self.core.add_gating_sequences(gating_sequences);
    }

    fn remove_gating_sequence(&self, sequence: &Arc<Sequence>) -> bool {
        self.core.remove_gating_sequence(sequence)
    }

    fn minimum_gating_sequence(&self) -> i64 {
        self.core.minimum_gating(self.core.cursor.get())
    }

    fn halt(&self) {
        self.core.halt();
    }

    fn is_halted(&self) -> bool {
        self.core.is_halted()
    }
}

/// Multi producer sequencer
///
/// Claims are granted by compare-and-set on the cursor, so the cursor is the
/// highest *claimed* sequence and says nothing about which writes finished.
/// Publication is recorded per slot in `available_buffer`: the slot for `s`
/// holds `s >> log2(buffer_size)`, the number of times the ring has wrapped,
/// once `s` is published. Barriers scan those flags to find the highest
/// contiguous published sequence.
#[derive(Debug)]
pub struct MultiProducerSequencer {
    core: SequencerCore,
    available_buffer: Box<[AtomicI32]>,
    index_mask: usize,
    index_shift: u32,
    gating_sequence_cache: Sequence,
}

impl MultiProducerSequencer {
    /// Create a new multi producer sequencer
    ///
    /// # Arguments
    /// * `buffer_size` - The size of the ring buffer (must be a power of 2)
    /// * `wait_strategy` - The wait strategy signalled on publish
    ///
    /// # Panics
    /// Panics if buffer_size is not a power of 2
    pub fn new(buffer_size: usize, wait_strategy: Arc<dyn WaitStrategy>) -> Self {
        let core = SequencerCore::new(buffer_size, wait_strategy);
        let available_buffer: Box<[AtomicI32]> =
            (0..buffer_size).map(|_| AtomicI32::new(-1)).collect();

        Self {
            core,
            available_buffer,
            index_mask: buffer_size - 1,
            index_shift: buffer_size.trailing_zeros(),
            gating_sequence_cache: Sequence::default(),
        }
    }

    #[inline]
    fn calculate_index(&self, sequence: i64) -> usize {
        (sequence as usize) & self.index_mask
    }

    #[inline]
    fn calculate_availability_flag(&self, sequence: i64) -> i32 {
        (sequence >> self.index_shift) as i32
    }

    fn set_available(&self, sequence: i64) {
        let index = self.calculate_index(sequence);
        let flag = self.calculate_availability_flag(sequence);
        self.available_buffer[index].store(flag, Ordering::Release);
    }

    fn has_capacity(&self, required: i64, cursor_value: i64) -> bool {
        let wrap_point = cursor_value + required - self.core.buffer_size as i64;
        let cached_gating_sequence = self.gating_sequence_cache.get();

        if wrap_point > cached_gating_sequence || cached_gating_sequence > cursor_value {
            let min_sequence = self.core.minimum_gating(cursor_value);
            self.gating_sequence_cache.set(min_sequence);
            if wrap_point > min_sequence {
                return false;
            }
        }
        true
    }
}

impl Sequencer for MultiProducerSequencer {
    fn cursor(&self) -> &Arc<Sequence> {
        &self.core.cursor
    }

    fn buffer_size(&self) -> usize {
        self.core.buffer_size
    }

    fn wait_strategy(&self) -> &Arc<dyn WaitStrategy> {
        &self.core.wait_strategy
    }

    fn next(&self, n: i64) -> Result<SequenceRange> {
        self.core.check_claim(n)?;

        let backoff = Backoff::new();
        loop {
            let current = self.core.cursor.get();
            let next = current + n;
            let wrap_point = next - self.core.buffer_size as i64;
            let cached_gating_sequence = self.gating_sequence_cache.get();

            if wrap_point > cached_gating_sequence || cached_gating_sequence > current {
                let gating_sequence = self.core.minimum_gating(current);
                if wrap_point > gating_sequence {
                    self.core.wait_for_consumers(&backoff)?;
                    continue;
                }
                self.gating_sequence_cache.set(gating_sequence);
            } else if self.core.cursor.compare_and_set(current, next) {
                return Ok(SequenceRange::new(current + 1, next));
            }
        }
    }

    fn try_next(&self, n: i64) -> Result<SequenceRange> {
        self.core.check_claim(n)?;

        loop {
            let current = self.core.cursor.get();
            let next = current + n;
            if !self.has_capacity(n, current) {
                return Err(DisruptorError::InsufficientCapacity);
            }
            if self.core.cursor.compare_and_set(current, next) {
                return Ok(SequenceRange::new(current + 1, next));
            }
        }
    }

    fn publish(&self, range: SequenceRange) {
        for sequence in range.iter() {
            self.set_available(sequence);
        }
        self.core.wait_strategy.signal_all_when_blocking();
    }

    fn is_available(&self, sequence: i64) -> bool {
        let index = self.calculate_index(sequence);
        let flag = self.calculate_availability_flag(sequence);
        self.available_buffer[index].load(Ordering::Acquire) == flag
    }

    fn highest_published_sequence(&self, low: i64, available: i64) -> i64 {
        for sequence in low..=available {
            if !self.is_available(sequence) {
                return sequence - 1;
            }
        }
        available
    }

    fn has_available_capacity(&self, required: i64) -> bool {
        self.has_capacity(required, self.core.cursor.get())
    }

    fn remaining_capacity(&self) -> i64 {
        let produced = self.core.cursor.get();
        let consumed = self.core.minimum_gating(produced);
        self.core.buffer_size as i64 - (produced - consumed)
    }

    fn add_gating_sequences(&self, gating_sequences: &[Arc<Sequence>]) {
        self.core.add_gating_sequences(gating_sequences);
    }

    fn remove_gating_sequence(&self, sequence: &Arc<Sequence>) -> bool {
        self.core.remove_gating_sequence(sequence)
    }

    fn minimum_gating_sequence(&self) -> i64 {
        self.core.minimum_gating(self.core.cursor.get())
    }

    fn halt(&self) {
        self.core.halt();
    }

    fn is_halted(&self) -> bool {
        self.core.is_halted()
    }
}
