//! Sequence Barrier Implementation
//!
//! A sequence barrier tells a consumer the highest sequence it may safely
//! process: the minimum over its upstream stages' sequences, or the producer
//! cursor for a first-stage consumer, corrected for multi-producer gaps.

use crate::disruptor::{DisruptorError, Result, Sequence, Sequencer, WaitStrategy};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Coordination barrier for managing dependencies between event processors
pub trait SequenceBarrier: Send + Sync {
    /// Wait for the given sequence to become available
    ///
    /// # Arguments
    /// * `sequence` - The sequence to wait for
    ///
    /// # Returns
    /// The highest sequence that may be processed. Usually at least `sequence`,
    /// allowing the caller to drain a whole batch; it is lower only when a
    /// multi-producer gap precedes `sequence`, in which case the caller waits again.
    ///
    /// # Errors
    /// Returns `DisruptorError::Halted` if the barrier has been alerted
    fn wait_for(&self, sequence: i64) -> Result<i64>;

    /// The producer cursor this barrier tracks
    fn cursor(&self) -> &Arc<Sequence>;

    /// Check if this barrier has been alerted
    fn is_alerted(&self) -> bool;

    /// Alert this barrier and wake any thread waiting on it
    fn alert(&self);

    /// Clear the alert status
    fn clear_alert(&self);

    /// Check the alert flag
    ///
    /// # Errors
    /// Returns `DisruptorError::Halted` if the barrier has been alerted
    fn check_alert(&self) -> Result<()>;

    /// Wake threads blocked on the wait strategy after a consumer advanced
    fn signal(&self);
}

/// Standard implementation of a sequence barrier
///
/// An empty dependency list means the barrier waits on the cursor itself. The
/// cursor is the sequencer's own `Arc`, never a copy.
#[derive(Debug)]
pub struct ProcessingSequenceBarrier {
    sequencer: Arc<dyn Sequencer>,
    wait_strategy: Arc<dyn WaitStrategy>,
    dependent_sequences: Vec<Arc<Sequence>>,
    alerted: AtomicBool,
}

impl ProcessingSequenceBarrier {
    /// Create a new processing sequence barrier
    ///
    /// # Arguments
    /// * `sequencer` - The sequencer whose cursor and publication state are tracked
    /// * `dependent_sequences` - Upstream stage sequences; empty for a first stage
    pub fn new(sequencer: Arc<dyn Sequencer>, dependent_sequences: Vec<Arc<Sequence>>) -> Self {
        let wait_strategy = Arc::clone(sequencer.wait_strategy());
        Self {
            sequencer,
            wait_strategy,
            dependent_sequences,
            alerted: AtomicBool::new(false),
        }
    }

    /// The upstream sequences gating this barrier
    pub fn dependent_sequences(&self) -> &[Arc<Sequence>] {
        &self.dependent_sequences
    }
}

impl SequenceBarrier for ProcessingSequenceBarrier {
    fn wait_for(&self, sequence: i64) -> Result<i64> {
        self.check_alert()?;

        let available_sequence = self.wait_strategy.wait_for(
            sequence,
            self.sequencer.cursor(),
            &self.dependent_sequences,
            &self.alerted,
        )?;

        if available_sequence < sequence {
            return Ok(available_sequence);
        }

        Ok(self
            .sequencer
            .highest_published_sequence(sequence, available_sequence))
    }

    fn cursor(&self) -> &Arc<Sequence> {
        self.sequencer.cursor()
    }

    fn is_alerted(&self) -> bool {
        self.alerted.load(Ordering::Acquire)
    }

    fn alert(&self) {
        self.alerted.store(true, Ordering::Release);
        self.wait_strategy.signal_all_when_blocking();
    }

    fn clear_alert(&self) {
        self.alerted.store(false, Ordering::Release);
    }

    fn check_alert(&self) -> Result<()> {
        if self.is_alerted() {
            Err(DisruptorError::Halted)
        } else {
            Ok(())
        }
    }

    fn signal(&self) {
        self.wait_strategy.signal_all_when_blocking();
    }
}
