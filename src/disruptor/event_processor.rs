//! Event processor implementation for the Disruptor
//!
//! An event processor is the run loop of one consumer stage. It waits on its
//! sequence barrier, hands every available event to its handler and then
//! advances its own sequence, which in turn releases downstream stages and,
//! for terminal stages, the producers.

use crate::disruptor::{
    DisruptorError, ErrorPolicy, EventHandler, ExceptionHandler, LoggingExceptionHandler,
    Result, RingBuffer, Sequence, SequenceBarrier,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Lifecycle of an event processor
///
/// `Idle → Running → Halting → Stopped`. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ProcessorState {
    /// Created but not yet running
    Idle = 0,
    /// Inside `run`, consuming events
    Running = 1,
    /// Asked to stop; the loop exits at its next check
    Halting = 2,
    /// `run` has returned
    Stopped = 3,
}

impl ProcessorState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ProcessorState::Idle,
            1 => ProcessorState::Running,
            2 => ProcessorState::Halting,
            _ => ProcessorState::Stopped,
        }
    }
}

/// When a processor publishes its progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceReporting {
    /// Advance the sequence once per batch
    #[default]
    EndOfBatch,
    /// Advance the sequence after every event
    EveryEvent,
}

#[derive(Debug)]
struct StateCell(AtomicU8);

impl StateCell {
    fn new() -> Self {
        Self(AtomicU8::new(ProcessorState::Idle as u8))
    }

    fn load(&self) -> ProcessorState {
        ProcessorState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn store(&self, state: ProcessorState) {
        self.0.store(state as u8, Ordering::Release);
    }

    fn transition(&self, from: ProcessorState, to: ProcessorState) -> std::result::Result<(), ProcessorState> {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(ProcessorState::from_u8)
    }

    fn request_halt(&self) {
        let _ = self.0.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
            match ProcessorState::from_u8(current) {
                ProcessorState::Idle | ProcessorState::Running => {
                    Some(ProcessorState::Halting as u8)
                }
                _ => None,
            }
        });
    }
}

/// Trait for event processors
pub trait EventProcessor: Send {
    /// Get the sequence being tracked by this processor
    fn sequence(&self) -> &Arc<Sequence>;

    /// Ask the processor to stop and wake it if it is waiting
    fn halt(&self);

    /// Current lifecycle state
    fn state(&self) -> ProcessorState;

    /// Check if the processor is running
    fn is_running(&self) -> bool {
        self.state() == ProcessorState::Running
    }

    /// Run the event processor on the calling thread until halted
    ///
    /// # Errors
    /// * `DisruptorError::AlreadyRunning` if the processor has already been run
    /// * `DisruptorError::HandlerFailed` if a handler failed under `ErrorPolicy::HaltOnError`
    fn run(&mut self) -> Result<()>;
}

/// Control surface of a processor that has been moved onto its own thread
#[derive(Clone)]
pub struct ProcessorHandle {
    name: Arc<str>,
    sequence: Arc<Sequence>,
    barrier: Arc<dyn SequenceBarrier>,
    state: Arc<StateCell>,
}

impl std::fmt::Debug for ProcessorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorHandle")
            .field("name", &self.name)
            .field("sequence", &self.sequence)
            .field("state", &self.state())
            .finish()
    }
}

impl ProcessorHandle {
    /// Stage name of the processor
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The processor's sequence
    pub fn sequence(&self) -> &Arc<Sequence> {
        &self.sequence
    }

    /// Current lifecycle state
    pub fn state(&self) -> ProcessorState {
        self.state.load()
    }

    /// Ask the processor to stop and wake it if it is waiting
    pub fn halt(&self) {
        self.state.request_halt();
        self.barrier.alert();
    }
}

/// Batch event processor that drains every available event per wake-up
///
/// # Type Parameters
/// * `T` - The event type
/// * `H` - The handler driven by this processor
pub struct BatchEventProcessor<T, H>
where
    T: Send + Sync,
    H: EventHandler<T>,
{
    name: Arc<str>,
    sequence: Arc<Sequence>,
    barrier: Arc<dyn SequenceBarrier>,
    ring_buffer: Arc<RingBuffer<T>>,
    event_handler: H,
    exception_handler: Arc<dyn ExceptionHandler<T>>,
    error_policy: ErrorPolicy,
    sequence_reporting: SequenceReporting,
    state: Arc<StateCell>,
}

impl<T, H> BatchEventProcessor<T, H>
where
    T: Send + Sync,
    H: EventHandler<T>,
{
    /// Create a new batch event processor
    ///
    /// # Arguments
    /// * `name` - Stage name, used for logging
    /// * `ring_buffer` - The buffer events are read from
    /// * `barrier` - The barrier gating this stage
    /// * `event_handler` - The handler invoked for each event
    pub fn new(
        name: impl Into<Arc<str>>,
        ring_buffer: Arc<RingBuffer<T>>,
        barrier: Arc<dyn SequenceBarrier>,
        event_handler: H,
    ) -> Self {
        Self {
            name: name.into(),
            sequence: Arc::new(Sequence::default()),
            barrier,
            ring_buffer,
            event_handler,
            exception_handler: Arc::new(LoggingExceptionHandler::new()),
            error_policy: ErrorPolicy::default(),
            sequence_reporting: SequenceReporting::default(),
            state: Arc::new(StateCell::new()),
        }
    }

    /// Replace the default logging exception handler
    pub fn with_exception_handler(mut self, exception_handler: Arc<dyn ExceptionHandler<T>>) -> Self {
        self.exception_handler = exception_handler;
        self
    }

    /// Set what happens after a handler error
    pub fn with_error_policy(mut self, error_policy: ErrorPolicy) -> Self {
        self.error_policy = error_policy;
        self
    }

    /// Set how often the processor advances its sequence
    pub fn with_sequence_reporting(mut self, sequence_reporting: SequenceReporting) -> Self {
        self.sequence_reporting = sequence_reporting;
        self
    }

    /// Stage name of this processor
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A handle that can observe and halt the processor from another thread
    pub fn handle(&self) -> ProcessorHandle {
        ProcessorHandle {
            name: Arc::clone(&self.name),
            sequence: Arc::clone(&self.sequence),
            barrier: Arc::clone(&self.barrier),
            state: Arc::clone(&self.state),
        }
    }

    fn advance_to(&self, sequence: i64) {
        self.sequence.set(sequence);
        self.barrier.signal();
    }

    fn process_events(&mut self) -> Result<()> {
        let mut next_sequence = self.sequence.get() + 1;

        loop {
            if self.state.load() != ProcessorState::Running {
                return Ok(());
            }

            let available_sequence = match self.barrier.wait_for(next_sequence) {
                Ok(sequence) => sequence,
                Err(DisruptorError::Halted) => return Ok(()),
                Err(e) => return Err(e),
            };

            if available_sequence < next_sequence {
                std::hint::spin_loop();
                continue;
            }

            for sequence in next_sequence..=available_sequence {
                let end_of_batch = sequence == available_sequence;
                // SAFETY: the barrier reported `sequence` as published and
                // producers cannot reclaim it before this stage advances.
                let event = unsafe { self.ring_buffer.get(sequence) };

                if let Err(error) = self.event_handler.on_event(event, sequence, end_of_batch) {
                    self.exception_handler
                        .handle_event_exception(&error, sequence, event);

                    if self.error_policy == ErrorPolicy::HaltOnError {
                        self.advance_to(sequence);
                        self.state.store(ProcessorState::Halting);
                        return Err(DisruptorError::HandlerFailed {
                            sequence,
                            message: format!("{error:#}"),
                        });
                    }
                }

                if self.sequence_reporting == SequenceReporting::EveryEvent {
                    self.advance_to(sequence);
                }
            }

            if self.sequence_reporting == SequenceReporting::EndOfBatch {
                self.advance_to(available_sequence);
            }
            next_sequence = available_sequence + 1;
        }
    }

    fn notify_start(&mut self) {
        if let Err(error) = self.event_handler.on_start() {
            self.exception_handler.handle_on_start_exception(&error);
        }
    }

    fn notify_shutdown(&mut self) {
        if let Err(error) = self.event_handler.on_shutdown() {
            self.exception_handler.handle_on_shutdown_exception(&error);
        }
    }
}

impl<T, H> EventProcessor for BatchEventProcessor<T, H>
where
    T: Send + Sync,
    H: EventHandler<T>,
{
    fn sequence(&self) -> &Arc<Sequence> {
        &self.sequence
    }

    fn halt(&self) {
        self.state.request_halt();
        self.barrier.alert();
    }

    fn state(&self) -> ProcessorState {
        self.state.load()
    }

    fn run(&mut self) -> Result<()> {
        match self
            .state
            .transition(ProcessorState::Idle, ProcessorState::Running)
        {
            Ok(()) => {}
            Err(ProcessorState::Halting) => {
                // Halted before the thread got here.
                self.state.store(ProcessorState::Stopped);
                return Ok(());
            }
            Err(_) => return Err(DisruptorError::AlreadyRunning),
        }

        tracing::debug!(stage = %self.name, "Event processor started");
        self.notify_start();

        let result = self.process_events();

        self.notify_shutdown();
        self.state.store(ProcessorState::Stopped);
        self.barrier.signal();
        tracing::debug!(
            stage = %self.name,
            sequence = self.sequence.get(),
            "Event processor stopped"
        );

        result
    }
}
