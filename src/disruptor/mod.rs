//! Sequence-gated ring buffer core
//!
//! This module provides the lock-free sequencing and gating subsystem: the
//! ring buffer, the shared cursor, the producer-side claim/publish protocol,
//! the consumer-side dependency barrier and the pluggable wait strategies.

pub mod builder;
pub mod config;
pub mod dependency_graph;
#[allow(clippy::module_inception)]
pub mod disruptor;
pub mod event_factory;
pub mod event_handler;
pub mod event_processor;
pub mod exception_handler;
pub mod producer;
pub mod producer_type;
pub mod ring_buffer;
pub mod sequence;
pub mod sequence_barrier;
pub mod sequencer;
pub mod thread_management;
pub mod wait_strategy;


pub use builder::DisruptorBuilder;
pub use config::DisruptorConfig;
pub use dependency_graph::{DependencyGraph, StageSpec};
pub use disruptor::Disruptor;
pub use event_factory::{DefaultEventFactory, EventFactory, PrototypeEventFactory};
pub use event_handler::{ClosureEventHandler, EventHandler, NoOpEventHandler};
pub use event_processor::{
    BatchEventProcessor, EventProcessor, ProcessorHandle, ProcessorState, SequenceReporting,
};
pub use exception_handler::{
    ErrorPolicy, ExceptionHandler, IgnoreExceptionHandler, LoggingExceptionHandler,
};
pub use producer::Producer;
pub use producer_type::ProducerType;
pub use ring_buffer::RingBuffer;
pub use sequence::Sequence;
pub use sequence_barrier::{ProcessingSequenceBarrier, SequenceBarrier};
pub use sequencer::{MultiProducerSequencer, SequenceRange, Sequencer, SingleProducerSequencer};
pub use thread_management::{ManagedThread, ThreadBuilder};
pub use wait_strategy::{
    BlockingWaitStrategy, BusySpinWaitStrategy, SleepingWaitStrategy, WaitStrategy,
    WaitStrategyKind, YieldingWaitStrategy,
};

/// The initial cursor value for sequences
pub const INITIAL_CURSOR_VALUE: i64 = -1;

/// Errors that can occur in the Disruptor
#[derive(Debug, thiserror::Error)]
pub enum DisruptorError {
    /// Ring buffer capacity is zero or not a power of two
    #[error("Buffer size must be a power of 2, got: {0}")]
    InvalidCapacity(usize),

    /// The stage dependency graph contains a cycle
    #[error("Cyclic dependency between stages: {0}")]
    CyclicDependency(String),

    /// A stage names an upstream stage that was never registered
    #[error("Stage '{stage}' depends on unknown stage '{dependency}'")]
    UnknownDependency { stage: String, dependency: String },

    /// Two stages were registered under the same name
    #[error("Stage '{0}' registered more than once")]
    DuplicateStage(String),

    /// A stage was pinned to a CPU core that does not exist
    #[error("CPU core {0} is not available")]
    NoSuchCore(usize),

    /// A non-blocking claim found too few free slots
    #[error("Insufficient capacity in ring buffer")]
    InsufficientCapacity,

    /// A claim asked for zero slots or more slots than the buffer holds
    #[error("Cannot claim {requested} slots from a buffer of {capacity}")]
    InvalidClaim { requested: i64, capacity: usize },

    /// The waiting operation observed a halt signal
    #[error("Disruptor has been halted")]
    Halted,

    /// An event processor was asked to run while not idle
    #[error("Event processor is already running")]
    AlreadyRunning,

    /// The disruptor was started twice
    #[error("Disruptor has already been started")]
    AlreadyStarted,

    /// A lifecycle operation required a started disruptor
    #[error("Disruptor has not been started")]
    NotStarted,

    /// Extra producer handles require multi-producer mode
    #[error("Additional producers require ProducerType::Multi")]
    SingleProducerViolation,

    /// An event handler failed under `ErrorPolicy::HaltOnError`
    #[error("Event handler failed at sequence {sequence}: {message}")]
    HandlerFailed { sequence: i64, message: String },

    /// A processor thread could not be spawned
    #[error("Failed to spawn processor thread: {0}")]
    ThreadSpawn(String),

    /// A processor thread panicked
    #[error("Processor thread '{0}' panicked")]
    ThreadPanicked(String),

    /// Configuration could not be parsed
    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, DisruptorError>;

/// Utility function to check if a number is a power of 2
pub fn is_power_of_two(n: usize) -> bool {
    n != 0 && (n & (n - 1)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_power_of_two() {
        assert!(is_power_of_two(1));
        assert!(is_power_of_two(2));
        assert!(is_power_of_two(8));
        assert!(is_power_of_two(1024));

        assert!(!is_power_of_two(0));
        assert!(!is_power_of_two(3));
        assert!(!is_power_of_two(1023));
    }

    #[test]
    fn test_error_messages() {
        let err = DisruptorError::InvalidCapacity(3);
        assert_eq!(err.to_string(), "Buffer size must be a power of 2, got: 3");

        let err = DisruptorError::UnknownDependency {
            stage: "b".to_string(),
            dependency: "a".to_string(),
        };
        assert_eq!(err.to_string(), "Stage 'b' depends on unknown stage 'a'");
    }
}
