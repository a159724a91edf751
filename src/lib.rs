//! `seqring` - sequence-gated ring buffer for inter-thread messaging
//!
//! A fixed-capacity circular buffer shared by producer threads and a graph of
//! consumer stages, coordinated entirely through monotonically increasing
//! sequence numbers. Producers claim slots, write them in place and publish
//! them; consumers wait on barriers that combine the producer cursor with the
//! progress of their upstream stages. A producer can never lap the slowest
//! terminal consumer, so backpressure is structural.
//!
//! ## Quick Start
//!
//! ```rust
//! use seqring::disruptor::{DisruptorBuilder, EventHandler, ProducerType};
//!
//! #[derive(Debug, Default)]
//! struct Trade {
//!     quantity: i64,
//! }
//!
//! struct Volume {
//!     total: i64,
//! }
//!
//! impl EventHandler<Trade> for Volume {
//!     fn on_event(&mut self, event: &Trade, _sequence: i64, end_of_batch: bool) -> anyhow::Result<()> {
//!         self.total += event.quantity;
//!         if end_of_batch {
//!             tracing::debug!(total = self.total, "volume so far");
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let mut disruptor = DisruptorBuilder::new(1024, Trade::default)
//!     .producer_type(ProducerType::Single)
//!     .handle_events_with("volume", Volume { total: 0 })
//!     .build()
//!     .unwrap();
//!
//! disruptor.start().unwrap();
//! for quantity in 1..=10 {
//!     disruptor.publish(|trade, _seq| trade.quantity = quantity).unwrap();
//! }
//! disruptor.shutdown(true).unwrap();
//! assert_eq!(disruptor.stage_sequence("volume"), Some(9));
//! ```
//!
//! ## Architecture
//!
//! - **`RingBuffer`**: pre-allocated slots, indexed by `sequence & (capacity - 1)`
//! - **`Sequence`**: cache-padded atomic counter
//! - **`Sequencer`**: claim/publish protocol, single or multi producer
//! - **`SequenceBarrier`**: how far a stage may read
//! - **`WaitStrategy`**: busy-spin, yielding, sleeping or blocking
//! - **`EventProcessor`**: the run loop of one stage
//! - **`Disruptor`**: builder, stage graph and thread lifecycle
//!
//! The `persisted` module holds an unrelated, file-backed string queue.

pub mod disruptor;
pub mod persisted;

pub use disruptor::{
    is_power_of_two, BatchEventProcessor, BlockingWaitStrategy, BusySpinWaitStrategy,
    ClosureEventHandler, DefaultEventFactory, Disruptor, DisruptorBuilder, DisruptorConfig,
    DisruptorError, ErrorPolicy, EventFactory, EventHandler, EventProcessor, ExceptionHandler,
    MultiProducerSequencer, Producer, ProducerType, Result, RingBuffer, Sequence,
    SequenceBarrier, SequenceReporting, Sequencer, SingleProducerSequencer,
    SleepingWaitStrategy, WaitStrategy, WaitStrategyKind, YieldingWaitStrategy,
    INITIAL_CURSOR_VALUE,
};
pub use persisted::{PersistedError, PersistedRingBuffer};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the version of the `seqring` library
#[must_use]
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
