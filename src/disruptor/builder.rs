//! Builder for assembling a Disruptor with a fluent API
//!
//! Stages are registered by name, optionally after other named stages, and
//! wired up in `build()`: the stage graph is validated, one barrier per stage
//! is created in dependency order, and the sequences of the terminal stages
//! become the gating sequences of the producers.

use crate::disruptor::disruptor::StageRuntime;
use crate::disruptor::thread_management::validate_core_id;
use crate::disruptor::{
    is_power_of_two, BatchEventProcessor, DependencyGraph, Disruptor, DisruptorConfig,
    DisruptorError, ErrorPolicy, EventFactory, EventHandler, EventProcessor, ExceptionHandler,
    LoggingExceptionHandler, MultiProducerSequencer, ProcessingSequenceBarrier, ProducerType,
    Result, RingBuffer, Sequence, SequenceBarrier, SequenceReporting, Sequencer,
    SingleProducerSequencer, StageSpec, WaitStrategy,
};
use std::sync::Arc;

struct PendingStage<T> {
    spec: StageSpec,
    handler: Box<dyn EventHandler<T>>,
}

/// Fluent builder for `Disruptor`
///
/// # Examples
/// ```
/// use seqring::disruptor::{ClosureEventHandler, DisruptorBuilder, ProducerType, WaitStrategyKind};
///
/// let mut disruptor = DisruptorBuilder::new(64, || 0u64)
///     .producer_type(ProducerType::Single)
///     .wait_strategy(WaitStrategyKind::Yielding.build())
///     .handle_events_with("parse", ClosureEventHandler::new(|_: &u64, _, _| Ok(())))
///     .handle_events_after("store", ClosureEventHandler::new(|_: &u64, _, _| Ok(())), &["parse"])
///     .build()
///     .unwrap();
///
/// disruptor.start().unwrap();
/// disruptor.publish(|slot, seq| *slot = seq as u64).unwrap();
/// disruptor.shutdown(true).unwrap();
/// ```
pub struct DisruptorBuilder<T>
where
    T: Send + Sync + 'static,
{
    capacity: usize,
    event_factory: Box<dyn EventFactory<T>>,
    producer_type: ProducerType,
    wait_strategy: Arc<dyn WaitStrategy>,
    error_policy: ErrorPolicy,
    sequence_reporting: SequenceReporting,
    thread_name_prefix: String,
    exception_handler: Arc<dyn ExceptionHandler<T>>,
    stages: Vec<PendingStage<T>>,
    pinned: Vec<(String, usize)>,
}

impl<T> DisruptorBuilder<T>
where
    T: Send + Sync + 'static,
{
    /// Start a builder with default settings
    ///
    /// # Arguments
    /// * `capacity` - Ring buffer size, checked in `build()`
    /// * `event_factory` - Pre-populates every slot
    pub fn new<F>(capacity: usize, event_factory: F) -> Self
    where
        F: EventFactory<T> + 'static,
    {
        Self::from_config(
            &DisruptorConfig {
                capacity,
                ..DisruptorConfig::default()
            },
            event_factory,
        )
    }

    /// Start a builder from loaded configuration
    pub fn from_config<F>(config: &DisruptorConfig, event_factory: F) -> Self
    where
        F: EventFactory<T> + 'static,
    {
        Self {
            capacity: config.capacity,
            event_factory: Box::new(event_factory),
            producer_type: config.producer_type,
            wait_strategy: config.wait_strategy.build(),
            error_policy: config.error_policy,
            sequence_reporting: config.sequence_reporting,
            thread_name_prefix: config.thread_name_prefix.clone(),
            exception_handler: Arc::new(LoggingExceptionHandler::new()),
            stages: Vec::new(),
            pinned: Vec::new(),
        }
    }

    pub fn producer_type(mut self, producer_type: ProducerType) -> Self {
        self.producer_type = producer_type;
        self
    }

    pub fn wait_strategy(mut self, wait_strategy: Arc<dyn WaitStrategy>) -> Self {
        self.wait_strategy = wait_strategy;
        self
    }

    /// Applies to every stage
    pub fn error_policy(mut self, error_policy: ErrorPolicy) -> Self {
        self.error_policy = error_policy;
        self
    }

    /// Applies to every stage
    pub fn sequence_reporting(mut self, sequence_reporting: SequenceReporting) -> Self {
        self.sequence_reporting = sequence_reporting;
        self
    }

    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Replace the default `LoggingExceptionHandler`, shared by every stage
    pub fn with_exception_handler<E>(mut self, exception_handler: E) -> Self
    where
        E: ExceptionHandler<T> + 'static,
    {
        self.exception_handler = Arc::new(exception_handler);
        self
    }

    /// Add a stage fed directly by the producers
    pub fn handle_events_with<H>(self, name: impl Into<String>, handler: H) -> Self
    where
        H: EventHandler<T> + 'static,
    {
        self.add_stage(StageSpec::new(name), Box::new(handler))
    }

    /// Add a stage that only sees an event after every named upstream stage has
    pub fn handle_events_after<H, S>(
        self,
        name: impl Into<String>,
        handler: H,
        dependencies: &[S],
    ) -> Self
    where
        H: EventHandler<T> + 'static,
        S: AsRef<str>,
    {
        self.add_stage(StageSpec::after(name, dependencies), Box::new(handler))
    }

    /// Run the named stage's thread on a specific CPU core
    pub fn pin_stage_at_core(mut self, name: impl Into<String>, core_id: usize) -> Self {
        self.pinned.push((name.into(), core_id));
        self
    }

    fn add_stage(mut self, spec: StageSpec, handler: Box<dyn EventHandler<T>>) -> Self {
        self.stages.push(PendingStage { spec, handler });
        self
    }

    /// Validate the configuration and wire up every stage
    ///
    /// # Errors
    /// * `DisruptorError::InvalidCapacity` for a capacity that is not a power of two
    /// * `DisruptorError::DuplicateStage`, `UnknownDependency` or `CyclicDependency`
    ///   for an invalid stage graph
    /// * `DisruptorError::NoSuchCore` for a pin to a missing CPU core
    /// * `DisruptorError::Config` for a pin naming an unknown stage
    pub fn build(self) -> Result<Disruptor<T>> {
        if !is_power_of_two(self.capacity) {
            return Err(DisruptorError::InvalidCapacity(self.capacity));
        }

        let specs: Vec<StageSpec> = self.stages.iter().map(|s| s.spec.clone()).collect();
        let graph = DependencyGraph::new(&specs)?;

        let mut cores = vec![None; graph.len()];
        for (name, core_id) in &self.pinned {
            let stage = graph.index_of(name).ok_or_else(|| {
                DisruptorError::Config(format!("cannot pin unknown stage '{name}'"))
            })?;
            validate_core_id(*core_id)?;
            cores[stage] = Some(*core_id);
        }

        let event_factory = self.event_factory;
        let ring_buffer = Arc::new(RingBuffer::new(self.capacity, || {
            event_factory.new_instance()
        })?);

        let sequencer: Arc<dyn Sequencer> = match self.producer_type {
            ProducerType::Single => Arc::new(SingleProducerSequencer::new(
                self.capacity,
                Arc::clone(&self.wait_strategy),
            )),
            ProducerType::Multi => Arc::new(MultiProducerSequencer::new(
                self.capacity,
                Arc::clone(&self.wait_strategy),
            )),
        };

        let mut handlers: Vec<Option<Box<dyn EventHandler<T>>>> =
            self.stages.into_iter().map(|s| Some(s.handler)).collect();
        let mut sequences: Vec<Option<Arc<Sequence>>> = vec![None; graph.len()];
        let mut runtimes: Vec<Option<StageRuntime>> = (0..graph.len()).map(|_| None).collect();

        for &stage in graph.topological_order() {
            let upstream: Vec<Arc<Sequence>> = graph
                .dependencies(stage)
                .iter()
                .filter_map(|&dep| sequences[dep].clone())
                .collect();
            let barrier: Arc<dyn SequenceBarrier> = Arc::new(ProcessingSequenceBarrier::new(
                Arc::clone(&sequencer),
                upstream,
            ));

            let handler = handlers[stage].take().ok_or_else(|| {
                DisruptorError::Config(format!("stage '{}' wired twice", graph.name(stage)))
            })?;
            let processor = BatchEventProcessor::new(
                graph.name(stage),
                Arc::clone(&ring_buffer),
                barrier,
                handler,
            )
            .with_exception_handler(Arc::clone(&self.exception_handler))
            .with_error_policy(self.error_policy)
            .with_sequence_reporting(self.sequence_reporting);

            sequences[stage] = Some(Arc::clone(processor.sequence()));
            runtimes[stage] = Some(StageRuntime::new(
                processor.handle(),
                cores[stage],
                Box::new(processor),
            ));
        }

        let gating: Vec<Arc<Sequence>> = graph
            .terminal_stages()
            .into_iter()
            .filter_map(|stage| sequences[stage].clone())
            .collect();
        sequencer.add_gating_sequences(&gating);

        tracing::debug!(
            capacity = self.capacity,
            producer_type = %self.producer_type,
            stages = graph.len(),
            gating = gating.len(),
            "Disruptor built"
        );

        Ok(Disruptor::new(
            ring_buffer,
            sequencer,
            self.producer_type,
            self.thread_name_prefix,
            graph,
            runtimes.into_iter().flatten().collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disruptor::{NoOpEventHandler, WaitStrategyKind};

    fn noop() -> NoOpEventHandler<i64> {
        NoOpEventHandler::new()
    }

    #[test]
    fn test_invalid_capacity() {
        let result = DisruptorBuilder::new(6, || 0i64)
            .handle_events_with("a", noop())
            .build();
        assert!(matches!(result, Err(DisruptorError::InvalidCapacity(6))));
    }

    #[test]
    fn test_graph_errors_surface_from_build() {
        let unknown = DisruptorBuilder::new(8, || 0i64)
            .handle_events_after("b", noop(), &["a"])
            .build();
        assert!(matches!(unknown, Err(DisruptorError::UnknownDependency { .. })));

        let duplicate = DisruptorBuilder::new(8, || 0i64)
            .handle_events_with("a", noop())
            .handle_events_with("a", noop())
            .build();
        assert!(matches!(duplicate, Err(DisruptorError::DuplicateStage(_))));

        let cyclic = DisruptorBuilder::new(8, || 0i64)
            .handle_events_after("a", noop(), &["b"])
            .handle_events_after("b", noop(), &["a"])
            .build();
        assert!(matches!(cyclic, Err(DisruptorError::CyclicDependency(_))));
    }

    #[test]
    fn test_pinning_errors() {
        let missing_core = DisruptorBuilder::new(8, || 0i64)
            .handle_events_with("a", noop())
            .pin_stage_at_core("a", usize::MAX)
            .build();
        assert!(matches!(missing_core, Err(DisruptorError::NoSuchCore(_))));

        let missing_stage = DisruptorBuilder::new(8, || 0i64)
            .handle_events_with("a", noop())
            .pin_stage_at_core("nope", 0)
            .build();
        assert!(matches!(missing_stage, Err(DisruptorError::Config(_))));
    }

    #[test]
    fn test_only_terminal_stages_gate_producers() {
        let mut disruptor = DisruptorBuilder::new(4, || 0i64)
            .producer_type(ProducerType::Single)
            .wait_strategy(WaitStrategyKind::BusySpin.build())
            .handle_events_with("first", noop())
            .handle_events_after("second", noop(), &["first"])
            .build()
            .unwrap();

        for _ in 0..4 {
            disruptor.try_publish(|slot, seq| *slot = seq).unwrap();
        }
        assert!(matches!(
            disruptor.try_publish(|_, _| {}),
            Err(DisruptorError::InsufficientCapacity)
        ));
        assert_eq!(disruptor.stage_sequence("first"), Some(-1));
        assert_eq!(disruptor.stage_sequence("second"), Some(-1));
    }

    #[test]
    fn test_from_config() {
        let config = DisruptorConfig {
            capacity: 16,
            producer_type: ProducerType::Single,
            ..DisruptorConfig::default()
        };
        let disruptor = DisruptorBuilder::from_config(&config, || 0i64)
            .handle_events_with("only", noop())
            .build()
            .unwrap();

        assert_eq!(disruptor.buffer_size(), 16);
        assert_eq!(disruptor.producer_type(), ProducerType::Single);
        assert_eq!(disruptor.remaining_capacity(), 16);
    }
}
