//! Disruptor facade
//!
//! Owns the ring buffer, the sequencer and one event processor per stage, and
//! drives their lifecycle: start one thread per stage, publish, then shut down
//! with or without draining what was already published.

use crate::disruptor::{
    DependencyGraph, DisruptorError, EventProcessor, ManagedThread, ProcessorHandle,
    ProcessorState, Producer, ProducerType, Result, RingBuffer, SequenceRange, Sequencer,
    ThreadBuilder,
};
use crossbeam_utils::Backoff;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// A stage as owned by the facade: its processor until started, its thread afterwards
pub(crate) struct StageRuntime {
    handle: ProcessorHandle,
    core: Option<usize>,
    processor: Option<Box<dyn EventProcessor>>,
    thread: Option<ManagedThread<Result<()>>>,
}

impl StageRuntime {
    pub(crate) fn new(
        handle: ProcessorHandle,
        core: Option<usize>,
        processor: Box<dyn EventProcessor>,
    ) -> Self {
        Self {
            handle,
            core,
            processor: Some(processor),
            thread: None,
        }
    }

    fn has_finished(&self) -> bool {
        self.handle.state() == ProcessorState::Stopped
            || self.thread.as_ref().is_some_and(|t| !t.is_running())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Built,
    Running,
    ShutDown,
}

/// The main Disruptor type
///
/// Created by `DisruptorBuilder`. In single-producer mode the disruptor itself
/// is the only producer, which `&mut self` on the publish methods enforces; in
/// multi-producer mode each publishing thread takes its own `Producer` from
/// `create_producer`.
///
/// # Type Parameters
/// * `T` - The event type stored in the ring buffer
pub struct Disruptor<T>
where
    T: Send + Sync + 'static,
{
    ring_buffer: Arc<RingBuffer<T>>,
    sequencer: Arc<dyn Sequencer>,
    producer_type: ProducerType,
    producer: Producer<T>,
    thread_name_prefix: String,
    graph: DependencyGraph,
    stages: Vec<StageRuntime>,
    lifecycle: Lifecycle,
}

impl<T> Disruptor<T>
where
    T: Send + Sync + 'static,
{
    pub(crate) fn new(
        ring_buffer: Arc<RingBuffer<T>>,
        sequencer: Arc<dyn Sequencer>,
        producer_type: ProducerType,
        thread_name_prefix: String,
        graph: DependencyGraph,
        stages: Vec<StageRuntime>,
    ) -> Self {
        let producer = Producer::new(Arc::clone(&sequencer), Arc::clone(&ring_buffer));
        Self {
            ring_buffer,
            sequencer,
            producer_type,
            producer,
            thread_name_prefix,
            graph,
            stages,
            lifecycle: Lifecycle::Built,
        }
    }

    /// Start one named thread per stage
    ///
    /// # Errors
    /// * `DisruptorError::AlreadyStarted` if called more than once
    /// * `DisruptorError::ThreadSpawn` if a thread cannot be created; stages
    ///   already started are stopped again
    pub fn start(&mut self) -> Result<()> {
        if self.lifecycle != Lifecycle::Built {
            return Err(DisruptorError::AlreadyStarted);
        }
        self.lifecycle = Lifecycle::Running;

        for index in 0..self.stages.len() {
            if let Err(e) = self.spawn_stage(index) {
                tracing::error!("Failed to start stage '{}': {e}", self.graph.name(index));
                let _ = self.stop(false);
                return Err(e);
            }
        }

        tracing::info!(
            stages = self.stages.len(),
            capacity = self.ring_buffer.capacity(),
            producer_type = %self.producer_type,
            "Disruptor started"
        );
        Ok(())
    }

    fn spawn_stage(&mut self, index: usize) -> Result<()> {
        let stage = &mut self.stages[index];
        let name = stage.handle.name().to_string();

        let mut builder =
            ThreadBuilder::new().thread_name(format!("{}-{name}", self.thread_name_prefix));
        if let Some(core) = stage.core {
            builder = builder.pin_at_core(core)?;
        }

        let Some(mut processor) = stage.processor.take() else {
            return Err(DisruptorError::AlreadyStarted);
        };
        let thread = builder.spawn(move || {
            let _span = tracing::info_span!("stage", name = %name).entered();
            processor.run()
        })?;
        stage.thread = Some(thread);
        Ok(())
    }

    /// Publish one event, waiting for free capacity if needed
    ///
    /// # Arguments
    /// * `write` - Fills the claimed slot; receives the slot and its sequence
    ///
    /// # Errors
    /// Returns `DisruptorError::Halted` after shutdown
    pub fn publish<F>(&mut self, write: F) -> Result<i64>
    where
        F: FnOnce(&mut T, i64),
    {
        self.producer.publish(write)
    }

    /// Publish one event if a slot is free right now
    ///
    /// # Errors
    /// Returns `DisruptorError::InsufficientCapacity` without calling `write`
    /// if the buffer is full
    pub fn try_publish<F>(&mut self, write: F) -> Result<i64>
    where
        F: FnOnce(&mut T, i64),
    {
        self.producer.try_publish(write)
    }

    /// Publish `n` consecutive events as one batch
    pub fn publish_batch<F>(&mut self, n: usize, write: F) -> Result<SequenceRange>
    where
        F: FnMut(&mut T, i64),
    {
        self.producer.publish_batch(n, write)
    }

    /// Publish `n` consecutive events if that many slots are free right now
    pub fn try_publish_batch<F>(&mut self, n: usize, write: F) -> Result<SequenceRange>
    where
        F: FnMut(&mut T, i64),
    {
        self.producer.try_publish_batch(n, write)
    }

    /// Create an additional producer handle for another thread
    ///
    /// # Errors
    /// Returns `DisruptorError::SingleProducerViolation` unless the disruptor
    /// was built with `ProducerType::Multi`
    pub fn create_producer(&self) -> Result<Producer<T>> {
        if !self.producer_type.is_multi() {
            return Err(DisruptorError::SingleProducerViolation);
        }
        Ok(Producer::new(
            Arc::clone(&self.sequencer),
            Arc::clone(&self.ring_buffer),
        ))
    }

    /// Stop every stage and join its thread
    ///
    /// With `drain`, first waits until every stage has consumed everything
    /// claimed before the call, or has stopped on its own. A multi-producer
    /// write that is still in progress is waited for, so a write closure that
    /// never returns also keeps `shutdown(true)` from returning. Producers still
    /// blocked on a full buffer fail with `DisruptorError::Halted`. Shutdown is
    /// final: a stopped disruptor cannot be restarted.
    ///
    /// # Errors
    /// * `DisruptorError::NotStarted` if `start` was never called
    /// * the first error reported by a stage thread, e.g. `HandlerFailed` or
    ///   `ThreadPanicked`, after every thread has been joined
    pub fn shutdown(&mut self, drain: bool) -> Result<()> {
        match self.lifecycle {
            Lifecycle::Built => Err(DisruptorError::NotStarted),
            Lifecycle::ShutDown => Ok(()),
            Lifecycle::Running => self.stop(drain),
        }
    }

    fn stop(&mut self, drain: bool) -> Result<()> {
        self.lifecycle = Lifecycle::ShutDown;

        if drain {
            self.drain();
        }

        self.sequencer.halt();
        for stage in &self.stages {
            stage.handle.halt();
        }

        let mut first_error = None;
        for stage in &mut self.stages {
            let Some(thread) = stage.thread.take() else {
                continue;
            };
            let outcome = match thread.join() {
                Ok(Some(result)) => result,
                Ok(None) => Ok(()),
                Err(e) => Err(e),
            };
            if let Err(e) = outcome {
                tracing::warn!(stage = stage.handle.name(), "Stage stopped with error: {e}");
                first_error.get_or_insert(e);
            }
        }

        tracing::info!(cursor = self.sequencer.cursor().get(), drain, "Disruptor shut down");
        first_error.map_or(Ok(()), Err)
    }

    /// Wait until every stage has reached the cursor as of this call
    ///
    /// In multi-producer mode the cursor may sit past a slot whose write is
    /// still in progress. Claiming never fails after the cursor moves, so that
    /// slot is published as soon as its write closure returns, and the stages
    /// pick up everything behind it. A stage that stopped on its own, or sits
    /// downstream of one, can never reach the target and is not waited for.
    fn drain(&self) {
        let target = self.sequencer.cursor().get();

        let backoff = Backoff::new();
        loop {
            let mut dead = vec![false; self.stages.len()];
            let mut all_done = true;
            for &index in self.graph.topological_order() {
                let stage = &self.stages[index];
                dead[index] = stage.has_finished()
                    || self.graph.dependencies(index).iter().any(|&d| dead[d]);
                if !dead[index] && stage.handle.sequence().get() < target {
                    all_done = false;
                }
            }

            if all_done {
                tracing::debug!(target_sequence = target, "Drained all stages");
                return;
            }

            if backoff.is_completed() {
                thread::sleep(Duration::from_micros(100));
            } else {
                backoff.snooze();
            }
        }
    }

    /// Check if the disruptor has been started and not yet shut down
    ///
    /// This only reflects `start` and `shutdown`. Stages that stopped on their
    /// own, e.g. under `ErrorPolicy::HaltOnError`, are reported by
    /// `active_stages`.
    pub fn is_running(&self) -> bool {
        self.lifecycle == Lifecycle::Running
    }

    /// Number of stage threads still processing events
    pub fn active_stages(&self) -> usize {
        self.stages
            .iter()
            .filter(|stage| stage.thread.is_some() && !stage.has_finished())
            .count()
    }

    /// Highest claimed sequence
    pub fn cursor(&self) -> i64 {
        self.sequencer.cursor().get()
    }

    /// Number of slots that could be claimed right now
    pub fn remaining_capacity(&self) -> i64 {
        self.sequencer.remaining_capacity()
    }

    /// Number of ring buffer slots
    pub fn buffer_size(&self) -> usize {
        self.ring_buffer.capacity()
    }

    pub fn producer_type(&self) -> ProducerType {
        self.producer_type
    }

    /// Last sequence the named stage has finished with
    pub fn stage_sequence(&self, name: &str) -> Option<i64> {
        self.stage_handle(name).map(|h| h.sequence().get())
    }

    /// Lifecycle state of the named stage's processor
    pub fn stage_state(&self, name: &str) -> Option<ProcessorState> {
        self.stage_handle(name).map(ProcessorHandle::state)
    }

    fn stage_handle(&self, name: &str) -> Option<&ProcessorHandle> {
        self.graph.index_of(name).map(|index| &self.stages[index].handle)
    }
}

impl<T> std::fmt::Debug for Disruptor<T>
where
    T: Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disruptor")
            .field("buffer_size", &self.ring_buffer.capacity())
            .field("producer_type", &self.producer_type)
            .field("cursor", &self.cursor())
            .field("stages", &self.stages.len())
            .field("lifecycle", &self.lifecycle)
            .finish()
    }
}

impl<T> Drop for Disruptor<T>
where
    T: Send + Sync + 'static,
{
    fn drop(&mut self) {
        if self.lifecycle == Lifecycle::Running {
            if let Err(e) = self.stop(false) {
                tracing::warn!("Error while shutting down dropped disruptor: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::disruptor::{
        ClosureEventHandler, DisruptorBuilder, DisruptorError, ProcessorState, ProducerType,
        WaitStrategyKind,
    };
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_lifecycle_errors() {
        let mut disruptor = DisruptorBuilder::new(8, || 0i64)
            .handle_events_with("a", ClosureEventHandler::new(|_: &i64, _, _| Ok(())))
            .build()
            .unwrap();

        assert!(!disruptor.is_running());
        assert_eq!(disruptor.active_stages(), 0);
        assert!(matches!(disruptor.shutdown(true), Err(DisruptorError::NotStarted)));

        disruptor.start().unwrap();
        assert!(disruptor.is_running());
        assert_eq!(disruptor.active_stages(), 1);
        assert!(matches!(disruptor.start(), Err(DisruptorError::AlreadyStarted)));

        disruptor.shutdown(true).unwrap();
        assert!(!disruptor.is_running());
        assert_eq!(disruptor.active_stages(), 0);
        assert!(disruptor.shutdown(true).is_ok());
        assert_eq!(disruptor.stage_state("a"), Some(ProcessorState::Stopped));
        assert!(matches!(disruptor.publish(|_, _| {}), Err(DisruptorError::Halted)));
    }

    #[test]
    fn test_single_producer_refuses_extra_producers() {
        let disruptor = DisruptorBuilder::new(8, || 0i64)
            .producer_type(ProducerType::Single)
            .build()
            .unwrap();
        assert!(matches!(
            disruptor.create_producer(),
            Err(DisruptorError::SingleProducerViolation)
        ));
    }

    #[test]
    fn test_events_published_before_start_are_consumed() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut disruptor = DisruptorBuilder::new(8, || 0i64)
            .producer_type(ProducerType::Single)
            .wait_strategy(WaitStrategyKind::Sleeping.build())
            .handle_events_with(
                "sink",
                ClosureEventHandler::new(move |event: &i64, _, _| {
                    sink.lock().push(*event);
                    Ok(())
                }),
            )
            .build()
            .unwrap();

        disruptor.publish(|slot, _| *slot = 10).unwrap();
        disruptor.publish(|slot, _| *slot = 20).unwrap();
        disruptor.start().unwrap();
        disruptor.shutdown(true).unwrap();

        assert_eq!(*seen.lock(), vec![10, 20]);
        assert_eq!(disruptor.stage_sequence("sink"), Some(1));
        assert_eq!(disruptor.stage_sequence("missing"), None);
    }

    #[test]
    fn test_drop_stops_running_threads() {
        let mut disruptor = DisruptorBuilder::new(8, || 0i64)
            .wait_strategy(WaitStrategyKind::Blocking.build())
            .handle_events_with("idle", ClosureEventHandler::new(|_: &i64, _, _| Ok(())))
            .build()
            .unwrap();
        disruptor.start().unwrap();
        drop(disruptor);
    }
}
