//! Event Handler Implementation
//!
//! This module provides the EventHandler trait implemented by consumer stages.
//! Several stages may read the same slot at once, so handlers only ever see a
//! shared reference to the event.

/// Handler for processing events from the ring buffer
///
/// # Type Parameters
/// * `T` - The event type that will be processed
///
/// # Examples
/// ```
/// use seqring::disruptor::EventHandler;
///
/// struct Tick {
///     price: i64,
/// }
///
/// #[derive(Default)]
/// struct Total {
///     sum: i64,
/// }
///
/// impl EventHandler<Tick> for Total {
///     fn on_event(&mut self, event: &Tick, _sequence: i64, _end_of_batch: bool) -> anyhow::Result<()> {
///         self.sum += event.price;
///         Ok(())
///     }
/// }
///
/// let mut total = Total::default();
/// total.on_event(&Tick { price: 5 }, 0, true).unwrap();
/// assert_eq!(total.sum, 5);
/// ```
pub trait EventHandler<T>: Send {
    /// Process an event
    ///
    /// # Arguments
    /// * `event` - The event to process
    /// * `sequence` - The sequence number of the event in the ring buffer
    /// * `end_of_batch` - True if this is the last event of the batch currently available
    ///
    /// # Errors
    /// Any error is routed to the stage's exception handler; it never affects sequencing.
    fn on_event(&mut self, event: &T, sequence: i64, end_of_batch: bool) -> anyhow::Result<()>;

    /// Called on the processor thread before the first event
    fn on_start(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called on the processor thread after the last event
    fn on_shutdown(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

impl<T> EventHandler<T> for Box<dyn EventHandler<T>> {
    fn on_event(&mut self, event: &T, sequence: i64, end_of_batch: bool) -> anyhow::Result<()> {
        (**self).on_event(event, sequence, end_of_batch)
    }

    fn on_start(&mut self) -> anyhow::Result<()> {
        (**self).on_start()
    }

    fn on_shutdown(&mut self) -> anyhow::Result<()> {
        (**self).on_shutdown()
    }
}

/// An event handler created from a closure
///
/// # Type Parameters
/// * `T` - The event type
/// * `F` - The closure type
pub struct ClosureEventHandler<T, F>
where
    F: FnMut(&T, i64, bool) -> anyhow::Result<()> + Send,
{
    handler: F,
    _phantom: std::marker::PhantomData<fn(&T)>,
}

impl<T, F> ClosureEventHandler<T, F>
where
    F: FnMut(&T, i64, bool) -> anyhow::Result<()> + Send,
{
    /// Create a new closure-based event handler
    ///
    /// # Arguments
    /// * `handler` - The closure that will process events
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<T, F> EventHandler<T> for ClosureEventHandler<T, F>
where
    F: FnMut(&T, i64, bool) -> anyhow::Result<()> + Send,
{
    fn on_event(&mut self, event: &T, sequence: i64, end_of_batch: bool) -> anyhow::Result<()> {
        (self.handler)(event, sequence, end_of_batch)
    }
}

/// A no-op event handler
///
/// Useful for measuring the overhead of the pipeline itself.
pub struct NoOpEventHandler<T> {
    _phantom: std::marker::PhantomData<fn(&T)>,
}

impl<T> NoOpEventHandler<T> {
    /// Create a new no-op event handler
    pub fn new() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<T> Default for NoOpEventHandler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EventHandler<T> for NoOpEventHandler<T> {
    fn on_event(&mut self, _event: &T, _sequence: i64, _end_of_batch: bool) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct TestEvent {
        value: i64,
    }

    #[test]
    fn test_closure_event_handler() {
        let mut seen = Vec::new();
        {
            let mut handler = ClosureEventHandler::new(|event: &TestEvent, sequence, end_of_batch| {
                seen.push((event.value, sequence, end_of_batch));
                Ok(())
            });
            handler.on_event(&TestEvent { value: 7 }, 42, true).unwrap();
        }
        assert_eq!(seen, vec![(7, 42, true)]);
    }

    #[test]
    fn test_closure_event_handler_propagates_errors() {
        let mut handler = ClosureEventHandler::new(|_event: &TestEvent, sequence, _| {
            anyhow::bail!("bad event at {sequence}")
        });
        let err = handler.on_event(&TestEvent::default(), 3, false).unwrap_err();
        assert_eq!(err.to_string(), "bad event at 3");
    }

    #[test]
    fn test_boxed_handler_delegates() {
        let mut handler: Box<dyn EventHandler<TestEvent>> = Box::new(NoOpEventHandler::new());
        assert!(handler.on_start().is_ok());
        assert!(handler.on_event(&TestEvent::default(), 0, true).is_ok());
        assert!(handler.on_shutdown().is_ok());
    }
}
