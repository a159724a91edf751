//! Exception Handler Implementation
//!
//! Exception handlers receive every error raised by an event handler. What the
//! processor does afterwards is decided by the stage's `ErrorPolicy`; neither
//! choice leaves a sequence half-advanced.

use serde::{Deserialize, Serialize};

/// What an event processor does after a handler error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Report the error and keep processing
    #[default]
    ContinueOnError,
    /// Report the error, then halt the processor
    HaltOnError,
}

/// Handler for errors raised while processing events
///
/// One handler is shared by every processor of a disruptor, so the methods
/// take `&self`.
///
/// # Type Parameters
/// * `T` - The event type being processed
pub trait ExceptionHandler<T>: Send + Sync {
    /// Handle an error returned by `EventHandler::on_event`
    ///
    /// # Arguments
    /// * `error` - The error that occurred
    /// * `sequence` - The sequence number of the failing event
    /// * `event` - The event that was being processed
    fn handle_event_exception(&self, error: &anyhow::Error, sequence: i64, event: &T);

    /// Handle an error returned by `EventHandler::on_start`
    fn handle_on_start_exception(&self, error: &anyhow::Error);

    /// Handle an error returned by `EventHandler::on_shutdown`
    fn handle_on_shutdown_exception(&self, error: &anyhow::Error);
}

/// Exception handler that reports every error through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingExceptionHandler;

impl LoggingExceptionHandler {
    /// Create a new logging exception handler
    pub fn new() -> Self {
        Self
    }
}

impl<T> ExceptionHandler<T> for LoggingExceptionHandler {
    fn handle_event_exception(&self, error: &anyhow::Error, sequence: i64, _event: &T) {
        tracing::error!(sequence, "Exception processing event: {error:#}");
    }

    fn handle_on_start_exception(&self, error: &anyhow::Error) {
        tracing::error!("Exception during event processor startup: {error:#}");
    }

    fn handle_on_shutdown_exception(&self, error: &anyhow::Error) {
        tracing::error!("Exception during event processor shutdown: {error:#}");
    }
}

/// Exception handler that ignores all exceptions
///
/// Use with caution; failures become invisible.
#[derive(Debug, Default, Clone, Copy)]
pub struct IgnoreExceptionHandler;

impl IgnoreExceptionHandler {
    /// Create a new ignore exception handler
    pub fn new() -> Self {
        Self
    }
}

impl<T> ExceptionHandler<T> for IgnoreExceptionHandler {
    fn handle_event_exception(&self, _error: &anyhow::Error, _sequence: i64, _event: &T) {}

    fn handle_on_start_exception(&self, _error: &anyhow::Error) {}

    fn handle_on_shutdown_exception(&self, _error: &anyhow::Error) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct TestEvent;

    #[test]
    fn test_logging_exception_handler_does_not_panic() {
        let handler = LoggingExceptionHandler::new();
        let error = anyhow::anyhow!("boom");
        ExceptionHandler::<TestEvent>::handle_event_exception(&handler, &error, 1, &TestEvent);
        ExceptionHandler::<TestEvent>::handle_on_start_exception(&handler, &error);
        ExceptionHandler::<TestEvent>::handle_on_shutdown_exception(&handler, &error);
    }

    #[test]
    fn test_ignore_exception_handler() {
        let handler = IgnoreExceptionHandler::new();
        let error = anyhow::anyhow!("boom");
        ExceptionHandler::<TestEvent>::handle_event_exception(&handler, &error, 1, &TestEvent);
    }

    #[test]
    fn test_error_policy_serde() {
        assert_eq!(ErrorPolicy::default(), ErrorPolicy::ContinueOnError);
        let policy: ErrorPolicy = serde_json::from_str("\"halt_on_error\"").unwrap();
        assert_eq!(policy, ErrorPolicy::HaltOnError);
    }
}
