//! Thread management and CPU affinity
//!
//! Every consumer stage runs on a dedicated, named thread. A stage may be
//! pinned to a CPU core; core ids are validated when the thread is configured
//! so that a bad id fails `build()` rather than a running pipeline.

use crate::disruptor::{DisruptorError, Result};
use core_affinity::CoreId;
use std::thread::{self, JoinHandle};

/// Managed thread wrapper for event processors
///
/// Dropping a `ManagedThread` joins it.
pub struct ManagedThread<R = ()> {
    join_handle: Option<JoinHandle<R>>,
    thread_name: String,
}

impl<R> ManagedThread<R> {
    /// Get the thread name
    pub fn thread_name(&self) -> &str {
        &self.thread_name
    }

    /// Check if the thread is still running
    pub fn is_running(&self) -> bool {
        self.join_handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Wait for the thread to finish and return its result
    ///
    /// # Errors
    /// Returns `DisruptorError::ThreadPanicked` if the thread panicked
    pub fn join(mut self) -> Result<Option<R>> {
        match self.join_handle.take() {
            Some(handle) => handle
                .join()
                .map(Some)
                .map_err(|_| DisruptorError::ThreadPanicked(self.thread_name.clone())),
            None => Ok(None),
        }
    }
}

impl<R> std::fmt::Debug for ManagedThread<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedThread")
            .field("thread_name", &self.thread_name)
            .field("running", &self.is_running())
            .finish()
    }
}

impl<R> Drop for ManagedThread<R> {
    fn drop(&mut self) {
        if let Some(handle) = self.join_handle.take() {
            if handle.join().is_err() {
                tracing::warn!(thread = %self.thread_name, "Thread panicked before it was joined");
            }
        }
    }
}

/// Thread builder with CPU affinity and naming support
#[derive(Debug, Clone, Default)]
pub struct ThreadBuilder {
    name: Option<String>,
    affinity: Option<CoreId>,
}

impl ThreadBuilder {
    /// Create a new thread builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the thread name
    pub fn thread_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Pin the thread to a CPU core
    ///
    /// # Errors
    /// Returns `DisruptorError::NoSuchCore` if the core does not exist on this machine
    pub fn pin_at_core(mut self, core_id: usize) -> Result<Self> {
        validate_core_id(core_id)?;
        self.affinity = Some(CoreId { id: core_id });
        Ok(self)
    }

    /// Spawn a thread with the configured settings
    ///
    /// # Errors
    /// Returns `DisruptorError::ThreadSpawn` if the OS refuses to create the thread
    pub fn spawn<F, R>(self, f: F) -> Result<ManagedThread<R>>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let thread_name = self.name.unwrap_or_else(|| "seqring-worker".to_string());
        let affinity = self.affinity;

        let name_for_thread = thread_name.clone();
        let join_handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                set_affinity_if_defined(affinity, &name_for_thread);
                f()
            })
            .map_err(|e| DisruptorError::ThreadSpawn(format!("{thread_name}: {e}")))?;

        Ok(ManagedThread {
            join_handle: Some(join_handle),
            thread_name,
        })
    }
}

/// Check that a CPU core id exists on this machine
///
/// # Errors
/// Returns `DisruptorError::NoSuchCore` if it does not
pub fn validate_core_id(core_id: usize) -> Result<()> {
    if get_available_cores().contains(&core_id) {
        Ok(())
    } else {
        Err(DisruptorError::NoSuchCore(core_id))
    }
}

fn set_affinity_if_defined(affinity: Option<CoreId>, thread_name: &str) {
    if let Some(core_id) = affinity {
        if core_affinity::set_for_current(core_id) {
            tracing::debug!(thread = thread_name, core = core_id.id, "Pinned thread to CPU core");
        } else {
            tracing::warn!(thread = thread_name, core = core_id.id, "Could not pin thread to CPU core");
        }
    }
}

/// Get available CPU core IDs
pub fn get_available_cores() -> Vec<usize> {
    core_affinity::get_core_ids()
        .unwrap_or_default()
        .iter()
        .map(|core| core.id)
        .collect()
}
