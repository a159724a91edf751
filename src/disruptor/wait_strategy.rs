//! Wait Strategy Implementation
//!
//! Wait strategies decide how a consumer behaves when the sequence it wants is
//! not yet available. Every strategy re-checks the condition after each wake-up
//! and observes the barrier's alert flag on every iteration, so a halt is never
//! missed for longer than one wait cycle.

use crate::disruptor::{DisruptorError, Result, Sequence};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Strategy for waiting for a sequence to become available
pub trait WaitStrategy: Send + Sync + std::fmt::Debug {
    /// Wait until the dependent sequences reach `sequence`
    ///
    /// # Arguments
    /// * `sequence` - The sequence to wait for
    /// * `cursor` - The producer cursor
    /// * `dependent_sequences` - Upstream sequences; when empty the cursor is the dependency
    /// * `alert` - Halt flag checked on every iteration
    ///
    /// # Returns
    /// The minimum of the dependent sequences, which is at least `sequence`
    ///
    /// # Errors
    /// Returns `DisruptorError::Halted` once `alert` is raised
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependent_sequences: &[Arc<Sequence>],
        alert: &AtomicBool,
    ) -> Result<i64>;

    /// Wake up any thread blocked in `wait_for`
    ///
    /// Called after every publish, every consumer sequence advance and every alert.
    fn signal_all_when_blocking(&self);
}

#[inline]
fn available_sequence(cursor: &Sequence, dependent_sequences: &[Arc<Sequence>]) -> i64 {
    if dependent_sequences.is_empty() {
        cursor.get()
    } else {
        Sequence::minimum_sequence(dependent_sequences, i64::MAX)
    }
}

#[inline]
fn check_alert(alert: &AtomicBool) -> Result<()> {
    if alert.load(Ordering::Acquire) {
        Err(DisruptorError::Halted)
    } else {
        Ok(())
    }
}

/// Busy-spin wait strategy
///
/// Polls in a tight loop. Lowest latency, but burns a whole core while waiting;
/// use it only when cores are dedicated to the pipeline.
#[derive(Debug, Default, Clone, Copy)]
pub struct BusySpinWaitStrategy;

impl BusySpinWaitStrategy {
    /// Create a new busy-spin wait strategy
    pub fn new() -> Self {
        Self
    }
}

impl WaitStrategy for BusySpinWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependent_sequences: &[Arc<Sequence>],
        alert: &AtomicBool,
    ) -> Result<i64> {
        loop {
            check_alert(alert)?;
            let available = available_sequence(cursor, dependent_sequences);
            if available >= sequence {
                return Ok(available);
            }
            std::hint::spin_loop();
        }
    }

    fn signal_all_when_blocking(&self) {}
}

/// Yielding wait strategy
///
/// Spins for a fixed budget, then yields the processor between checks.
#[derive(Debug, Clone, Copy)]
pub struct YieldingWaitStrategy {
    spin_tries: u32,
}

impl YieldingWaitStrategy {
    const DEFAULT_SPIN_TRIES: u32 = 100;

    /// Create a new yielding wait strategy
    pub fn new() -> Self {
        Self::with_spin_tries(Self::DEFAULT_SPIN_TRIES)
    }

    /// Create a yielding wait strategy with a custom spin budget
    pub fn with_spin_tries(spin_tries: u32) -> Self {
        Self { spin_tries }
    }
}

impl Default for YieldingWaitStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitStrategy for YieldingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependent_sequences: &[Arc<Sequence>],
        alert: &AtomicBool,
    ) -> Result<i64> {
        let mut counter = self.spin_tries;
        loop {
            check_alert(alert)?;
            let available = available_sequence(cursor, dependent_sequences);
            if available >= sequence {
                return Ok(available);
            }
            if counter == 0 {
                thread::yield_now();
            } else {
                counter -= 1;
                std::hint::spin_loop();
            }
        }
    }

    fn signal_all_when_blocking(&self) {}
}

/// Sleeping wait strategy
///
/// Escalating back-off: busy spins first, then yields, then sleeps for a fixed
/// period between checks. Lowest CPU cost of the polling strategies, highest
/// tail latency.
#[derive(Debug, Clone, Copy)]
pub struct SleepingWaitStrategy {
    retries: u32,
    sleep_duration: Duration,
}

impl SleepingWaitStrategy {
    const DEFAULT_RETRIES: u32 = 200;
    const DEFAULT_SLEEP: Duration = Duration::from_micros(100);

    /// Create a new sleeping wait strategy with default settings
    pub fn new() -> Self {
        Self::with_settings(Self::DEFAULT_RETRIES, Self::DEFAULT_SLEEP)
    }

    /// Create a sleeping wait strategy with custom settings
    ///
    /// # Arguments
    /// * `retries` - Checks made before sleeping; the first half spin, the second half yield
    /// * `sleep_duration` - How long to sleep between checks once retries are exhausted
    pub fn with_settings(retries: u32, sleep_duration: Duration) -> Self {
        Self {
            retries,
            sleep_duration,
        }
    }

    /// Sleep period used once retries are exhausted
    pub fn sleep_duration(&self) -> Duration {
        self.sleep_duration
    }
}

impl Default for SleepingWaitStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitStrategy for SleepingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependent_sequences: &[Arc<Sequence>],
        alert: &AtomicBool,
    ) -> Result<i64> {
        let mut counter = self.retries;
        loop {
            check_alert(alert)?;
            let available = available_sequence(cursor, dependent_sequences);
            if available >= sequence {
                return Ok(available);
            }
            if counter > self.retries / 2 {
                counter -= 1;
                std::hint::spin_loop();
            } else if counter > 0 {
                counter -= 1;
                thread::yield_now();
            } else {
                thread::sleep(self.sleep_duration);
            }
        }
    }

    fn signal_all_when_blocking(&self) {}
}

/// Blocking wait strategy using a mutex and condition variable
///
/// Waiters sleep on the condition variable and are woken by
/// `signal_all_when_blocking`, which producers call after every publish and
/// processors call after every sequence advance. The condition is re-checked
/// under the lock after each wake-up, so spurious wake-ups are harmless.
#[derive(Debug, Default)]
pub struct BlockingWaitStrategy {
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl BlockingWaitStrategy {
    /// Create a new blocking wait strategy
    pub fn new() -> Self {
        Self::default()
    }
}

impl WaitStrategy for BlockingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependent_sequences: &[Arc<Sequence>],
        alert: &AtomicBool,
    ) -> Result<i64> {
        check_alert(alert)?;
        let available = available_sequence(cursor, dependent_sequences);
        if available >= sequence {
            return Ok(available);
        }

        let mut guard = self.mutex.lock();
        loop {
            check_alert(alert)?;
            let available = available_sequence(cursor, dependent_sequences);
            if available >= sequence {
                return Ok(available);
            }
            self.condvar.wait(&mut guard);
        }
    }

    fn signal_all_when_blocking(&self) {
        let _guard = self.mutex.lock();
        self.condvar.notify_all();
    }
}

/// Wait strategy selection for configuration files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitStrategyKind {
    BusySpin,
    Yielding,
    Sleeping,
    #[default]
    Blocking,
}

impl WaitStrategyKind {
    /// Build the wait strategy with its default settings
    pub fn build(self) -> Arc<dyn WaitStrategy> {
        match self {
            WaitStrategyKind::BusySpin => Arc::new(BusySpinWaitStrategy::new()),
            WaitStrategyKind::Yielding => Arc::new(YieldingWaitStrategy::new()),
            WaitStrategyKind::Sleeping => Arc::new(SleepingWaitStrategy::new()),
            WaitStrategyKind::Blocking => Arc::new(BlockingWaitStrategy::new()),
        }
    }
}

impl std::str::FromStr for WaitStrategyKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "busy-spin" | "busy_spin" | "busyspin" => Ok(WaitStrategyKind::BusySpin),
            "yielding" => Ok(WaitStrategyKind::Yielding),
            "sleeping" => Ok(WaitStrategyKind::Sleeping),
            "blocking" => Ok(WaitStrategyKind::Blocking),
            _ => Err(format!("Invalid wait strategy: {s}")),
        }
    }
}
