//! Disruptor configuration
//!
//! Everything about a disruptor except its stages can be described in JSON
//! and loaded at start-up:
//!
//! ```json
//! {
//!     "capacity": 1024,
//!     "producer_type": "multi",
//!     "wait_strategy": "yielding",
//!     "error_policy": "continue_on_error",
//!     "sequence_reporting": "end_of_batch",
//!     "thread_name_prefix": "pipeline"
//! }
//! ```
//!
//! Missing fields take their defaults.

use crate::disruptor::{
    is_power_of_two, DisruptorError, ErrorPolicy, ProducerType, Result, SequenceReporting,
    WaitStrategyKind,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default ring buffer capacity
pub const DEFAULT_CAPACITY: usize = 1024;

/// Default prefix for processor thread names
pub const DEFAULT_THREAD_NAME_PREFIX: &str = "seqring";

/// Serializable disruptor settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisruptorConfig {
    /// Number of ring buffer slots, a power of two
    pub capacity: usize,
    pub producer_type: ProducerType,
    pub wait_strategy: WaitStrategyKind,
    pub error_policy: ErrorPolicy,
    pub sequence_reporting: SequenceReporting,
    /// Processor threads are named `{prefix}-{stage}`
    pub thread_name_prefix: String,
}

impl Default for DisruptorConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            producer_type: ProducerType::default(),
            wait_strategy: WaitStrategyKind::default(),
            error_policy: ErrorPolicy::default(),
            sequence_reporting: SequenceReporting::default(),
            thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_string(),
        }
    }
}

impl DisruptorConfig {
    /// Parse and validate a JSON configuration
    ///
    /// # Errors
    /// * `DisruptorError::Config` if the JSON is malformed
    /// * `DisruptorError::InvalidCapacity` if the capacity is not a power of two
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| DisruptorError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file
    ///
    /// # Errors
    /// Same as `from_json_str`, plus `DisruptorError::Config` if the file cannot be read
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| DisruptorError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    /// Serialize to pretty-printed JSON
    ///
    /// # Errors
    /// Returns `DisruptorError::Config` if serialization fails
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| DisruptorError::Config(e.to_string()))
    }

    /// Check the settings
    ///
    /// # Errors
    /// Returns `DisruptorError::InvalidCapacity` if the capacity is not a power of two
    pub fn validate(&self) -> Result<()> {
        if !is_power_of_two(self.capacity) {
            return Err(DisruptorError::InvalidCapacity(self.capacity));
        }
        if self.thread_name_prefix.is_empty() {
            return Err(DisruptorError::Config(
                "thread_name_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
