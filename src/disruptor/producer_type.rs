//! Producer Type Implementation
//!
//! Selects which sequencer backs a disruptor: the lock-free single-writer
//! claim path, or the compare-and-set path that admits concurrent producers.

use serde::{Deserialize, Serialize};

/// Specifies the type of producer for the Disruptor
///
/// # Examples
/// ```
/// use seqring::disruptor::ProducerType;
///
/// assert!(ProducerType::Single.is_single());
/// assert!(ProducerType::Multi.is_multi());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProducerType {
    /// Exactly one thread publishes
    ///
    /// The disruptor publishes through its own handle and refuses to create
    /// additional producers.
    Single,

    /// Any number of threads publish, each through its own `Producer` handle
    ///
    /// The default, since it stays correct whatever the number of publishers.
    #[default]
    Multi,
}

impl ProducerType {
    /// Returns true if this is `ProducerType::Single`
    pub fn is_single(&self) -> bool {
        matches!(self, ProducerType::Single)
    }

    /// Returns true if this is `ProducerType::Multi`
    pub fn is_multi(&self) -> bool {
        matches!(self, ProducerType::Multi)
    }
}

impl std::fmt::Display for ProducerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProducerType::Single => write!(f, "single"),
            ProducerType::Multi => write!(f, "multi"),
        }
    }
}

impl std::str::FromStr for ProducerType {
    type Err = String;

    /// Accepts "single" or "multi" in any case
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single" => Ok(ProducerType::Single),
            "multi" => Ok(ProducerType::Multi),
            _ => Err(format!(
                "Invalid producer type: '{s}'. Valid values are 'single' or 'multi'"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_producer_type_predicates() {
        assert!(ProducerType::Single.is_single());
        assert!(!ProducerType::Single.is_multi());
        assert!(ProducerType::Multi.is_multi());
        assert!(!ProducerType::Multi.is_single());
    }

    #[test]
    fn test_producer_type_default() {
        assert_eq!(ProducerType::default(), ProducerType::Multi);
    }

    #[test]
    fn test_producer_type_display_round_trips_through_from_str() {
        for producer_type in [ProducerType::Single, ProducerType::Multi] {
            let parsed = ProducerType::from_str(&producer_type.to_string()).unwrap();
            assert_eq!(parsed, producer_type);
        }
    }

    #[test]
    fn test_producer_type_from_str() {
        assert_eq!(ProducerType::from_str("SINGLE").unwrap(), ProducerType::Single);
        assert_eq!(ProducerType::from_str("Multi").unwrap(), ProducerType::Multi);
        assert!(ProducerType::from_str("invalid").is_err());
        assert!(ProducerType::from_str("").is_err());
    }

    #[test]
    fn test_producer_type_serde() {
        assert_eq!(serde_json::to_string(&ProducerType::Single).unwrap(), "\"single\"");
        let parsed: ProducerType = serde_json::from_str("\"multi\"").unwrap();
        assert_eq!(parsed, ProducerType::Multi);
    }
}
