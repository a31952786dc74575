//! Lifecycle events emitted by the result registry.
//!
//! Every entry creation, settlement, timeout, and eviction publishes a
//! [`RegistryEvent`] through the [`super::EventBus`]. WebSocket clients
//! subscribe to these to observe the registry live.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Why entries were removed from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClearReason {
    /// A single key was cleared explicitly.
    Explicit,
    /// The whole registry was cleared.
    All,
    /// Entries exceeded the maximum age.
    Expired,
    /// Ready-with-error entries were cleared.
    Errors,
    /// The operation could not be started.
    Abandoned,
}

/// Which kind of terminal outcome an entry settled with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SettledAs {
    /// The operation produced a value.
    Value,
    /// The operation failed.
    Error,
}

/// Registry lifecycle event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum RegistryEvent {
    /// A new entry was created and its operation started.
    EntryCreated {
        /// Entry key.
        key: String,
        /// Creation timestamp.
        timestamp: DateTime<Utc>,
    },

    /// An entry received its terminal outcome from the operation.
    EntrySettled {
        /// Entry key.
        key: String,
        /// Whether the outcome is a value or an error.
        outcome: SettledAs,
        /// Error message when `outcome` is `error`.
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        /// Settlement timestamp.
        timestamp: DateTime<Utc>,
    },

    /// An entry was forced to ready by its deadline.
    EntryTimedOut {
        /// Entry key.
        key: String,
        /// Deadline in milliseconds.
        deadline_ms: u64,
        /// Timeout timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Entries were removed from the registry.
    EntriesCleared {
        /// Removed keys.
        keys: Vec<String>,
        /// Why they were removed.
        reason: ClearReason,
        /// Removal timestamp.
        timestamp: DateTime<Utc>,
    },

    /// An operation finished after its entry had already terminated, so
    /// its result reached nobody.
    LateResultDiscarded {
        /// Entry key.
        key: String,
        /// Discard timestamp.
        timestamp: DateTime<Utc>,
    },
}

impl RegistryEvent {
    /// Returns `true` if any key this event concerns satisfies `filter`.
    pub fn concerns(&self, filter: impl Fn(&str) -> bool) -> bool {
        match self {
            Self::EntryCreated { key, .. }
            | Self::EntrySettled { key, .. }
            | Self::EntryTimedOut { key, .. }
            | Self::LateResultDiscarded { key, .. } => filter(key),
            Self::EntriesCleared { keys, .. } => keys.iter().any(|key| filter(key)),
        }
    }

    /// Returns the event timestamp.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::EntryCreated { timestamp, .. }
            | Self::EntrySettled { timestamp, .. }
            | Self::EntryTimedOut { timestamp, .. }
            | Self::EntriesCleared { timestamp, .. }
            | Self::LateResultDiscarded { timestamp, .. } => *timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_event_type_tag() {
        let event = RegistryEvent::EntryTimedOut {
            key: "user:1".to_string(),
            deadline_ms: 100,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap_or_default();
        assert_eq!(json["event_type"], "entry_timed_out");
        assert_eq!(json["deadline_ms"], 100);
    }

    #[test]
    fn settled_value_omits_error() {
        let event = RegistryEvent::EntrySettled {
            key: "k".to_string(),
            outcome: SettledAs::Value,
            error: None,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap_or_default();
        assert_eq!(json["outcome"], "value");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn concerns_checks_every_cleared_key() {
        let event = RegistryEvent::EntriesCleared {
            keys: vec!["a".to_string(), "user:2".to_string()],
            reason: ClearReason::Errors,
            timestamp: Utc::now(),
        };
        assert!(event.concerns(|key| key.starts_with("user:")));
        assert!(!event.concerns(|key| key == "b"));
    }
}
