//! Per-connection subscription manager.
//!
//! Tracks which registry keys a WebSocket client follows and provides
//! server-side event filtering. A pattern ending in `*` matches every key
//! with that prefix; `"*"` alone matches everything.

use std::collections::BTreeSet;

use crate::domain::RegistryEvent;

/// Manages the set of key patterns for a single WebSocket connection.
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    /// Exact keys.
    keys: BTreeSet<String>,
    /// Key prefixes (patterns ending in `*`, stored without it).
    prefixes: BTreeSet<String>,
}

impl SubscriptionManager {
    /// Creates a new empty subscription manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds key patterns to the subscription set.
    pub fn subscribe<S: AsRef<str>>(&mut self, patterns: &[S]) {
        for pattern in patterns {
            let pattern = pattern.as_ref();
            match pattern.strip_suffix('*') {
                Some(prefix) => self.prefixes.insert(prefix.to_string()),
                None => self.keys.insert(pattern.to_string()),
            };
        }
    }

    /// Removes key patterns from the subscription set.
    pub fn unsubscribe<S: AsRef<str>>(&mut self, patterns: &[S]) {
        for pattern in patterns {
            let pattern = pattern.as_ref();
            match pattern.strip_suffix('*') {
                Some(prefix) => self.prefixes.remove(prefix),
                None => self.keys.remove(pattern),
            };
        }
    }

    /// Returns `true` if `key` matches any subscribed pattern.
    #[must_use]
    pub fn matches_key(&self, key: &str) -> bool {
        self.keys.contains(key) || self.prefixes.iter().any(|prefix| key.starts_with(prefix))
    }

    /// Returns `true` if the event concerns a subscribed key.
    #[must_use]
    pub fn matches(&self, event: &RegistryEvent) -> bool {
        event.concerns(|key| self.matches_key(key))
    }

    /// Returns the number of subscribed patterns.
    #[must_use]
    pub fn count(&self) -> usize {
        self.keys.len() + self.prefixes.len()
    }

    /// Returns `true` if the wildcard `"*"` subscription is active.
    #[must_use]
    pub fn is_subscribed_all(&self) -> bool {
        self.prefixes.contains("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn created(key: &str) -> RegistryEvent {
        RegistryEvent::EntryCreated {
            key: key.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn empty_manager_matches_nothing() {
        let subs = SubscriptionManager::new();
        assert!(!subs.matches(&created("user:1")));
        assert_eq!(subs.count(), 0);
    }

    #[test]
    fn exact_and_prefix_patterns() {
        let mut subs = SubscriptionManager::new();
        subs.subscribe(&["report:7", "user:*"]);

        assert!(subs.matches(&created("report:7")));
        assert!(subs.matches(&created("user:42")));
        assert!(!subs.matches(&created("report:8")));
        assert!(!subs.is_subscribed_all());
    }

    #[test]
    fn wildcard_matches_everything() {
        let mut subs = SubscriptionManager::new();
        subs.subscribe(&["*"]);
        assert!(subs.is_subscribed_all());
        assert!(subs.matches(&created("anything")));
    }

    #[test]
    fn unsubscribe_removes_patterns() {
        let mut subs = SubscriptionManager::new();
        subs.subscribe(&["a", "b*"]);
        subs.unsubscribe(&["a", "b*"]);
        assert_eq!(subs.count(), 0);
        assert!(!subs.matches_key("a"));
        assert!(!subs.matches_key("bee"));
    }
}
