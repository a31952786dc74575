//! Expiring key/value cache without single-flight coordination.
//!
//! [`TtlCache`] is the low-stakes sibling of [`super::ResultRegistry`]:
//! concurrent misses on the same key each repeat the underlying work.
//! Expiry is lazy; an expired entry is removed when `get` or `has` finds it.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

/// Default time-to-live for [`TtlCache::insert`] (five minutes).
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

#[derive(Debug)]
struct CacheEntry<T> {
    value: T,
    inserted: Instant,
    ttl: Duration,
}

impl<T> CacheEntry<T> {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted) > self.ttl
    }
}

/// In-memory cache whose entries expire after a per-entry TTL.
#[derive(Debug)]
pub struct TtlCache<T> {
    entries: RwLock<HashMap<String, CacheEntry<T>>>,
    default_ttl: Duration,
}

impl<T: Clone> TtlCache<T> {
    /// Creates an empty cache using [`DEFAULT_TTL`] for [`TtlCache::insert`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_default_ttl(DEFAULT_TTL)
    }

    /// Creates an empty cache with a custom default TTL.
    #[must_use]
    pub fn with_default_ttl(default_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
        }
    }

    /// Default TTL used by [`TtlCache::insert`].
    #[must_use]
    pub const fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Stores `value` under `key` for `ttl`, replacing any previous value.
    pub fn set(&self, key: impl Into<String>, value: T, ttl: Duration) {
        let key = key.into();
        tracing::trace!(%key, ttl_ms = ttl.as_millis(), "cache set");
        self.write().insert(
            key,
            CacheEntry {
                value,
                inserted: Instant::now(),
                ttl,
            },
        );
    }

    /// Stores `value` under `key` with the default TTL.
    pub fn insert(&self, key: impl Into<String>, value: T) {
        self.set(key, value, self.default_ttl);
    }

    /// Returns the value for `key` unless it is absent or expired.
    pub fn get(&self, key: &str) -> Option<T> {
        let now = Instant::now();
        let mut map = self.write();
        let entry = map.get(key)?;
        if !entry.is_expired(now) {
            return Some(entry.value.clone());
        }
        map.remove(key);
        tracing::trace!(%key, "cache entry expired");
        None
    }

    /// Returns `true` if `key` holds an unexpired value.
    pub fn has(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut map = self.write();
        match map.get(key).map(|entry| entry.is_expired(now)) {
            None => false,
            Some(false) => true,
            Some(true) => {
                map.remove(key);
                false
            }
        }
    }

    /// Removes `key`. Returns `true` if it was present (expired or not).
    pub fn delete(&self, key: &str) -> bool {
        self.write().remove(key).is_some()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.write().clear();
    }

    /// Eagerly removes all expired entries. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut map = self.write();
        let before = map.len();
        map.retain(|_, entry| !entry.is_expired(now));
        before - map.len()
    }

    /// Returns the keys holding unexpired values, in ascending order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let map = self.read();
        let mut keys: Vec<String> = map
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort_unstable();
        keys
    }

    /// Number of stored entries, including expired ones not yet purged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, CacheEntry<T>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, CacheEntry<T>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone> Default for TtlCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds a deterministic cache key from an operation descriptor and its
/// parameters: `"{base}_{method}_{hex(json(params))}"`.
///
/// The parameter part is empty when `params` is `None`. Parameters must
/// serialize deterministically (structs, `BTreeMap`, `serde_json::Value`);
/// a `HashMap` does not.
///
/// # Errors
///
/// Returns the serialization error if `params` cannot be encoded as JSON.
pub fn cache_key<P>(base: &str, method: &str, params: Option<&P>) -> Result<String, serde_json::Error>
where
    P: Serialize + ?Sized,
{
    let encoded = match params {
        Some(params) => hex::encode(serde_json::to_vec(params)?),
        None => String::new(),
    };
    Ok(format!("{base}_{method}_{encoded}"))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[tokio::test(start_paused = true)]
    async fn value_expires_after_ttl() {
        let cache = TtlCache::new();
        cache.set("k", 5, Duration::from_millis(100));
        assert_eq!(cache.get("k"), Some(5));

        tokio::time::advance(Duration::from_millis(150)).await;
        assert_eq!(cache.get("k"), None);
        assert!(!cache.has("k"));
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn has_removes_expired_entry() {
        let cache = TtlCache::new();
        cache.set("k", "v".to_string(), Duration::from_millis(10));
        assert!(cache.has("k"));

        tokio::time::advance(Duration::from_millis(11)).await;
        assert_eq!(cache.len(), 1);
        assert!(!cache.has("k"));
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn keys_are_sorted_and_skip_expired() {
        let cache = TtlCache::new();
        cache.set("b", 2, Duration::from_secs(10));
        cache.set("a", 1, Duration::from_secs(10));
        cache.set("gone", 0, Duration::from_millis(5));
        assert_eq!(cache.keys(), vec!["a", "b", "gone"]);

        tokio::time::advance(Duration::from_millis(6)).await;
        assert_eq!(cache.keys(), vec!["a", "b"]);
        assert_eq!(cache.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn entry_is_live_at_exactly_ttl() {
        let cache = TtlCache::new();
        cache.set("k", 1, Duration::from_millis(100));
        tokio::time::advance(Duration::from_millis(100)).await;
        assert_eq!(cache.get("k"), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn insert_uses_default_ttl() {
        let cache = TtlCache::with_default_ttl(Duration::from_secs(1));
        assert_eq!(cache.default_ttl(), Duration::from_secs(1));
        cache.insert("k", 1);

        tokio::time::advance(Duration::from_millis(900)).await;
        assert!(cache.has("k"));
        tokio::time::advance(Duration::from_millis(200)).await;
        assert!(!cache.has("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn set_replaces_and_restarts_ttl() {
        let cache = TtlCache::new();
        cache.set("k", 1, Duration::from_millis(100));
        tokio::time::advance(Duration::from_millis(80)).await;
        cache.set("k", 2, Duration::from_millis(100));
        tokio::time::advance(Duration::from_millis(80)).await;
        assert_eq!(cache.get("k"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn purge_expired_removes_only_expired() {
        let cache = TtlCache::new();
        cache.set("short", 1, Duration::from_millis(10));
        cache.set("long", 2, Duration::from_secs(10));
        tokio::time::advance(Duration::from_millis(50)).await;

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("long"), Some(2));
    }

    #[test]
    fn delete_and_clear() {
        let cache = TtlCache::new();
        cache.insert("a", 1);
        cache.insert("b", 2);

        assert!(cache.delete("a"));
        assert!(!cache.delete("a"));
        assert_eq!(cache.get("b"), Some(2));

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn cache_key_is_deterministic() {
        let mut params = BTreeMap::new();
        params.insert("page", "2");
        params.insert("filter", "active");

        let Ok(first) = cache_key("https://api.example.com/users", "GET", Some(&params)) else {
            panic!("params serialize");
        };
        let Ok(second) = cache_key("https://api.example.com/users", "GET", Some(&params)) else {
            panic!("params serialize");
        };
        assert_eq!(first, second);
        assert!(first.starts_with("https://api.example.com/users_GET_"));
    }

    #[test]
    fn cache_key_distinguishes_params_and_method() {
        let a = cache_key("base", "GET", Some(&serde_json::json!({"id": 1}))).ok();
        let b = cache_key("base", "GET", Some(&serde_json::json!({"id": 2}))).ok();
        let c = cache_key("base", "POST", Some(&serde_json::json!({"id": 1}))).ok();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn cache_key_without_params_has_empty_suffix() {
        let key = cache_key::<()>("base", "GET", None).ok();
        assert_eq!(key.as_deref(), Some("base_GET_"));
    }

    #[test]
    fn cache_key_encodes_params_as_hex_json() {
        let key = cache_key("b", "m", Some(&[1, 2])).ok();
        assert_eq!(key.as_deref(), Some("b_m_5b312c325d"));
    }
}
