//! Single-flight result registry keyed by string.
//!
//! [`ResultRegistry`] maps keys to [`ResultEntry`]s behind one
//! `RwLock<HashMap<..>>`. The write lock serializes entry creation, the
//! `InFlight -> Ready` transition, and eviction; reads clone out of a
//! consistent view of the map.
//!
//! # Flow
//!
//! ```text
//! execute(key, op)
//!     │
//!     ├── no entry ──► create entry + broadcaster, spawn op ──► Handle
//!     ├── in flight ─► subscribe to existing broadcaster ─────► Handle
//!     └── ready ─────► subscribe (replays stored outcome) ────► Handle
//!
//! op resolves / deadline fires
//!     └── settle: first outcome wins the broadcaster; it is recorded in
//!         the map only if the entry there is still the same generation
//! ```
//!
//! Clearing an in-flight entry detaches it: its subscribers still receive
//! the eventual outcome, but the outcome is never written back, and a new
//! `execute` for the key starts a fresh operation.

use std::collections::{BTreeMap, HashMap};
use std::error::Error as StdError;
use std::future::{Future, IntoFuture};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::Utc;
use futures_util::future::BoxFuture;
use futures_util::stream::Stream;

use super::broadcaster::{Broadcaster, Outcome, Subscription};
use super::registry_event::{ClearReason, SettledAs};
use super::result_entry::{EntryState, EntryStatus, ResultEntry};
use super::{EventBus, RegistryError, RegistryEvent};

/// Snapshot of registry counters.
///
/// `total == searching + ready + errors` always holds for a snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Number of entries in the map.
    pub total: usize,
    /// Entries still in flight.
    pub searching: usize,
    /// Entries ready with a value.
    pub ready: usize,
    /// Entries ready with an error.
    pub errors: usize,
}

/// Caller's handle on a (possibly shared) operation.
///
/// Await it to get the terminal value or error. Dropping it withdraws only
/// this caller's interest; the operation keeps running for everyone else.
#[derive(Debug)]
pub struct Handle<T> {
    key: String,
    subscription: Subscription<T>,
}

impl<T: Clone + Send + Sync + 'static> Handle<T> {
    /// Key this handle is bound to.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Converts the handle into a stream yielding exactly one outcome.
    pub fn into_stream(self) -> impl Stream<Item = Outcome<T>> + Send {
        futures_util::stream::once(self.into_future())
    }
}

impl<T: Clone + Send + Sync + 'static> IntoFuture for Handle<T> {
    type Output = Outcome<T>;
    type IntoFuture = BoxFuture<'static, Outcome<T>>;

    fn into_future(self) -> Self::IntoFuture {
        let Self { key, subscription } = self;
        Box::pin(async move {
            subscription
                .recv()
                .await
                .unwrap_or(Err(RegistryError::Abandoned { key }))
        })
    }
}

/// Abandons a freshly created entry if `start` unwinds before the
/// operation is spawned.
struct StartGuard<'a, T: Clone + Send + Sync + 'static> {
    registry: &'a ResultRegistry<T>,
    key: &'a str,
    generation: u64,
    broadcaster: &'a Broadcaster<T>,
    armed: bool,
}

impl<T: Clone + Send + Sync + 'static> Drop for StartGuard<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            self.registry
                .abandon(self.key, self.generation, self.broadcaster);
        }
    }
}

/// How a settlement attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settled {
    /// Delivered to subscribers and recorded in the map.
    Recorded,
    /// Delivered to subscribers of an entry no longer in the map.
    Detached,
    /// The entry had already terminated; the outcome reached nobody.
    Discarded,
}

#[derive(Debug)]
struct Inner<T> {
    entries: RwLock<HashMap<String, ResultEntry<T>>>,
    next_generation: AtomicU64,
    events: EventBus,
}

/// Keyed single-flight registry.
///
/// Cloning is cheap and yields another handle on the same registry.
///
/// # Concurrency
///
/// - Any number of tasks may call [`ResultRegistry::execute`] for the same
///   or different keys; per key at most one operation is started while an
///   entry exists.
/// - The lock is never held across an `.await`.
#[derive(Debug)]
pub struct ResultRegistry<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for ResultRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> ResultRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates an empty registry with its own event bus.
    #[must_use]
    pub fn new() -> Self {
        Self::with_event_bus(EventBus::default())
    }

    /// Creates an empty registry publishing lifecycle events on `events`.
    #[must_use]
    pub fn with_event_bus(events: EventBus) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: RwLock::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
                events,
            }),
        }
    }

    /// Event bus this registry publishes to.
    #[must_use]
    pub fn event_bus(&self) -> &EventBus {
        &self.inner.events
    }

    /// Runs `operation` under `key` at most once while an entry exists.
    ///
    /// - No entry: creates one, invokes `operation` once, and spawns the
    ///   returned future on the Tokio runtime.
    /// - In flight: joins the running operation; `operation` is not invoked.
    /// - Ready: replays the stored value or error; `operation` is not invoked.
    ///
    /// Returns immediately. Failures surface only when the handle is awaited.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime while no entry exists for
    /// `key`.
    pub fn execute<F, Fut, E>(&self, key: impl Into<String>, operation: F) -> Handle<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<Box<dyn StdError + Send + Sync + 'static>> + Send + 'static,
    {
        self.start(key.into(), operation, None)
    }

    /// Same as [`ResultRegistry::execute`], with a deadline armed when the
    /// operation starts.
    ///
    /// If the entry is still in flight when `deadline` elapses, it becomes
    /// ready with [`RegistryError::Timeout`] and every subscriber receives
    /// that error. The operation itself keeps running; its eventual result
    /// is discarded. Joining an existing entry does not arm a new deadline.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime while no entry exists for
    /// `key`.
    pub fn execute_with_timeout<F, Fut, E>(
        &self,
        key: impl Into<String>,
        operation: F,
        deadline: Duration,
    ) -> Handle<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<Box<dyn StdError + Send + Sync + 'static>> + Send + 'static,
    {
        self.start(key.into(), operation, Some(deadline))
    }

    fn start<F, Fut, E>(&self, key: String, operation: F, deadline: Option<Duration>) -> Handle<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<Box<dyn StdError + Send + Sync + 'static>> + Send + 'static,
    {
        if key.is_empty() {
            tracing::warn!("executing under an empty registry key");
        }

        let mut map = self.write();
        if let Some(entry) = map.get(&key) {
            let subscribers = entry.broadcaster().subscriber_count();
            match entry.state() {
                EntryState::InFlight => {
                    tracing::debug!(%key, subscribers, "joining in-flight operation");
                }
                EntryState::Ready(_) => tracing::debug!(%key, "replaying stored outcome"),
            }
            let subscription = entry.broadcaster().subscribe();
            return Handle { key, subscription };
        }

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let entry = ResultEntry::new(key.clone(), generation);
        let broadcaster = entry.broadcaster().clone();
        let subscription = broadcaster.subscribe();
        map.insert(key.clone(), entry);
        drop(map);

        tracing::debug!(%key, generation, "starting operation");
        let _ = self.inner.events.publish(RegistryEvent::EntryCreated {
            key: key.clone(),
            timestamp: Utc::now(),
        });

        // Until the operation is spawned, an unwind must not leave the
        // entry in flight with nobody to settle it.
        let mut guard = StartGuard {
            registry: self,
            key: &key,
            generation,
            broadcaster: &broadcaster,
            armed: true,
        };
        let future = operation();
        let registry = self.clone();
        tokio::spawn(registry.drive(
            key.clone(),
            generation,
            broadcaster.clone(),
            future,
            deadline,
        ));
        guard.armed = false;
        drop(guard);

        Handle { key, subscription }
    }

    /// Resolves an entry whose operation never started with
    /// [`RegistryError::Abandoned`] and forgets it, so the next `execute`
    /// starts fresh.
    fn abandon(&self, key: &str, generation: u64, broadcaster: &Broadcaster<T>) {
        let removed = {
            let mut map = self.write();
            broadcaster.publish(Err(RegistryError::Abandoned {
                key: key.to_string(),
            }));
            let current = map.get(key).is_some_and(|entry| entry.generation() == generation);
            if current {
                map.remove(key);
            }
            current
        };
        tracing::error!(%key, "operation could not be started");
        if removed {
            self.publish_cleared(vec![key.to_string()], ClearReason::Abandoned);
        }
    }

    /// Runs the operation on its own task and races it against the deadline.
    async fn drive<Fut, E>(
        self,
        key: String,
        generation: u64,
        broadcaster: Broadcaster<T>,
        future: Fut,
        deadline: Option<Duration>,
    ) where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<Box<dyn StdError + Send + Sync + 'static>> + Send + 'static,
    {
        let mut task = tokio::spawn(future);

        let joined = match deadline {
            None => (&mut task).await,
            Some(deadline) => {
                tokio::select! {
                    joined = &mut task => joined,
                    () = tokio::time::sleep(deadline) => {
                        self.expire(&key, generation, &broadcaster, deadline);
                        task.await
                    }
                }
            }
        };

        let outcome = match joined {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(RegistryError::upstream(error)),
            Err(join_error) => {
                tracing::error!(%key, error = %join_error, "operation task failed");
                Err(RegistryError::Abandoned { key: key.clone() })
            }
        };

        let error = outcome.as_ref().err().map(ToString::to_string);
        match self.settle(&key, generation, &broadcaster, outcome) {
            Settled::Recorded => {
                match &error {
                    None => tracing::info!(%key, "operation resolved"),
                    Some(error) => tracing::warn!(%key, %error, "operation failed"),
                }
                let _ = self.inner.events.publish(RegistryEvent::EntrySettled {
                    key,
                    outcome: if error.is_some() {
                        SettledAs::Error
                    } else {
                        SettledAs::Value
                    },
                    error,
                    timestamp: Utc::now(),
                });
            }
            Settled::Detached | Settled::Discarded => {
                tracing::debug!(%key, "late result discarded");
                let _ = self
                    .inner
                    .events
                    .publish(RegistryEvent::LateResultDiscarded {
                        key,
                        timestamp: Utc::now(),
                    });
            }
        }
    }

    fn expire(&self, key: &str, generation: u64, broadcaster: &Broadcaster<T>, deadline: Duration) {
        let deadline_ms = u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX);
        let error = RegistryError::Timeout {
            key: key.to_string(),
            deadline_ms,
        };
        if self.settle(key, generation, broadcaster, Err(error)) == Settled::Discarded {
            return;
        }
        tracing::warn!(%key, deadline_ms, "operation timed out");
        let _ = self.inner.events.publish(RegistryEvent::EntryTimedOut {
            key: key.to_string(),
            deadline_ms,
            timestamp: Utc::now(),
        });
    }

    /// Delivers `outcome` if the entry has not terminated yet, recording it
    /// in the map when the stored entry is still this generation.
    fn settle(
        &self,
        key: &str,
        generation: u64,
        broadcaster: &Broadcaster<T>,
        outcome: Outcome<T>,
    ) -> Settled {
        let mut map = self.write();
        if !broadcaster.publish(outcome.clone()) {
            return Settled::Discarded;
        }
        match map.get_mut(key) {
            Some(entry) if entry.generation() == generation => {
                entry.complete(outcome);
                Settled::Recorded
            }
            _ => Settled::Detached,
        }
    }

    /// Returns `true` if an entry exists for `key`.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    /// Returns the status of `key`; [`EntryStatus::Pending`] if absent.
    #[must_use]
    pub fn status(&self, key: &str) -> EntryStatus {
        self.read()
            .get(key)
            .map_or(EntryStatus::Pending, ResultEntry::status)
    }

    /// Returns the stored value if the entry is ready without error.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<T> {
        self.read().get(key).and_then(ResultEntry::value).cloned()
    }

    /// Returns `true` if the entry is ready (with a value or an error).
    #[must_use]
    pub fn is_ready(&self, key: &str) -> bool {
        self.status(key) == EntryStatus::Ready
    }

    /// Returns `true` if the entry is in flight.
    #[must_use]
    pub fn is_searching(&self, key: &str) -> bool {
        self.status(key) == EntryStatus::InFlight
    }

    /// Returns `true` if the entry is ready with an error.
    #[must_use]
    pub fn has_error(&self, key: &str) -> bool {
        self.read().get(key).is_some_and(ResultEntry::has_error)
    }

    /// Returns the stored error, if the entry is ready with one.
    #[must_use]
    pub fn error(&self, key: &str) -> Option<RegistryError> {
        self.read().get(key).and_then(ResultEntry::error).cloned()
    }

    /// Returns a read-only snapshot of the entry for `key`.
    #[must_use]
    pub fn entry(&self, key: &str) -> Option<ResultEntry<T>> {
        self.read().get(key).cloned()
    }

    /// Removes the entry for `key`. Returns `true` if one existed.
    ///
    /// An in-flight entry is detached, not cancelled.
    pub fn clear(&self, key: &str) -> bool {
        let removed = self.write().remove(key).is_some();
        if removed {
            tracing::info!(%key, "entry cleared");
            self.publish_cleared(vec![key.to_string()], ClearReason::Explicit);
        }
        removed
    }

    /// Removes every entry. Returns the number removed.
    pub fn clear_all(&self) -> usize {
        let keys: Vec<String> = {
            let mut map = self.write();
            map.drain().map(|(key, _)| key).collect()
        };
        self.report_evicted(keys, ClearReason::All)
    }

    /// Removes entries, in flight or ready, older than `max_age`.
    /// Returns the number removed.
    pub fn clear_old(&self, max_age: Duration) -> usize {
        let keys = self.evict_where(|entry| entry.age() > max_age);
        self.report_evicted(keys, ClearReason::Expired)
    }

    /// Removes only entries that are ready with an error.
    /// Returns the number removed.
    pub fn clear_errors(&self) -> usize {
        let keys = self.evict_where(ResultEntry::has_error);
        self.report_evicted(keys, ClearReason::Errors)
    }

    /// Computes counters from one consistent view of the map.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let map = self.read();
        let mut stats = RegistryStats {
            total: map.len(),
            ..RegistryStats::default()
        };
        for entry in map.values() {
            match entry.state() {
                EntryState::InFlight => stats.searching += 1,
                EntryState::Ready(Ok(_)) => stats.ready += 1,
                EntryState::Ready(Err(_)) => stats.errors += 1,
            }
        }
        stats
    }

    /// Returns all keys in ascending order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.read().keys().cloned().collect();
        keys.sort_unstable();
        keys
    }

    /// Returns the value of every entry that is ready without error.
    #[must_use]
    pub fn all_ready(&self) -> BTreeMap<String, T> {
        self.read()
            .iter()
            .filter_map(|(key, entry)| entry.value().map(|value| (key.clone(), value.clone())))
            .collect()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns `true` if the registry holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn evict_where(&self, mut predicate: impl FnMut(&ResultEntry<T>) -> bool) -> Vec<String> {
        let mut removed = Vec::new();
        self.write().retain(|key, entry| {
            if predicate(entry) {
                removed.push(key.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    fn report_evicted(&self, mut keys: Vec<String>, reason: ClearReason) -> usize {
        let count = keys.len();
        if count > 0 {
            keys.sort_unstable();
            tracing::info!(count, ?reason, "entries cleared");
            self.publish_cleared(keys, reason);
        }
        count
    }

    fn publish_cleared(&self, keys: Vec<String>, reason: ClearReason) {
        let _ = self.inner.events.publish(RegistryEvent::EntriesCleared {
            keys,
            reason,
            timestamp: Utc::now(),
        });
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, ResultEntry<T>>> {
        self.inner
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, ResultEntry<T>>> {
        self.inner
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for ResultRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
