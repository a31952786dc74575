//! Per-key state record tracked by the result registry.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use utoipa::ToSchema;

use super::broadcaster::{Broadcaster, Outcome};
use super::RegistryError;

/// Observable lifecycle status of a key.
///
/// `Pending` is never stored: it is what a query reports when no entry
/// exists for the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// No entry exists for the key.
    Pending,
    /// The operation is running.
    InFlight,
    /// The operation produced its terminal value or error.
    Ready,
}

/// Lifecycle state of a stored entry. Moves from `InFlight` to `Ready`
/// exactly once.
#[derive(Debug, Clone)]
pub enum EntryState<T> {
    /// Waiting for the operation.
    InFlight,
    /// Terminal value or error.
    Ready(Outcome<T>),
}

/// State bundle for one key.
///
/// Only the registry mutates entries; callers receive clones as read-only
/// snapshots.
#[derive(Debug, Clone)]
pub struct ResultEntry<T> {
    key: String,
    generation: u64,
    state: EntryState<T>,
    broadcaster: Broadcaster<T>,
    created_at: DateTime<Utc>,
    started: Instant,
}

impl<T: Clone> ResultEntry<T> {
    pub(crate) fn new(key: String, generation: u64) -> Self {
        Self {
            key,
            generation,
            state: EntryState::InFlight,
            broadcaster: Broadcaster::new(),
            created_at: Utc::now(),
            started: Instant::now(),
        }
    }

    /// Records the terminal outcome. A second call is ignored.
    pub(crate) fn complete(&mut self, outcome: Outcome<T>) -> bool {
        if matches!(self.state, EntryState::Ready(_)) {
            return false;
        }
        self.state = EntryState::Ready(outcome);
        true
    }

    pub(crate) fn broadcaster(&self) -> &Broadcaster<T> {
        &self.broadcaster
    }

    pub(crate) const fn generation(&self) -> u64 {
        self.generation
    }

    /// Caller-supplied key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> &EntryState<T> {
        &self.state
    }

    /// Current status (`InFlight` or `Ready`).
    #[must_use]
    pub const fn status(&self) -> EntryStatus {
        match self.state {
            EntryState::InFlight => EntryStatus::InFlight,
            EntryState::Ready(_) => EntryStatus::Ready,
        }
    }

    /// Returns `true` once the entry has a terminal outcome.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self.state, EntryState::Ready(_))
    }

    /// Stored value, only when ready without error.
    #[must_use]
    pub const fn value(&self) -> Option<&T> {
        match &self.state {
            EntryState::Ready(Ok(value)) => Some(value),
            EntryState::Ready(Err(_)) | EntryState::InFlight => None,
        }
    }

    /// Stored error, only when ready with error.
    #[must_use]
    pub const fn error(&self) -> Option<&RegistryError> {
        match &self.state {
            EntryState::Ready(Err(error)) => Some(error),
            EntryState::Ready(Ok(_)) | EntryState::InFlight => None,
        }
    }

    /// Returns `true` when the entry is ready with an error.
    #[must_use]
    pub const fn has_error(&self) -> bool {
        matches!(self.state, EntryState::Ready(Err(_)))
    }

    /// Wall-clock creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Time elapsed since the entry was created.
    #[must_use]
    pub fn age(&self) -> std::time::Duration {
        self.started.elapsed()
    }
}
