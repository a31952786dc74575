//! Domain layer: the single-flight result registry and its building blocks.
//!
//! This module contains the one-shot broadcaster, the per-key result
//! entry, the registry that coordinates concurrent callers, the lifecycle
//! event bus, and the independent TTL cache.

pub mod broadcaster;
pub mod event_bus;
pub mod registry_error;
pub mod registry_event;
pub mod result_entry;
pub mod result_registry;
pub mod ttl_cache;

pub use broadcaster::{Broadcaster, Outcome, Subscription};
pub use event_bus::EventBus;
pub use registry_error::{RegistryError, SharedError};
pub use registry_event::{ClearReason, RegistryEvent, SettledAs};
pub use result_entry::{EntryState, EntryStatus, ResultEntry};
pub use result_registry::{Handle, RegistryStats, ResultRegistry};
pub use ttl_cache::{TtlCache, cache_key};
