//! # result-registry
//!
//! Keyed single-flight result registry and TTL cache, served as an HTTP and
//! WebSocket gateway in front of an upstream JSON API.
//!
//! Concurrent requests for the same key share one upstream operation; its
//! outcome (value or error) is replayed to later callers until the entry is
//! cleared. A separate TTL cache offers time-bounded reuse without
//! deduplication.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, WebSocket)
//!     │
//!     ├── REST Handlers (api/)
//!     ├── WS Handler (ws/)
//!     │
//!     ├── FetchService + sweeper (service/)
//!     ├── EventBus (domain/)
//!     │
//!     ├── ResultRegistry / TtlCache (domain/)
//!     │
//!     └── Upstream (reqwest)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod service;
pub mod ws;
