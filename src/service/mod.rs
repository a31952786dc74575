//! Service layer: upstream reads through the registry and the TTL cache.
//!
//! [`FetchService`] coordinates single-flight and cached reads against an
//! [`Upstream`]; [`spawn_sweeper`] keeps both stores bounded over time.

pub mod fetch_service;
pub mod sweeper;
pub mod upstream;

pub use fetch_service::{CacheHit, FetchService};
pub use sweeper::spawn_sweeper;
pub use upstream::{HttpUpstream, Upstream, UpstreamFailure};
