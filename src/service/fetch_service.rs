//! Fetch service: deduplicated and TTL-cached upstream reads.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use super::upstream::Upstream;
use crate::domain::{Handle, ResultRegistry, TtlCache, cache_key};
use crate::error::GatewayError;

/// Whether a cached read was served from the TTL cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheHit {
    /// Served from the cache.
    Hit,
    /// Fetched from the upstream and stored.
    Miss,
}

impl CacheHit {
    /// Header-friendly label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
        }
    }
}

/// Describes one upstream read for key derivation.
#[derive(Debug, Serialize)]
struct ReadDescriptor<'a> {
    path: &'a str,
    params: &'a BTreeMap<String, String>,
}

/// Orchestration layer for upstream reads.
///
/// Owns the shared [`ResultRegistry`] (single-flight path) and the
/// [`TtlCache`] (duplicate work on a miss is acceptable).
#[derive(Debug, Clone)]
pub struct FetchService {
    registry: Arc<ResultRegistry<Value>>,
    cache: Arc<TtlCache<Value>>,
    upstream: Arc<dyn Upstream>,
    upstream_timeout: Duration,
}

impl FetchService {
    /// Creates a new `FetchService`.
    #[must_use]
    pub fn new(
        registry: Arc<ResultRegistry<Value>>,
        cache: Arc<TtlCache<Value>>,
        upstream: Arc<dyn Upstream>,
        upstream_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            cache,
            upstream,
            upstream_timeout,
        }
    }

    /// Returns a reference to the inner [`ResultRegistry`].
    #[must_use]
    pub fn registry(&self) -> &Arc<ResultRegistry<Value>> {
        &self.registry
    }

    /// Returns a reference to the inner [`TtlCache`].
    #[must_use]
    pub fn cache(&self) -> &Arc<TtlCache<Value>> {
        &self.cache
    }

    /// Derives the registry/cache key for a read.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] if the parameters cannot be
    /// encoded.
    pub fn key_for(
        &self,
        path: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<String, GatewayError> {
        let path = path.trim_start_matches('/');
        cache_key(
            self.upstream.base(),
            "GET",
            Some(&ReadDescriptor { path, params }),
        )
        .map_err(|e| GatewayError::Internal(format!("cannot encode cache key: {e}")))
    }

    /// Starts (or joins) a single-flight read of `path`.
    ///
    /// Concurrent callers for the same path and parameters share one
    /// upstream call; once it resolves, later callers replay its outcome
    /// until the entry is cleared.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] if `path` leaves the
    /// upstream base and [`GatewayError::Internal`] if the key cannot be
    /// derived. Upstream failures surface when the handle is awaited.
    pub fn fetch_shared(
        &self,
        path: &str,
        params: BTreeMap<String, String>,
    ) -> Result<Handle<Value>, GatewayError> {
        self.upstream.validate_path(path)?;
        let key = self.key_for(path, &params)?;
        let upstream = Arc::clone(&self.upstream);
        let path = path.to_string();
        Ok(self.registry.execute_with_timeout(
            key,
            move || async move { upstream.get_json(&path, &params).await },
            self.upstream_timeout,
        ))
    }

    /// Reads `path` through the TTL cache.
    ///
    /// On a miss the upstream is called directly and the value stored for
    /// `ttl` (or the cache default). Concurrent misses each call the
    /// upstream.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] if `path` leaves the
    /// upstream base and [`GatewayError::UpstreamFailed`] if the upstream
    /// call fails.
    pub async fn fetch_cached(
        &self,
        path: &str,
        params: &BTreeMap<String, String>,
        ttl: Option<Duration>,
    ) -> Result<(Value, CacheHit), GatewayError> {
        self.upstream.validate_path(path)?;
        let key = self.key_for(path, params)?;
        if let Some(value) = self.cache.get(&key) {
            tracing::debug!(%key, "cache hit");
            return Ok((value, CacheHit::Hit));
        }

        let value = self.upstream.get_json(path, params).await?;
        let ttl = ttl.unwrap_or_else(|| self.cache.default_ttl());
        self.cache.set(key, value.clone(), ttl);
        Ok((value, CacheHit::Miss))
    }
}
