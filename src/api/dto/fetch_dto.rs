//! Fetch and TTL cache DTOs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Reserved query parameter overriding the TTL on the cached endpoint.
pub const TTL_PARAM: &str = "ttl_ms";

/// Splits the reserved `ttl_ms` parameter out of the forwarded query.
///
/// Returns `Err` with the raw value when `ttl_ms` is present but not a
/// non-negative integer.
pub fn take_ttl(params: &mut BTreeMap<String, String>) -> Result<Option<u64>, String> {
    match params.remove(TTL_PARAM) {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|_| raw),
    }
}

/// Response body for the fetch endpoints.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FetchResponse {
    /// Registry or cache key the value is stored under.
    pub key: String,
    /// Upstream JSON document.
    #[schema(value_type = Object)]
    pub data: serde_json::Value,
}

/// Response body for `GET /cache`.
#[derive(Debug, Serialize, ToSchema)]
pub struct CacheContentsResponse {
    /// Number of unexpired values.
    pub size: usize,
    /// Keys of unexpired values in ascending order.
    pub keys: Vec<String>,
}
