//! Upstream fetch handlers: single-flight and TTL-cached.

use std::collections::BTreeMap;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::HeaderValue;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::{FetchResponse, take_ttl};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, GatewayError};

/// Response header reporting whether the TTL cache served the request.
pub const CACHE_HEADER: &str = "x-cache";

/// `GET /fetch/{path}` — Deduplicated upstream read.
///
/// # Errors
///
/// Returns [`GatewayError::UpstreamFailed`] or
/// [`GatewayError::UpstreamTimeout`] when the shared operation fails.
#[utoipa::path(
    get,
    path = "/api/v1/fetch/{path}",
    tag = "Fetch",
    summary = "Single-flight fetch",
    description = "Fetches `path` from the upstream. Concurrent identical requests share one upstream call; the outcome, value or error, is replayed until the entry is cleared.",
    params(
        ("path" = String, Path, description = "Upstream path"),
    ),
    responses(
        (status = 200, description = "Upstream document", body = FetchResponse),
        (status = 502, description = "Upstream failed", body = ErrorResponse),
        (status = 504, description = "Upstream timed out", body = ErrorResponse),
    )
)]
pub async fn fetch_shared(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<impl IntoResponse, GatewayError> {
    let handle = state.fetch_service.fetch_shared(&path, params)?;
    let key = handle.key().to_string();
    let data = handle.await?;
    Ok(Json(FetchResponse { key, data }))
}

/// `GET /cached/{path}` — TTL-cached upstream read.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] for a malformed `ttl_ms` and
/// [`GatewayError::UpstreamFailed`] when the upstream call fails.
#[utoipa::path(
    get,
    path = "/api/v1/cached/{path}",
    tag = "Fetch",
    summary = "TTL-cached fetch",
    description = "Fetches `path` through the TTL cache. Misses call the upstream directly without deduplication. `ttl_ms` overrides the default TTL and is not forwarded.",
    params(
        ("path" = String, Path, description = "Upstream path"),
        ("ttl_ms" = Option<u64>, Query, description = "TTL for a newly cached value"),
    ),
    responses(
        (status = 200, description = "Upstream document", body = FetchResponse),
        (status = 400, description = "Invalid ttl_ms", body = ErrorResponse),
        (status = 502, description = "Upstream failed", body = ErrorResponse),
    )
)]
pub async fn fetch_cached(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Query(mut params): Query<BTreeMap<String, String>>,
) -> Result<impl IntoResponse, GatewayError> {
    let ttl = take_ttl(&mut params)
        .map_err(|raw| GatewayError::InvalidRequest(format!("invalid ttl_ms `{raw}`")))?
        .map(Duration::from_millis);

    let key = state.fetch_service.key_for(&path, &params)?;
    let (data, hit) = state
        .fetch_service
        .fetch_cached(&path, &params, ttl)
        .await?;

    let mut response = Json(FetchResponse { key, data }).into_response();
    response
        .headers_mut()
        .insert(CACHE_HEADER, HeaderValue::from_static(hit.as_str()));
    Ok(response)
}

/// Fetch routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/fetch/{*path}", get(fetch_shared))
        .route("/cached/{*path}", get(fetch_cached))
}
