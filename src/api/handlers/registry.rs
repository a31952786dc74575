//! Registry inspection and eviction handlers.

use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};

use crate::api::dto::{
    ClearOldParams, ClearedResponse, EntryDetailResponse, KeysResponse, ReadyResponse,
    StatsResponse,
};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, GatewayError};

/// `GET /registry/stats` — Entry counters.
#[utoipa::path(
    get,
    path = "/api/v1/registry/stats",
    tag = "Registry",
    summary = "Registry statistics",
    description = "Counts entries by lifecycle state. `total` always equals `searching + ready + errors`.",
    responses(
        (status = 200, description = "Current counters", body = StatsResponse),
    )
)]
pub async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(StatsResponse::from(state.fetch_service.registry().stats()))
}

/// `GET /registry/keys` — All keys.
#[utoipa::path(
    get,
    path = "/api/v1/registry/keys",
    tag = "Registry",
    summary = "List keys",
    description = "Returns every key currently held by the registry, in ascending order.",
    responses(
        (status = 200, description = "Registry keys", body = KeysResponse),
    )
)]
pub async fn list_keys(State(state): State<AppState>) -> impl IntoResponse {
    Json(KeysResponse {
        keys: state.fetch_service.registry().keys(),
    })
}

/// `GET /registry/ready` — Values of all successfully resolved entries.
#[utoipa::path(
    get,
    path = "/api/v1/registry/ready",
    tag = "Registry",
    summary = "List ready values",
    description = "Returns the value of every entry that is ready without error.",
    responses(
        (status = 200, description = "Ready values by key", body = ReadyResponse),
    )
)]
pub async fn list_ready(State(state): State<AppState>) -> impl IntoResponse {
    Json(ReadyResponse {
        entries: state.fetch_service.registry().all_ready(),
    })
}

/// `GET /registry/entries/{key}` — One entry.
///
/// # Errors
///
/// Returns [`GatewayError::EntryNotFound`] if no entry exists for the key.
#[utoipa::path(
    get,
    path = "/api/v1/registry/entries/{key}",
    tag = "Registry",
    summary = "Get entry",
    description = "Returns status, age, and the stored value or error of one entry.",
    params(
        ("key" = String, Path, description = "Entry key, percent-encoded"),
    ),
    responses(
        (status = 200, description = "Entry detail", body = EntryDetailResponse),
        (status = 404, description = "No entry for key", body = ErrorResponse),
    )
)]
pub async fn get_entry(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, GatewayError> {
    let entry = state
        .fetch_service
        .registry()
        .entry(&key)
        .ok_or(GatewayError::EntryNotFound(key))?;
    Ok(Json(EntryDetailResponse::from(&entry)))
}

/// `DELETE /registry/entries/{key}` — Clear one entry.
///
/// # Errors
///
/// Returns [`GatewayError::EntryNotFound`] if no entry exists for the key.
#[utoipa::path(
    delete,
    path = "/api/v1/registry/entries/{key}",
    tag = "Registry",
    summary = "Clear entry",
    description = "Removes one entry. An in-flight operation keeps running for its current subscribers; the next fetch starts fresh.",
    params(
        ("key" = String, Path, description = "Entry key, percent-encoded"),
    ),
    responses(
        (status = 204, description = "Entry cleared"),
        (status = 404, description = "No entry for key", body = ErrorResponse),
    )
)]
pub async fn clear_entry(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, GatewayError> {
    if state.fetch_service.registry().clear(&key) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(GatewayError::EntryNotFound(key))
    }
}

/// `DELETE /registry/entries` — Clear everything.
#[utoipa::path(
    delete,
    path = "/api/v1/registry/entries",
    tag = "Registry",
    summary = "Clear all entries",
    description = "Removes every entry from the registry.",
    responses(
        (status = 200, description = "Number of entries removed", body = ClearedResponse),
    )
)]
pub async fn clear_all(State(state): State<AppState>) -> impl IntoResponse {
    Json(ClearedResponse {
        cleared: state.fetch_service.registry().clear_all(),
    })
}

/// `POST /registry/clear-old` — Evict aged entries.
#[utoipa::path(
    post,
    path = "/api/v1/registry/clear-old",
    tag = "Registry",
    summary = "Clear old entries",
    description = "Removes entries, in flight or ready, created more than `max_age_ms` ago.",
    params(ClearOldParams),
    responses(
        (status = 200, description = "Number of entries removed", body = ClearedResponse),
    )
)]
pub async fn clear_old(
    State(state): State<AppState>,
    Query(params): Query<ClearOldParams>,
) -> impl IntoResponse {
    let max_age = Duration::from_millis(params.max_age_ms);
    Json(ClearedResponse {
        cleared: state.fetch_service.registry().clear_old(max_age),
    })
}

/// `POST /registry/clear-errors` — Evict failed entries.
#[utoipa::path(
    post,
    path = "/api/v1/registry/clear-errors",
    tag = "Registry",
    summary = "Clear failed entries",
    description = "Removes only entries that are ready with an error, so the next fetch retries.",
    responses(
        (status = 200, description = "Number of entries removed", body = ClearedResponse),
    )
)]
pub async fn clear_errors(State(state): State<AppState>) -> impl IntoResponse {
    Json(ClearedResponse {
        cleared: state.fetch_service.registry().clear_errors(),
    })
}

/// Registry routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/registry/stats", get(get_stats))
        .route("/registry/keys", get(list_keys))
        .route("/registry/ready", get(list_ready))
        .route("/registry/entries", delete(clear_all))
        .route("/registry/entries/{key}", get(get_entry).delete(clear_entry))
        .route("/registry/clear-old", post(clear_old))
        .route("/registry/clear-errors", post(clear_errors))
}
