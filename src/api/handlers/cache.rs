//! TTL cache inspection and maintenance handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get};
use axum::{Json, Router};

use crate::api::dto::CacheContentsResponse;
use crate::app_state::AppState;
use crate::error::{ErrorResponse, GatewayError};

/// `GET /cache` — Live cache keys.
#[utoipa::path(
    get,
    path = "/api/v1/cache",
    tag = "Cache",
    summary = "Cache contents",
    description = "Returns the number and sorted keys of unexpired cached values.",
    responses(
        (status = 200, description = "Cache contents", body = CacheContentsResponse),
    )
)]
pub async fn cache_contents(State(state): State<AppState>) -> impl IntoResponse {
    let keys = state.fetch_service.cache().keys();
    Json(CacheContentsResponse {
        size: keys.len(),
        keys,
    })
}

/// `DELETE /cache` — Drop every cached value.
#[utoipa::path(
    delete,
    path = "/api/v1/cache",
    tag = "Cache",
    summary = "Clear cache",
    description = "Removes every value from the TTL cache.",
    responses(
        (status = 204, description = "Cache cleared"),
    )
)]
pub async fn clear_cache(State(state): State<AppState>) -> impl IntoResponse {
    state.fetch_service.cache().clear();
    StatusCode::NO_CONTENT
}

/// `DELETE /cache/{key}` — Drop one cached value.
///
/// # Errors
///
/// Returns [`GatewayError::CacheKeyNotFound`] if nothing is stored under
/// the key.
#[utoipa::path(
    delete,
    path = "/api/v1/cache/{key}",
    tag = "Cache",
    summary = "Delete cached value",
    description = "Removes one value from the TTL cache.",
    params(
        ("key" = String, Path, description = "Cache key"),
    ),
    responses(
        (status = 204, description = "Value removed"),
        (status = 404, description = "Nothing cached under key", body = ErrorResponse),
    )
)]
pub async fn delete_cached(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, GatewayError> {
    if state.fetch_service.cache().delete(&key) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(GatewayError::CacheKeyNotFound(key))
    }
}

/// Cache routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/cache", get(cache_contents).delete(clear_cache))
        .route("/cache/{key}", delete(delete_cached))
}
