//! REST API layer: route handlers, DTOs, OpenAPI document, and router
//! composition.
//!
//! All resource endpoints are mounted under `/api/v1`; the OpenAPI
//! document is served at `/api-docs/openapi.json`.

pub mod dto;
pub mod handlers;

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::app_state::AppState;

/// OpenAPI description of every REST endpoint.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "result-registry",
        description = "Single-flight result registry and TTL cache in front of an upstream JSON API."
    ),
    paths(
        handlers::system::health_handler,
        handlers::fetch::fetch_shared,
        handlers::fetch::fetch_cached,
        handlers::registry::get_stats,
        handlers::registry::list_keys,
        handlers::registry::list_ready,
        handlers::registry::get_entry,
        handlers::registry::clear_entry,
        handlers::registry::clear_all,
        handlers::registry::clear_old,
        handlers::registry::clear_errors,
        handlers::cache::cache_contents,
        handlers::cache::clear_cache,
        handlers::cache::delete_cached,
    ),
    components(schemas(
        crate::error::ErrorResponse,
        crate::error::ErrorBody,
        crate::domain::EntryStatus,
        dto::StatsResponse,
        dto::KeysResponse,
        dto::ReadyResponse,
        dto::EntryDetailResponse,
        dto::ClearedResponse,
        dto::FetchResponse,
        dto::CacheContentsResponse,
        handlers::system::HealthResponse,
    )),
    tags(
        (name = "System", description = "Service health"),
        (name = "Fetch", description = "Deduplicated and cached upstream reads"),
        (name = "Registry", description = "Result registry inspection and eviction"),
        (name = "Cache", description = "TTL cache inspection and maintenance"),
    )
)]
pub struct ApiDoc;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes())
        .merge(docs_router())
}

/// Builds the full application: REST routes, the `/ws` endpoint, tracing
/// and CORS layers, bound to `state`.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(build_router())
        .route("/ws", get(crate::ws::handler::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(feature = "swagger-ui")]
fn docs_router() -> Router<AppState> {
    utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .into()
}

#[cfg(not(feature = "swagger-ui"))]
fn docs_router() -> Router<AppState> {
    use axum::Json;

    Router::new().route(
        "/api-docs/openapi.json",
        get(|| async { Json(ApiDoc::openapi()) }),
    )
}
