//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::domain::EventBus;
use crate::service::FetchService;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Fetch service owning the registry, cache and upstream.
    pub fetch_service: Arc<FetchService>,
    /// Event bus for WebSocket subscriptions.
    pub event_bus: EventBus,
}

impl AppState {
    /// Builds the state, sharing the registry's event bus with the
    /// WebSocket layer.
    #[must_use]
    pub fn new(fetch_service: Arc<FetchService>) -> Self {
        let event_bus = fetch_service.registry().event_bus().clone();
        Self {
            fetch_service,
            event_bus,
        }
    }
}
