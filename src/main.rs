//! result-registry server entry point.
//!
//! Starts the Axum HTTP server with REST and WebSocket endpoints and the
//! background sweeper.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use result_registry::api;
use result_registry::app_state::AppState;
use result_registry::config::GatewayConfig;
use result_registry::domain::{EventBus, ResultRegistry, TtlCache};
use result_registry::service::{FetchService, HttpUpstream, Upstream, spawn_sweeper};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GatewayConfig::from_env().context("loading configuration")?;
    init_tracing(config.log_json);
    tracing::info!(
        addr = %config.listen_addr,
        upstream = %config.upstream_base_url,
        "starting result-registry"
    );

    // Build domain layer
    let event_bus = EventBus::new(config.event_bus_capacity);
    let registry = Arc::new(ResultRegistry::with_event_bus(event_bus));
    let cache = Arc::new(TtlCache::with_default_ttl(config.cache_default_ttl));

    // Build service layer
    let upstream: Arc<dyn Upstream> = Arc::new(HttpUpstream::new(config.upstream_base_url.clone()));
    let fetch_service = Arc::new(FetchService::new(
        Arc::clone(&registry),
        Arc::clone(&cache),
        upstream,
        config.upstream_timeout,
    ));

    let sweeper = config.sweep_interval.map(|interval| {
        tracing::info!(?interval, max_age = ?config.registry_max_age, "sweeper enabled");
        spawn_sweeper(registry, cache, interval, config.registry_max_age)
    });

    let app = api::build_app(AppState::new(fetch_service));

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    tracing::info!("shutdown complete");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
