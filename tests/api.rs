//! Router-level tests driving the HTTP surface against an in-process
//! upstream.

#![allow(clippy::panic, clippy::indexing_slicing)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use result_registry::api::build_app;
use result_registry::app_state::AppState;
use result_registry::domain::{ResultRegistry, TtlCache};
use result_registry::service::{FetchService, HttpUpstream, Upstream, UpstreamFailure};

/// Upstream that counts calls and fails on paths starting with `fail/`.
#[derive(Debug, Default)]
struct FakeUpstream {
    calls: AtomicUsize,
}

#[async_trait]
impl Upstream for FakeUpstream {
    fn base(&self) -> &str {
        "fake://upstream/"
    }

    async fn get_json(
        &self,
        path: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<Value, UpstreamFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        if path.starts_with("fail/") {
            return Err(UpstreamFailure::Status {
                status: 503,
                body: "upstream down".to_string(),
            });
        }
        if path.starts_with("slow/") {
            tokio::time::sleep(Duration::from_secs(10)).await;
        }
        Ok(serde_json::json!({ "path": path, "params": params }))
    }
}

fn app(upstream: &Arc<FakeUpstream>) -> Router {
    let dyn_upstream: Arc<dyn Upstream> = Arc::clone(upstream) as Arc<dyn Upstream>;
    app_with(dyn_upstream)
}

fn app_with(dyn_upstream: Arc<dyn Upstream>) -> Router {
    let service = FetchService::new(
        Arc::new(ResultRegistry::new()),
        Arc::new(TtlCache::new()),
        dyn_upstream,
        Duration::from_secs(1),
    );
    build_app(AppState::new(Arc::new(service)))
}

async fn send(app: &Router, method: Method, uri: &str) -> (StatusCode, Value) {
    let Ok(request) = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
    else {
        panic!("valid request");
    };
    let Ok(response) = app.clone().oneshot(request).await else {
        panic!("router is infallible");
    };
    let status = response.status();
    let Ok(bytes) = axum::body::to_bytes(response.into_body(), usize::MAX).await else {
        panic!("readable body");
    };
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test(start_paused = true)]
async fn concurrent_fetches_share_one_upstream_call() {
    let upstream = Arc::new(FakeUpstream::default());
    let app = app(&upstream);

    let (a, b, c) = tokio::join!(
        send(&app, Method::GET, "/api/v1/fetch/users/1?page=2"),
        send(&app, Method::GET, "/api/v1/fetch/users/1?page=2"),
        send(&app, Method::GET, "/api/v1/fetch/users/1?page=2"),
    );
    for (status, body) in [&a, &b, &c] {
        assert_eq!(*status, StatusCode::OK);
        assert_eq!(body["data"]["path"], "users/1");
        assert_eq!(body["data"]["params"]["page"], "2");
    }
    assert_eq!(a.1["key"], b.1["key"]);
    assert_eq!(upstream.calls.load(Ordering::SeqCst), 1);

    let (_, stats) = send(&app, Method::GET, "/api/v1/registry/stats").await;
    assert_eq!(stats["total"], 1);
    assert_eq!(stats["ready"], 1);

    // Ready entries replay without calling the upstream again.
    let (status, _) = send(&app, Method::GET, "/api/v1/fetch/users/1?page=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(upstream.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn failures_are_replayed_until_cleared() {
    let upstream = Arc::new(FakeUpstream::default());
    let app = app(&upstream);

    let (status, body) = send(&app, Method::GET, "/api/v1/fetch/fail/report").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], 5001);
    assert_eq!(body["error"]["details"], "upstream status 503");

    let (status, _) = send(&app, Method::GET, "/api/v1/fetch/fail/report").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(upstream.calls.load(Ordering::SeqCst), 1);

    let (_, stats) = send(&app, Method::GET, "/api/v1/registry/stats").await;
    assert_eq!(stats["errors"], 1);

    let (status, cleared) = send(&app, Method::POST, "/api/v1/registry/clear-errors").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cleared["cleared"], 1);

    let _ = send(&app, Method::GET, "/api/v1/fetch/fail/report").await;
    assert_eq!(upstream.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn slow_upstream_times_out() {
    let upstream = Arc::new(FakeUpstream::default());
    let app = app(&upstream);

    let (status, body) = send(&app, Method::GET, "/api/v1/fetch/slow/thing").await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["error"]["code"], 5002);

    let (_, keys) = send(&app, Method::GET, "/api/v1/registry/keys").await;
    let Some(key) = keys["keys"][0].as_str() else {
        panic!("timed-out entry stays registered");
    };
    let encoded: String = url::form_urlencoded::byte_serialize(key.as_bytes()).collect();
    let uri = format!("/api/v1/registry/entries/{encoded}");
    let (_, detail) = send(&app, Method::GET, &uri).await;
    assert_eq!(detail["timed_out"], true);
}

#[tokio::test(start_paused = true)]
async fn entry_detail_and_clear() {
    let upstream = Arc::new(FakeUpstream::default());
    let app = app(&upstream);

    let (_, fetched) = send(&app, Method::GET, "/api/v1/fetch/items").await;
    let Some(key) = fetched["key"].as_str().map(ToString::to_string) else {
        panic!("fetch response carries its key");
    };

    let (_, keys) = send(&app, Method::GET, "/api/v1/registry/keys").await;
    assert_eq!(keys["keys"][0], key.as_str());

    let (_, ready) = send(&app, Method::GET, "/api/v1/registry/ready").await;
    assert_eq!(ready["entries"][key.as_str()]["path"], "items");

    // Keys embed the upstream base URL, so they travel percent-encoded.
    let encoded: String = url::form_urlencoded::byte_serialize(key.as_bytes()).collect();
    let uri = format!("/api/v1/registry/entries/{encoded}");
    let (status, detail) = send(&app, Method::GET, &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["status"], "ready");

    let (status, _) = send(&app, Method::DELETE, &uri).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, Method::GET, &uri).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], 2001);

    let (status, _) = send(&app, Method::DELETE, &uri).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test(start_paused = true)]
async fn cached_endpoint_reports_hits() {
    let upstream = Arc::new(FakeUpstream::default());
    let app = app(&upstream);

    let request = |uri: &str| {
        let Ok(request) = Request::builder().uri(uri).body(Body::empty()) else {
            panic!("valid request");
        };
        request
    };

    let Ok(first) = app.clone().oneshot(request("/api/v1/cached/items?ttl_ms=1000")).await else {
        panic!("router is infallible");
    };
    assert_eq!(first.headers()["x-cache"], "miss");

    let Ok(second) = app.clone().oneshot(request("/api/v1/cached/items?ttl_ms=1000")).await else {
        panic!("router is infallible");
    };
    assert_eq!(second.headers()["x-cache"], "hit");
    assert_eq!(upstream.calls.load(Ordering::SeqCst), 1);

    let (status, body) = send(&app, Method::GET, "/api/v1/cached/items?ttl_ms=soon").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], 1001);

    let (status, contents) = send(&app, Method::GET, "/api/v1/cache").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(contents["size"], 1);
    assert_eq!(contents["keys"].as_array().map(Vec::len), Some(1));

    let (status, _) = send(&app, Method::DELETE, "/api/v1/cache").await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, contents) = send(&app, Method::GET, "/api/v1/cache").await;
    assert_eq!(contents["size"], 0);
}

#[tokio::test]
async fn health_and_openapi_are_served() {
    let upstream = Arc::new(FakeUpstream::default());
    let app = app(&upstream);

    let (status, body) = send(&app, Method::GET, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, doc) = send(&app, Method::GET, "/api-docs/openapi.json").await;
    assert_eq!(status, StatusCode::OK);
    assert!(doc["paths"]["/api/v1/fetch/{path}"].is_object());
}

#[tokio::test]
async fn paths_escaping_the_upstream_are_rejected() {
    let Ok(base) = url::Url::parse("http://127.0.0.1:9/v1/") else {
        panic!("valid base url");
    };
    let app = app_with(Arc::new(HttpUpstream::new(base)));

    for uri in [
        "/api/v1/fetch/http:%2F%2Fevil.test%2Fsteal",
        "/api/v1/fetch/..%2F..%2Fadmin",
        "/api/v1/cached/http:%2F%2Fevil.test%2Fsteal",
    ] {
        let (status, body) = send(&app, Method::GET, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["error"]["code"], 1001);
    }

    let (_, stats) = send(&app, Method::GET, "/api/v1/registry/stats").await;
    assert_eq!(stats["total"], 0);
}
