//! Integration tests for the collector's health and metrics endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use harness_lib::{health::components, HealthRegistry, SidecarMetrics};
use k6_sidecar::api::{create_router, AppState};
use std::sync::Arc;
use tower::ServiceExt;

async fn setup_test_app() -> (Router, Arc<AppState>) {
    let health_registry = HealthRegistry::new();
    health_registry.register(components::COLLECTOR).await;
    health_registry.register(components::CLUSTER_API).await;

    let metrics = SidecarMetrics::new().unwrap();
    let state = Arc::new(AppState::new(health_registry, metrics));
    let router = create_router(state.clone());

    (router, state)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);

    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "healthy");
    assert!(health["components"]["collector"].is_object());
}

#[tokio::test]
async fn test_healthz_returns_ok_when_cluster_api_degraded() {
    let (app, state) = setup_test_app().await;

    state
        .health_registry
        .set_degraded(components::CLUSTER_API, "2 usage reads failed")
        .await;

    let (status, body) = get(app, "/healthz").await;

    // degraded is still operational
    assert_eq!(status, StatusCode::OK);
    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "degraded");
}

#[tokio::test]
async fn test_healthz_returns_503_when_manifests_missing() {
    let (app, state) = setup_test_app().await;

    state
        .health_registry
        .set_unhealthy(components::COLLECTOR, "discovery manifests missing")
        .await;

    let (status, body) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "unhealthy");
    assert_eq!(
        health["components"]["collector"]["message"],
        "discovery manifests missing"
    );
}

#[tokio::test]
async fn test_readyz_returns_503_before_collector_starts() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get(app, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let readiness: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(readiness["ready"], false);
    assert_eq!(readiness["reason"], "Collector not yet started");
}

#[tokio::test]
async fn test_readyz_returns_ok_when_ready() {
    let (app, state) = setup_test_app().await;
    state.health_registry.set_ready(true).await;

    let (status, body) = get(app, "/readyz").await;
    assert_eq!(status, StatusCode::OK);

    let readiness: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_readyz_names_unhealthy_components() {
    let (app, state) = setup_test_app().await;
    state.health_registry.set_ready(true).await;
    state
        .health_registry
        .set_unhealthy(components::COLLECTOR, "gave up")
        .await;

    let (status, body) = get(app, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let readiness: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(readiness["reason"], "Unhealthy: collector");
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_sidecar_metrics() {
    let (app, state) = setup_test_app().await;
    state.metrics.set_samples_collected(7);
    state.metrics.inc_collection_errors();

    let (status, body) = get(app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);

    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("k6_sidecar_samples_collected 7"));
    assert!(text.contains("k6_sidecar_collection_errors_total 1"));
    assert!(text.contains("k6_sidecar_collection_latency_seconds_bucket"));
}

#[tokio::test]
async fn test_metrics_are_per_instance() {
    let (_app, first) = setup_test_app().await;
    let (app, _second) = setup_test_app().await;
    first.metrics.inc_collection_errors();

    let (_status, body) = get(app, "/metrics").await;
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("k6_sidecar_collection_errors_total 0"));
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let (app, _state) = setup_test_app().await;
    let (status, _body) = get(app, "/debug").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
