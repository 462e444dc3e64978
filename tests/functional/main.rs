// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Functional tests for the webhook HTTP surface.
//!
//! These tests drive the axum routers in-process with `tower::ServiceExt`,
//! without TLS or a bound listener.
//!
//! ```bash
//! cargo test --test functional
//! ```

#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use tower::ServiceExt;

use serde_json::json;

use common::fixtures::{
    PodBuilder, patched_annotations, response_json, review_body, trino_worker,
};
use mutation_hook_service::health::{self, AdmissionOutcome};
use mutation_hook_service::webhooks::{MAX_BODY_BYTES, NoopObserver};
use mutation_hook_service::{HealthState, WebhookState, create_webhook_router};

fn setup() -> (Arc<WebhookState>, Router) {
    let state = Arc::new(WebhookState::with_observer(
        Arc::new(HealthState::new()),
        Box::new(NoopObserver),
        Duration::from_secs(5),
    ));
    let router = create_webhook_router(state.clone());
    (state, router)
}

fn post_mutate(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/mutate")
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.into())
        .unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), 4 * 1024 * 1024)
        .await
        .unwrap()
        .to_vec()
}

#[tokio::test]
async fn test_mutate_returns_patched_review() {
    let (state, router) = setup();
    let body = review_body("uid-42", &trino_worker("trino-worker-42"));

    let response = router.oneshot(post_mutate(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/json"
    );

    let bytes = body_bytes(response).await;
    assert_eq!(response_json(&bytes)["response"]["uid"], "uid-42");
    assert!(
        patched_annotations(&bytes)
            .contains_key("ad.datadoghq.com/trino-worker-42.instances")
    );
    assert_eq!(
        state.health.metrics.admission_count(AdmissionOutcome::Patched),
        1
    );
}

#[tokio::test]
async fn test_mutate_without_request_is_empty_ok() {
    let (state, router) = setup();

    let response = router.oneshot(post_mutate("{}")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_bytes(response).await.is_empty());
    assert_eq!(
        state.health.metrics.admission_count(AdmissionOutcome::NoRequest),
        1
    );
}

#[tokio::test]
async fn test_mutate_malformed_envelope_is_500() {
    let (_state, router) = setup();

    let response = router.oneshot(post_mutate("{not json")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let text = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(text.starts_with("unmarshaling admission review failed"));
}

#[tokio::test]
async fn test_mutate_bad_pod_is_500() {
    let (_state, router) = setup();

    let response = router
        .oneshot(post_mutate(r#"{"request": {"object": {"raw": "not-json"}}}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let text = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(text.starts_with("unable to unmarshal pod object"));
}

#[tokio::test]
async fn test_mutate_accepts_large_update_review() {
    let (state, router) = setup();
    let pod = PodBuilder::named("trino-worker-5")
        .prefix("ad.datadoghq.com")
        .annotation("example.com/blob", "x".repeat(2 * 1024 * 1024))
        .build();
    let body = json!({
        "apiVersion": "admission.k8s.io/v1",
        "kind": "AdmissionReview",
        "request": {
            "uid": "update-1",
            "operation": "UPDATE",
            "object": pod,
            "oldObject": pod,
        }
    })
    .to_string();
    assert!(body.len() > 4 * 1024 * 1024);

    let response = router.oneshot(post_mutate(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = body_bytes(response).await;
    assert_eq!(response_json(&bytes)["response"]["uid"], "update-1");
    assert!(
        patched_annotations(&bytes)
            .contains_key("ad.datadoghq.com/trino-worker-5.check_names")
    );
    assert_eq!(
        state.health.metrics.admission_count(AdmissionOutcome::Patched),
        1
    );
}

#[tokio::test]
async fn test_mutate_rejects_body_over_cap() {
    let (state, router) = setup();
    let body = vec![b' '; MAX_BODY_BYTES + 1];

    let response = router.oneshot(post_mutate(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        state.health.metrics.admission_count(AdmissionOutcome::Error),
        1
    );
}

#[tokio::test]
async fn test_root_echoes_decoded_escaped_path() {
    let (_state, router) = setup();
    let request = Request::builder()
        .method("GET")
        .uri("/foo%3Cbar%3E")
        .body(Body::empty())
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let text = String::from_utf8(body_bytes(response).await).unwrap();
    assert_eq!(text, "hello \"/foo&lt;bar&gt;\"");
}

#[tokio::test]
async fn test_root_echo_plain_path() {
    let (_state, router) = setup();
    let request = Request::builder()
        .method("GET")
        .uri("/healthcheck")
        .body(Body::empty())
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    let text = String::from_utf8(body_bytes(response).await).unwrap();
    assert_eq!(text, "hello \"/healthcheck\"");
}

#[tokio::test]
async fn test_health_probes() {
    let state = Arc::new(HealthState::new());
    let router = health::create_router(state.clone());

    let readyz = || {
        Request::builder()
            .uri("/readyz")
            .body(Body::empty())
            .unwrap()
    };

    let response = router.clone().oneshot(readyz()).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    state.set_ready(true).await;
    let response = router.clone().oneshot(readyz()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let healthz = Request::builder()
        .uri("/healthz")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(healthz).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_metrics_reflect_webhook_traffic() {
    let (state, router) = setup();
    router.clone().oneshot(post_mutate("{}")).await.unwrap();
    router.oneshot(post_mutate("nope")).await.unwrap();

    let metrics = health::create_router(state.health.clone());
    let response = metrics
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let text = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(text.contains("mutation_hook_admission_requests_total{outcome=\"no_request\"} 1"));
    assert!(text.contains("mutation_hook_admission_requests_total{outcome=\"error\"} 1"));
}
