// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Upload endpoint tests for POST /upload
//!
//! Drive the full router with `oneshot` over fake models and check:
//! - the `{"items": [...]}` and `{"error": ...}` body shapes
//! - status codes for malformed requests
//! - the transient upload is gone after success and after failure

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use brand_lens::{
    api::{create_router, AppState, UploadResponse},
    config::ServiceConfig,
    vision::{AnnotationPipeline, Annotator, ObjectDetector, RegionClassifier},
};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tower::ServiceExt;

use crate::common::{
    detection, multipart_body, multipart_content_type, pipeline_with, png_bytes,
    FailingClassifier, FailingDetector, FixedDetector, RednessClassifier,
};

fn laptop_and_dog() -> FixedDetector {
    FixedDetector::new(vec![
        detection("laptop", 0.92, [10.0, 10.0, 110.0, 210.0]),
        detection("dog", 0.64, [150.0, 40.0, 230.0, 120.0]),
    ])
}

fn router(pipeline: AnnotationPipeline, upload_dir: &Path) -> Router {
    let state = AppState::new(pipeline, upload_dir);
    create_router(state, &ServiceConfig::default()).unwrap()
}

fn router_with(
    detector: Arc<dyn ObjectDetector>,
    classifier: Arc<dyn RegionClassifier>,
    upload_dir: &Path,
) -> Router {
    router(pipeline_with(detector, classifier), upload_dir)
}

fn upload_request(field: &str, file_name: &str, bytes: &[u8]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(header::CONTENT_TYPE, multipart_content_type())
        .body(Body::from(multipart_body(field, file_name, bytes)))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn dir_is_empty(dir: &Path) -> bool {
    std::fs::read_dir(dir).unwrap().next().is_none()
}

#[tokio::test]
async fn test_upload_returns_items() {
    let uploads = tempfile::tempdir().unwrap();
    let app = router_with(
        Arc::new(laptop_and_dog()),
        Arc::new(RednessClassifier::new()),
        uploads.path(),
    );

    let response = app
        .oneshot(upload_request("image", "desk.png", &png_bytes(300, 300)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);

    assert_eq!(items[0]["category"], "laptop");
    assert_eq!(items[0]["bbox"], serde_json::json!([10.0, 10.0, 110.0, 210.0]));
    assert_eq!(items[0]["predicted_brand"], "Dell");
    let clip = items[0]["clip_confidence"].as_f64().unwrap();
    assert!(clip > 0.0 && clip <= 1.0);

    assert_eq!(items[1]["category"], "dog");
    assert_eq!(items[1]["predicted_brand"], "Unknown");
    assert_eq!(items[1]["clip_confidence"], 0.0);

    assert!(body.get("annotated_image").is_none());
}

#[tokio::test]
async fn test_upload_response_deserializes() {
    let uploads = tempfile::tempdir().unwrap();
    let app = router_with(
        Arc::new(FixedDetector::new(vec![])),
        Arc::new(RednessClassifier::new()),
        uploads.path(),
    );

    let response = app
        .oneshot(upload_request("image", "empty-room.png", &png_bytes(64, 64)))
        .await
        .unwrap();

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let parsed: UploadResponse = serde_json::from_slice(&bytes).unwrap();
    assert!(parsed.items.is_empty());
}

#[tokio::test]
async fn test_upload_file_removed_after_success() {
    let uploads = tempfile::tempdir().unwrap();
    let app = router_with(
        Arc::new(laptop_and_dog()),
        Arc::new(RednessClassifier::new()),
        uploads.path(),
    );

    let response = app
        .oneshot(upload_request("image", "desk.png", &png_bytes(300, 300)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(dir_is_empty(uploads.path()));
}

#[tokio::test]
async fn test_detector_failure_returns_error_body() {
    let uploads = tempfile::tempdir().unwrap();
    let app = router_with(
        Arc::new(FailingDetector),
        Arc::new(RednessClassifier::new()),
        uploads.path(),
    );

    let response = app
        .oneshot(upload_request("image", "desk.png", &png_bytes(64, 64)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().contains("detector session failed"));
    assert!(dir_is_empty(uploads.path()));
}

#[tokio::test]
async fn test_classifier_failure_returns_error_body() {
    let uploads = tempfile::tempdir().unwrap();
    let app = router_with(
        Arc::new(laptop_and_dog()),
        Arc::new(FailingClassifier),
        uploads.path(),
    );

    let response = app
        .oneshot(upload_request("image", "desk.png", &png_bytes(300, 300)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().contains("laptop"));
    assert!(dir_is_empty(uploads.path()));
}

#[tokio::test]
async fn test_undecodable_upload_returns_500_and_is_removed() {
    let uploads = tempfile::tempdir().unwrap();
    let app = router_with(
        Arc::new(laptop_and_dog()),
        Arc::new(RednessClassifier::new()),
        uploads.path(),
    );

    let response = app
        .oneshot(upload_request("image", "notes.txt", b"definitely not an image"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert!(body["error"].is_string());
    assert!(dir_is_empty(uploads.path()));
}

#[tokio::test]
async fn test_missing_image_field_is_bad_request() {
    let uploads = tempfile::tempdir().unwrap();
    let app = router_with(
        Arc::new(laptop_and_dog()),
        Arc::new(RednessClassifier::new()),
        uploads.path(),
    );

    let response = app
        .oneshot(upload_request("file", "desk.png", &png_bytes(32, 32)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().contains("image"));
}

#[tokio::test]
async fn test_empty_image_is_bad_request() {
    let uploads = tempfile::tempdir().unwrap();
    let app = router_with(
        Arc::new(laptop_and_dog()),
        Arc::new(RednessClassifier::new()),
        uploads.path(),
    );

    let response = app
        .oneshot(upload_request("image", "empty.png", b""))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_non_multipart_is_bad_request() {
    let uploads = tempfile::tempdir().unwrap();
    let app = router_with(
        Arc::new(laptop_and_dog()),
        Arc::new(RednessClassifier::new()),
        uploads.path(),
    );

    let request = Request::builder()
        .method("POST")
        .uri("/upload")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["error"].is_string());
}

/// Valid PNG padded past the default 10 MiB limit
fn oversized_png() -> Vec<u8> {
    let mut bytes = png_bytes(64, 64);
    bytes.resize(11 * 1024 * 1024, 0);
    bytes
}

#[tokio::test]
async fn test_raised_upload_limit_accepts_large_image() {
    let uploads = tempfile::tempdir().unwrap();
    let state = AppState::new(
        pipeline_with(Arc::new(laptop_and_dog()), Arc::new(RednessClassifier::new())),
        uploads.path(),
    );
    let config = ServiceConfig {
        max_upload_bytes: 64 * 1024 * 1024,
        ..ServiceConfig::default()
    };
    let app = create_router(state, &config).unwrap();

    let response = app
        .oneshot(upload_request("image", "large.png", &oversized_png()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["items"].as_array().unwrap().len(), 2);
    assert!(dir_is_empty(uploads.path()));
}

#[tokio::test]
async fn test_default_upload_limit_rejects_large_image() {
    let uploads = tempfile::tempdir().unwrap();
    let app = router_with(
        Arc::new(laptop_and_dog()),
        Arc::new(RednessClassifier::new()),
        uploads.path(),
    );

    let response = app
        .oneshot(upload_request("image", "large.png", &oversized_png()))
        .await
        .unwrap();

    assert!(response.status().is_client_error());
    assert!(dir_is_empty(uploads.path()));
}

#[tokio::test]
async fn test_annotated_image_written_when_enabled() {
    let uploads = tempfile::tempdir().unwrap();
    let annotated = tempfile::tempdir().unwrap();
    let state = AppState::new(
        pipeline_with(Arc::new(laptop_and_dog()), Arc::new(RednessClassifier::new())),
        uploads.path(),
    )
    .with_annotation(Annotator::default(), annotated.path());
    let app = create_router(state, &ServiceConfig::default()).unwrap();

    let response = app
        .oneshot(upload_request("image", "desk.png", &png_bytes(300, 300)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let name = body["annotated_image"].as_str().unwrap();
    assert!(name.ends_with(".png"));
    assert!(annotated.path().join(name).exists());
    assert!(dir_is_empty(uploads.path()));
}

#[tokio::test]
async fn test_cors_allows_frontend_origin() {
    let uploads = tempfile::tempdir().unwrap();
    let app = router_with(
        Arc::new(FixedDetector::new(vec![])),
        Arc::new(RednessClassifier::new()),
        uploads.path(),
    );

    let request = Request::builder()
        .method("OPTIONS")
        .uri("/upload")
        .header(header::ORIGIN, "http://localhost:3000")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "http://localhost:3000"
    );
}
