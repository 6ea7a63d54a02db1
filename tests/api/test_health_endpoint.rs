// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Health endpoint and route registration tests

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use brand_lens::{
    api::{create_router, AppState},
    config::ServiceConfig,
    vision::ClassificationFailurePolicy,
};
use std::sync::Arc;
use tower::ServiceExt;

use crate::common::{pipeline_with, FixedDetector, RednessClassifier};

fn state() -> AppState {
    let pipeline = pipeline_with(
        Arc::new(FixedDetector::new(vec![])),
        Arc::new(RednessClassifier::new()),
    )
    .with_failure_policy(ClassificationFailurePolicy::DegradeToUnknown);
    AppState::new(pipeline, std::env::temp_dir())
}

#[tokio::test]
async fn test_health_reports_service_details() {
    let app = create_router(state(), &ServiceConfig::default()).unwrap();

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], brand_lens::version::VERSION_NUMBER);
    assert_eq!(body["build"]["version"], brand_lens::version::VERSION_NUMBER);
    assert_eq!(body["build"]["date"], brand_lens::version::BUILD_DATE);
    let features = body["build"]["features"].as_array().unwrap();
    assert_eq!(features.len(), brand_lens::version::FEATURES.len());
    assert!(features.iter().any(|f| f == "multipart-upload"));
    assert_eq!(body["catalog_categories"], 21);
    assert_eq!(body["failure_policy"], "degrade_to_unknown");
    assert_eq!(body["annotation"], false);
}

#[tokio::test]
async fn test_upload_route_rejects_get() {
    let app = create_router(state(), &ServiceConfig::default()).unwrap();

    let response = app
        .oneshot(Request::get("/upload").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let app = create_router(state(), &ServiceConfig::default()).unwrap();

    let response = app
        .oneshot(Request::get("/predict").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[test]
fn test_invalid_cors_origin_fails_router_construction() {
    let config = ServiceConfig {
        cors_origins: vec!["http://bad\norigin".to_string()],
        ..ServiceConfig::default()
    };
    assert!(create_router(state(), &config).is_err());
}
