// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{Context, Result};
use axum::{
    extract::{DefaultBodyLimit, State},
    http::HeaderValue,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::upload::upload_handler;
use crate::config::ServiceConfig;
use crate::vision::image_utils::MAX_IMAGE_SIZE;
use crate::vision::{AnnotationPipeline, Annotator};

/// Where annotated copies of uploads are written
#[derive(Clone)]
pub struct AnnotationOutput {
    pub annotator: Arc<Annotator>,
    pub dir: PathBuf,
}

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<AnnotationPipeline>,
    pub upload_dir: Arc<PathBuf>,
    pub annotation: Option<AnnotationOutput>,
    /// Largest image accepted for decoding; `create_router` sets it from config
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(pipeline: AnnotationPipeline, upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            upload_dir: Arc::new(upload_dir.into()),
            annotation: None,
            max_upload_bytes: MAX_IMAGE_SIZE,
        }
    }

    pub fn with_annotation(mut self, annotator: Annotator, dir: impl Into<PathBuf>) -> Self {
        self.annotation = Some(AnnotationOutput {
            annotator: Arc::new(annotator),
            dir: dir.into(),
        });
        self
    }
}

fn cors_layer(origins: &[String]) -> Result<CorsLayer> {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let values = origins
            .iter()
            .map(|o| {
                HeaderValue::from_str(o).with_context(|| format!("Invalid CORS origin: {}", o))
            })
            .collect::<Result<Vec<_>>>()?;
        AllowOrigin::list(values)
    };

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any))
}

pub fn create_router(state: AppState, config: &ServiceConfig) -> Result<Router> {
    // Decoding must accept whatever the body limit lets through
    let state = AppState {
        max_upload_bytes: config.max_upload_bytes,
        ..state
    };

    let app = Router::new()
        // Health check
        .route("/health", get(health_handler))
        // Product/brand recognition
        .route("/upload", post(upload_handler))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(cors_layer(&config.cors_origins)?)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    Ok(app)
}

pub async fn start_server(config: &ServiceConfig, state: AppState) -> Result<()> {
    std::fs::create_dir_all(state.upload_dir.as_ref()).with_context(|| {
        format!(
            "Failed to create upload directory: {}",
            state.upload_dir.display()
        )
    })?;

    let app = create_router(state, config)?;

    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen))?;

    tracing::info!("API server listening on {}", config.listen);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": crate::version::VERSION_NUMBER,
        "build": crate::version::get_version_info(),
        "catalog_categories": state.pipeline.catalog().len(),
        "failure_policy": state.pipeline.failure_policy(),
        "annotation": state.annotation.is_some(),
    }))
}
