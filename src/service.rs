// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Start-up wiring shared by the server and the CLI

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::api::AppState;
use crate::config::ServiceConfig;
use crate::vision::{AnnotationPipeline, Annotator, BrandCatalog, VisionModelManager};

/// Configured catalog file, or the built-in table
pub fn load_catalog(config: &ServiceConfig) -> Result<BrandCatalog> {
    let catalog = match config.catalog_path {
        Some(ref path) => BrandCatalog::from_file(path)
            .with_context(|| format!("Failed to load brand catalog {}", path.display()))?,
        None => BrandCatalog::default(),
    };
    info!("Brand catalog ready: {} categories", catalog.len());
    Ok(catalog)
}

/// Annotator for the configured font; unlabelled boxes without one
pub fn load_annotator(config: &ServiceConfig) -> Result<Annotator> {
    match config.font_path {
        Some(ref path) => Annotator::with_font_file(path),
        None => Ok(Annotator::default()),
    }
}

/// Load both models once and build the pipeline around them
pub async fn load_pipeline(config: &ServiceConfig) -> Result<AnnotationPipeline> {
    let catalog = Arc::new(load_catalog(config)?);
    let manager = VisionModelManager::new(&config.detector, &config.classifier).await?;
    Ok(manager.pipeline(catalog, config.failure_policy))
}

/// Everything the HTTP layer needs
pub async fn build_app_state(config: &ServiceConfig) -> Result<AppState> {
    let pipeline = load_pipeline(config).await?;
    let mut state = AppState::new(pipeline, config.upload_dir.clone());

    if let Some(ref dir) = config.annotation_dir {
        state = state.with_annotation(load_annotator(config)?, dir.clone());
        info!("Annotated images will be written to {}", dir.display());
    }

    Ok(state)
}
