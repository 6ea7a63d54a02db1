// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod api;
pub mod cli;
pub mod config;
pub mod service;
pub mod version;
pub mod vision;

// Re-export main types
pub use config::{ClassifierConfig, ConfigError, DetectorConfig, ServiceConfig};
pub use vision::{
    AnnotatedDetection, AnnotationPipeline, BrandCatalog, ClassificationFailurePolicy,
    ClassificationResult, Detection, ObjectDetector, PipelineError, RegionClassifier,
};
