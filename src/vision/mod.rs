// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Vision processing module for CPU-based product recognition
//!
//! This module provides:
//! - Object detection via a YOLOv5 ONNX export
//! - Zero-shot brand classification of detected regions via CLIP
//! - The pipeline joining the two through a category → brands catalog
//!
//! Both models run on CPU through ONNX Runtime.

pub mod annotate;
pub mod catalog;
pub mod classification;
pub mod detection;
pub mod image_utils;
pub mod model_manager;
pub mod pipeline;
pub mod preprocessing;

pub use annotate::Annotator;
pub use catalog::{BrandCatalog, CatalogError};
pub use classification::{ClassificationResult, ClipClassifier, RegionClassifier};
pub use detection::{BoundingBox, Detection, DetectorParams, ObjectDetector, YoloDetector};
pub use image_utils::{decode_image_bytes, detect_format, load_image_file, ImageError, ImageInfo};
pub use model_manager::VisionModelManager;
pub use pipeline::{
    AnnotatedDetection, AnnotationPipeline, ClassificationFailurePolicy, PipelineError,
    UNKNOWN_BRAND,
};
