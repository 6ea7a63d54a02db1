// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Detection → crop → catalog lookup → zero-shot brand classification

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::catalog::BrandCatalog;
use super::classification::RegionClassifier;
use super::detection::{BoundingBox, Detection, ObjectDetector};
use super::image_utils::{crop_region, ImageError};

/// Brand reported when no refinement was possible
pub const UNKNOWN_BRAND: &str = "Unknown";

/// Final per-object output record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedDetection {
    pub category: String,
    pub bbox: BoundingBox,
    /// Detector confidence
    pub confidence: f32,
    pub predicted_brand: String,
    /// CLIP probability of `predicted_brand`, 0.0 when unknown
    pub clip_confidence: f32,
}

impl AnnotatedDetection {
    fn unknown(detection: Detection) -> Self {
        Self::with_brand(detection, UNKNOWN_BRAND.to_string(), 0.0)
    }

    fn with_brand(detection: Detection, predicted_brand: String, clip_confidence: f32) -> Self {
        Self {
            category: detection.category,
            bbox: detection.bbox,
            confidence: detection.confidence,
            predicted_brand,
            clip_confidence,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.predicted_brand == UNKNOWN_BRAND && self.clip_confidence == 0.0
    }
}

/// What to do when the classifier fails for a single detection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationFailurePolicy {
    /// Abort the whole request
    #[default]
    FailRequest,
    /// Report that detection as `Unknown`/0.0 and carry on
    DegradeToUnknown,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid input image: {0}")]
    Input(#[from] ImageError),

    #[error("Object detection failed: {0:#}")]
    Detection(anyhow::Error),

    #[error("Brand classification failed for '{category}': {source:#}")]
    Classification {
        category: String,
        source: anyhow::Error,
    },
}

/// Two-stage inference pipeline
///
/// Holds shared handles to models loaded once at start-up; `process` is
/// synchronous and request-scoped.
#[derive(Clone)]
pub struct AnnotationPipeline {
    detector: Arc<dyn ObjectDetector>,
    classifier: Arc<dyn RegionClassifier>,
    catalog: Arc<BrandCatalog>,
    failure_policy: ClassificationFailurePolicy,
}

impl std::fmt::Debug for AnnotationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnotationPipeline")
            .field("catalog_categories", &self.catalog.len())
            .field("failure_policy", &self.failure_policy)
            .finish_non_exhaustive()
    }
}

impl AnnotationPipeline {
    pub fn new(
        detector: Arc<dyn ObjectDetector>,
        classifier: Arc<dyn RegionClassifier>,
        catalog: Arc<BrandCatalog>,
    ) -> Self {
        Self {
            detector,
            classifier,
            catalog,
            failure_policy: ClassificationFailurePolicy::default(),
        }
    }

    pub fn with_failure_policy(mut self, policy: ClassificationFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn failure_policy(&self) -> ClassificationFailurePolicy {
        self.failure_policy
    }

    pub fn catalog(&self) -> &BrandCatalog {
        &self.catalog
    }

    /// Detect objects and predict a brand for each one
    ///
    /// Output order follows the detector. Degenerate boxes are dropped.
    ///
    /// # Errors
    /// - [`PipelineError::Detection`] if the detector fails
    /// - [`PipelineError::Classification`] if the classifier fails and the
    ///   policy is [`ClassificationFailurePolicy::FailRequest`]
    pub fn process(&self, image: &DynamicImage) -> Result<Vec<AnnotatedDetection>, PipelineError> {
        let start = Instant::now();

        let detections = self
            .detector
            .detect(image)
            .map_err(PipelineError::Detection)?;
        debug!("Detector returned {} objects", detections.len());

        let mut annotated = Vec::with_capacity(detections.len());
        let mut skipped = 0usize;

        for detection in detections {
            let region = match crop_region(image, &detection.bbox) {
                Ok(region) => region,
                Err(e) => {
                    warn!(
                        "Skipping '{}' detection with unusable box {:?}: {}",
                        detection.category,
                        detection.bbox.to_array(),
                        e
                    );
                    skipped += 1;
                    continue;
                }
            };

            let item = match self.catalog.lookup(&detection.category) {
                Some(candidates) => match self.classifier.classify(&region, candidates) {
                    Ok(result) => AnnotatedDetection::with_brand(
                        detection,
                        result.predicted_label,
                        result.confidence,
                    ),
                    Err(e) => match self.failure_policy {
                        ClassificationFailurePolicy::FailRequest => {
                            return Err(PipelineError::Classification {
                                category: detection.category,
                                source: e,
                            });
                        }
                        ClassificationFailurePolicy::DegradeToUnknown => {
                            warn!(
                                "Brand classification failed for '{}', reporting {}: {:#}",
                                detection.category, UNKNOWN_BRAND, e
                            );
                            AnnotatedDetection::unknown(detection)
                        }
                    },
                },
                None => AnnotatedDetection::unknown(detection),
            };

            debug!(
                "{} -> {} ({:.2})",
                item.category, item.predicted_brand, item.clip_confidence
            );
            annotated.push(item);
        }

        info!(
            "Annotated {} objects ({} skipped) in {}ms",
            annotated.len(),
            skipped,
            start.elapsed().as_millis()
        );

        Ok(annotated)
    }
}
