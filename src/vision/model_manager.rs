// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Vision model manager for loading the detector and the CLIP classifier

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::config::{ClassifierConfig, DetectorConfig};
use crate::vision::catalog::BrandCatalog;
use crate::vision::classification::ClipClassifier;
use crate::vision::detection::{coco_labels, load_labels, YoloDetector};
use crate::vision::pipeline::{AnnotationPipeline, ClassificationFailurePolicy};

/// Owns the two ONNX models for the lifetime of the process
///
/// Both are required; start-up fails if either cannot be loaded. Both run on
/// CPU.
pub struct VisionModelManager {
    detector: Arc<YoloDetector>,
    classifier: Arc<ClipClassifier>,
}

impl VisionModelManager {
    pub async fn new(detector: &DetectorConfig, classifier: &ClassifierConfig) -> Result<Self> {
        let labels = match detector.labels_path {
            Some(ref path) => load_labels(path)?,
            None => coco_labels(),
        };

        let detector_model = YoloDetector::new(&detector.model_path, labels, detector.params())
            .await
            .context("Failed to load object detector")?;
        tracing::info!(
            "✅ Object detector loaded from {}",
            detector.model_path.display()
        );

        let classifier_model = ClipClassifier::new(
            &classifier.model_path,
            &classifier.tokenizer_path,
            classifier.prompt_template.clone(),
        )
        .await
        .context("Failed to load CLIP classifier")?;
        tracing::info!(
            "✅ CLIP classifier loaded from {}",
            classifier.model_path.display()
        );

        Ok(Self {
            detector: Arc::new(detector_model),
            classifier: Arc::new(classifier_model),
        })
    }

    pub fn detector(&self) -> Arc<YoloDetector> {
        self.detector.clone()
    }

    pub fn classifier(&self) -> Arc<ClipClassifier> {
        self.classifier.clone()
    }

    /// Wire the loaded models into a pipeline sharing the same handles
    pub fn pipeline(
        &self,
        catalog: Arc<BrandCatalog>,
        policy: ClassificationFailurePolicy,
    ) -> AnnotationPipeline {
        AnnotationPipeline::new(self.detector.clone(), self.classifier.clone(), catalog)
            .with_failure_policy(policy)
    }
}
