// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! AnnotationPipeline tests
//!
//! Run the pipeline end to end over in-process detector and classifier
//! fakes, covering the per-detection contract:
//! - known categories are refined to a brand from their candidate set
//! - unknown categories report "Unknown" without touching the classifier
//! - degenerate boxes are dropped silently
//! - classifier failures follow the configured policy

use crate::common::{
    detection, pipeline_with, test_image, FailingClassifier, FailingDetector, FixedDetector,
    RednessClassifier,
};
use brand_lens::vision::{
    AnnotationPipeline, BrandCatalog, ClassificationFailurePolicy, PipelineError, UNKNOWN_BRAND,
};
use std::sync::Arc;

const LAPTOP_BRANDS: [&str; 5] = ["Dell", "HP", "Apple", "Lenovo", "Asus"];

#[test]
fn test_zero_detections_yield_empty_output() {
    let classifier = Arc::new(RednessClassifier::new());
    let pipeline = pipeline_with(Arc::new(FixedDetector::new(vec![])), classifier.clone());

    let items = pipeline.process(&test_image(320, 240)).unwrap();

    assert!(items.is_empty());
    assert_eq!(classifier.call_count(), 0);
}

#[test]
fn test_single_laptop_detection() {
    let detector = FixedDetector::new(vec![detection("laptop", 0.92, [10.0, 10.0, 110.0, 210.0])]);
    let pipeline = pipeline_with(Arc::new(detector), Arc::new(RednessClassifier::new()));

    let items = pipeline.process(&test_image(300, 300)).unwrap();

    assert_eq!(items.len(), 1);
    let item = &items[0];
    assert_eq!(item.category, "laptop");
    assert_eq!(item.confidence, 0.92);
    assert_eq!(item.bbox.to_array(), [10.0, 10.0, 110.0, 210.0]);
    assert!(LAPTOP_BRANDS.contains(&item.predicted_brand.as_str()));
    assert!(item.clip_confidence > 0.0 && item.clip_confidence <= 1.0);
}

#[test]
fn test_category_outside_catalog_is_unknown() {
    let classifier = Arc::new(RednessClassifier::new());
    let detector = FixedDetector::new(vec![detection("dog", 0.81, [0.0, 0.0, 64.0, 64.0])]);
    let pipeline = pipeline_with(Arc::new(detector), classifier.clone());

    let items = pipeline.process(&test_image(128, 128)).unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].predicted_brand, UNKNOWN_BRAND);
    assert_eq!(items[0].clip_confidence, 0.0);
    assert_eq!(classifier.call_count(), 0);
}

#[test]
fn test_zero_width_box_is_omitted() {
    let detector = FixedDetector::new(vec![detection("laptop", 0.9, [50.0, 50.0, 50.0, 80.0])]);
    let pipeline = pipeline_with(Arc::new(detector), Arc::new(RednessClassifier::new()));

    let items = pipeline.process(&test_image(200, 200)).unwrap();

    assert!(items.is_empty());
}

#[test]
fn test_output_follows_detector_order() {
    let detector = FixedDetector::new(vec![
        detection("tv", 0.5, [0.0, 0.0, 40.0, 40.0]),
        detection("dog", 0.9, [10.0, 10.0, 50.0, 50.0]),
        detection("laptop", 0.7, [20.0, 20.0, 90.0, 90.0]),
        detection("chair", 0.3, [60.0, 60.0, 60.0, 60.0]),
    ]);
    let pipeline = pipeline_with(Arc::new(detector), Arc::new(RednessClassifier::new()));

    let items = pipeline.process(&test_image(100, 100)).unwrap();

    let categories: Vec<&str> = items.iter().map(|i| i.category.as_str()).collect();
    assert_eq!(categories, ["tv", "dog", "laptop"]);
}

#[test]
fn test_predicted_brand_belongs_to_candidate_set() {
    let catalog = BrandCatalog::default();
    let detector = FixedDetector::new(
        catalog
            .categories()
            .iter()
            .map(|c| detection(c, 0.6, [5.0, 5.0, 60.0, 60.0]))
            .collect(),
    );
    let pipeline = pipeline_with(Arc::new(detector), Arc::new(RednessClassifier::new()));

    let items = pipeline.process(&test_image(64, 64)).unwrap();

    assert_eq!(items.len(), catalog.len());
    for item in &items {
        let candidates = catalog.lookup(&item.category).unwrap();
        assert!(candidates.contains(&item.predicted_brand));
    }
}

#[test]
fn test_processing_is_idempotent() {
    let detector = FixedDetector::new(vec![
        detection("laptop", 0.92, [10.0, 10.0, 110.0, 210.0]),
        detection("tv", 0.75, [120.0, 30.0, 280.0, 150.0]),
    ]);
    let pipeline = pipeline_with(Arc::new(detector), Arc::new(RednessClassifier::new()));
    let image = test_image(300, 300);

    let first = pipeline.process(&image).unwrap();
    let second = pipeline.process(&image).unwrap();

    assert_eq!(first, second);
}

#[test]
fn test_detector_error_propagates() {
    let pipeline = pipeline_with(Arc::new(FailingDetector), Arc::new(RednessClassifier::new()));

    let err = pipeline.process(&test_image(32, 32)).unwrap_err();

    assert!(matches!(err, PipelineError::Detection(_)));
}

#[test]
fn test_classifier_error_fails_request_by_default() {
    let detector = FixedDetector::new(vec![detection("laptop", 0.9, [0.0, 0.0, 20.0, 20.0])]);
    let pipeline = pipeline_with(Arc::new(detector), Arc::new(FailingClassifier));

    let err = pipeline.process(&test_image(32, 32)).unwrap_err();

    assert!(err.to_string().contains("laptop"));
}

#[test]
fn test_classifier_error_degrades_to_unknown() {
    let detector = FixedDetector::new(vec![
        detection("laptop", 0.9, [0.0, 0.0, 20.0, 20.0]),
        detection("dog", 0.8, [0.0, 0.0, 20.0, 20.0]),
    ]);
    let pipeline = AnnotationPipeline::new(
        Arc::new(detector),
        Arc::new(FailingClassifier),
        Arc::new(BrandCatalog::default()),
    )
    .with_failure_policy(ClassificationFailurePolicy::DegradeToUnknown);

    let items = pipeline.process(&test_image(32, 32)).unwrap();

    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|i| i.is_unknown()));
}

#[test]
fn test_custom_catalog_controls_refinement() {
    let catalog = BrandCatalog::new([("dog", vec!["Beagle", "Poodle"])]).unwrap();
    let detector = FixedDetector::new(vec![
        detection("dog", 0.8, [0.0, 0.0, 30.0, 30.0]),
        detection("laptop", 0.8, [0.0, 0.0, 30.0, 30.0]),
    ]);
    let pipeline = AnnotationPipeline::new(
        Arc::new(detector),
        Arc::new(RednessClassifier::new()),
        Arc::new(catalog),
    );

    let items = pipeline.process(&test_image(32, 32)).unwrap();

    assert_eq!(items[0].predicted_brand, "Beagle");
    assert!(items[1].is_unknown());
}
