// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Upload response types

use serde::{Deserialize, Serialize};

use crate::vision::AnnotatedDetection;

/// One detected object with its predicted brand
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemResponse {
    /// Detector class name
    pub category: String,
    /// [xmin, ymin, xmax, ymax] in source-image pixels
    pub bbox: [f32; 4],
    /// Detector confidence (0.0-1.0)
    pub confidence: f32,
    /// Brand from the category's candidate set, or "Unknown"
    pub predicted_brand: String,
    /// Probability of `predicted_brand`, 0.0 when unknown
    pub clip_confidence: f32,
}

impl From<AnnotatedDetection> for ItemResponse {
    fn from(item: AnnotatedDetection) -> Self {
        Self {
            category: item.category,
            bbox: item.bbox.to_array(),
            confidence: item.confidence,
            predicted_brand: item.predicted_brand,
            clip_confidence: item.clip_confidence,
        }
    }
}

/// Response from POST /upload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadResponse {
    pub items: Vec<ItemResponse>,
    /// File name of the annotated PNG, when annotation output is enabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotated_image: Option<String>,
}

impl UploadResponse {
    pub fn new(items: Vec<AnnotatedDetection>) -> Self {
        Self {
            items: items.into_iter().map(ItemResponse::from).collect(),
            annotated_image: None,
        }
    }
}
