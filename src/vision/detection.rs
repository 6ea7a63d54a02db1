// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Object detection stage
//!
//! Runs a YOLO ONNX export over the whole image and returns category-labelled
//! boxes in the pixel frame of the image that was passed in.

use anyhow::{anyhow, Context, Result};
use image::DynamicImage;
use ndarray::{ArrayViewD, Axis, Ix2};
use ort::execution_providers::CPUExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use super::preprocessing::{preprocess_for_detection, PreprocessInfo, DETECTION_INPUT_SIZE};

/// COCO class names in YOLOv5 index order
pub const COCO_CLASSES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich",
    "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator", "book",
    "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

/// Axis-aligned box in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
}

impl BoundingBox {
    pub fn new(xmin: f32, ymin: f32, xmax: f32, ymax: f32) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    /// Build from centre/size form (YOLO native)
    pub fn from_center(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self::new(
            cx - width / 2.0,
            cy - height / 2.0,
            cx + width / 2.0,
            cy + height / 2.0,
        )
    }

    pub fn width(&self) -> f32 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f32 {
        self.ymax - self.ymin
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// True when the box has no positive area (or non-finite edges)
    pub fn is_degenerate(&self) -> bool {
        let finite = [self.xmin, self.ymin, self.xmax, self.ymax]
            .iter()
            .all(|v| v.is_finite());
        !finite || self.width() <= 0.0 || self.height() <= 0.0
    }

    /// Intersection over union with another box
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix = (self.xmax.min(other.xmax) - self.xmin.max(other.xmin)).max(0.0);
        let iy = (self.ymax.min(other.ymax) - self.ymin.max(other.ymin)).max(0.0);
        let intersection = ix * iy;
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }

    /// `[xmin, ymin, xmax, ymax]`
    pub fn to_array(&self) -> [f32; 4] {
        [self.xmin, self.ymin, self.xmax, self.ymax]
    }
}

/// One object instance found by the detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Label from the detector vocabulary
    pub category: String,
    /// Detector confidence (0.0-1.0)
    pub confidence: f32,
    /// Box in source-image pixels
    pub bbox: BoundingBox,
}

/// Whole-image object detector
///
/// Implementations must be safe to share across requests; an implementation
/// backed by a non-reentrant runtime serializes its own inference calls.
#[cfg_attr(test, mockall::automock)]
pub trait ObjectDetector: Send + Sync {
    /// Detect objects, in the detector's native emission order
    fn detect(&self, image: &DynamicImage) -> Result<Vec<Detection>>;
}

/// Thresholds and sizes used by [`YoloDetector`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorParams {
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            input_size: DETECTION_INPUT_SIZE,
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
            max_detections: 1000,
        }
    }
}

/// A scored box before suppression, in letterboxed input space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub bbox: BoundingBox,
    pub score: f32,
    pub class_id: usize,
}

/// Decode raw YOLO output into scored candidates above `conf_threshold`
///
/// Accepts `[1, N, 5 + C]` (anchor-based: box, objectness, class scores) and
/// `[1, 4 + C, N]` (anchor-free: box, class scores).
pub fn decode_predictions(
    output: ArrayViewD<f32>,
    num_classes: usize,
    conf_threshold: f32,
) -> Result<Vec<Candidate>> {
    let shape = output.shape().to_vec();
    if shape.len() != 3 || shape[0] != 1 || num_classes == 0 {
        anyhow::bail!(
            "Unexpected detector output shape: {:?} for {} classes",
            shape,
            num_classes
        );
    }

    let batch = output
        .index_axis(Axis(0), 0)
        .into_dimensionality::<Ix2>()
        .context("Detector output is not a 2-D batch")?;
    let mut candidates = Vec::new();

    if shape[2] == num_classes + 5 {
        for row in batch.outer_iter() {
            let objectness = row[4];
            if objectness < conf_threshold {
                continue;
            }
            let (class_id, class_score) = best_class(row.iter().skip(5).copied());
            let score = objectness * class_score;
            if score >= conf_threshold {
                candidates.push(Candidate {
                    bbox: BoundingBox::from_center(row[0], row[1], row[2], row[3]),
                    score,
                    class_id,
                });
            }
        }
    } else if shape[1] == num_classes + 4 {
        for column in batch.axis_iter(Axis(1)) {
            let (class_id, score) = best_class(column.iter().skip(4).copied());
            if score >= conf_threshold {
                candidates.push(Candidate {
                    bbox: BoundingBox::from_center(column[0], column[1], column[2], column[3]),
                    score,
                    class_id,
                });
            }
        }
    } else {
        anyhow::bail!(
            "Detector output shape {:?} does not match {} labels",
            shape,
            num_classes
        );
    }

    Ok(candidates)
}

fn best_class(scores: impl Iterator<Item = f32>) -> (usize, f32) {
    scores
        .enumerate()
        .fold((0, f32::MIN), |best, (idx, s)| if s > best.1 { (idx, s) } else { best })
}

/// Class-aware greedy non-maximum suppression
///
/// Returns survivors in descending score order, at most `max_detections`.
pub fn non_max_suppression(
    mut candidates: Vec<Candidate>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id && k.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

/// The 80 COCO labels as owned strings
pub fn coco_labels() -> Vec<String> {
    COCO_CLASSES.iter().map(|s| s.to_string()).collect()
}

/// Load detector labels, one per line; blank lines are ignored
pub fn load_labels<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read labels file {}", path.display()))?;
    let labels: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();
    if labels.is_empty() {
        anyhow::bail!("Labels file {} is empty", path.display());
    }
    Ok(labels)
}

/// YOLO object detector on ONNX Runtime
///
/// Runs on the CPU execution provider. The session sits behind a mutex so
/// concurrent requests take turns.
#[derive(Clone)]
pub struct YoloDetector {
    session: Arc<Mutex<Session>>,
    input_name: String,
    labels: Arc<Vec<String>>,
    params: DetectorParams,
}

impl std::fmt::Debug for YoloDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YoloDetector")
            .field("input_name", &self.input_name)
            .field("labels", &self.labels.len())
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl YoloDetector {
    /// Load the detector from an ONNX file
    ///
    /// # Errors
    /// Returns error if:
    /// - Model file not found
    /// - ONNX Runtime initialization fails
    /// - `labels` is empty
    pub async fn new<P: AsRef<Path>>(
        model_path: P,
        labels: Vec<String>,
        params: DetectorParams,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();

        if !model_path.exists() {
            anyhow::bail!("Detection model not found: {}", model_path.display());
        }
        if labels.is_empty() {
            anyhow::bail!("Detector needs at least one label");
        }

        info!("Loading detection model from {}", model_path.display());

        let session = Session::builder()
            .context("Failed to create session builder")?
            .with_execution_providers([CPUExecutionProvider::default().build()])
            .context("Failed to set CPU execution provider")?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .context("Failed to set optimization level")?
            .with_intra_threads(4)
            .context("Failed to set intra threads")?
            .commit_from_file(model_path)
            .context(format!(
                "Failed to load detection model from {}",
                model_path.display()
            ))?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .unwrap_or_else(|| "images".to_string());

        debug!(
            "Detection model loaded - input: {}, {} labels",
            input_name,
            labels.len()
        );

        info!("✅ Detection model loaded ({} classes, CPU-only)", labels.len());

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            input_name,
            labels: Arc::new(labels),
            params,
        })
    }

    pub fn params(&self) -> &DetectorParams {
        &self.params
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    fn label_for(&self, class_id: usize) -> String {
        self.labels
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", class_id))
    }
}

impl ObjectDetector for YoloDetector {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<Detection>> {
        let info = PreprocessInfo::new(image, self.params.input_size);
        let input = preprocess_for_detection(image, self.params.input_size);

        let candidates = {
            let mut session = self
                .session
                .lock()
                .map_err(|_| anyhow!("Detection session lock poisoned"))?;

            let input_value = Value::from_array(input).context("Failed to create input tensor")?;

            let outputs = session
                .run(ort::inputs![&self.input_name => input_value])
                .context("Detection inference failed")?;

            let output_tensor = outputs[0]
                .try_extract_array::<f32>()
                .context("Failed to extract output tensor")?;
            debug!("Detection output shape: {:?}", output_tensor.shape());

            decode_predictions(
                output_tensor.view(),
                self.labels.len(),
                self.params.confidence_threshold,
            )?
        };

        let kept = non_max_suppression(
            candidates,
            self.params.iou_threshold,
            self.params.max_detections,
        );

        let detections: Vec<Detection> = kept
            .into_iter()
            .map(|c| {
                let (xmin, ymin) = info.map_and_clip(c.bbox.xmin, c.bbox.ymin);
                let (xmax, ymax) = info.map_and_clip(c.bbox.xmax, c.bbox.ymax);
                Detection {
                    category: self.label_for(c.class_id),
                    confidence: c.score,
                    bbox: BoundingBox::new(xmin, ymin, xmax, ymax),
                }
            })
            .collect();

        debug!("Detected {} objects", detections.len());

        Ok(detections)
    }
}
