// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Service configuration
//!
//! Layering: built-in defaults, then an optional TOML file, then environment
//! variables (a `.env` file is loaded by `main` before this runs).

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::vision::classification::DEFAULT_PROMPT_TEMPLATE;
use crate::vision::detection::DetectorParams;
use crate::vision::image_utils::MAX_IMAGE_SIZE;
use crate::vision::pipeline::ClassificationFailurePolicy;
use crate::vision::preprocessing::DETECTION_INPUT_SIZE;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidEnv { key: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub model_path: PathBuf,
    /// One class name per line; COCO names when absent
    pub labels_path: Option<PathBuf>,
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        let params = DetectorParams::default();
        Self {
            model_path: PathBuf::from("./models/yolov5s.onnx"),
            labels_path: None,
            input_size: DETECTION_INPUT_SIZE,
            confidence_threshold: params.confidence_threshold,
            iou_threshold: params.iou_threshold,
            max_detections: params.max_detections,
        }
    }
}

impl DetectorConfig {
    pub fn params(&self) -> DetectorParams {
        DetectorParams {
            input_size: self.input_size,
            confidence_threshold: self.confidence_threshold,
            iou_threshold: self.iou_threshold,
            max_detections: self.max_detections,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub model_path: PathBuf,
    pub tokenizer_path: PathBuf,
    /// Text prompt with a single `{}` placeholder for the brand name
    pub prompt_template: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("./models/clip-vit-base-patch32/model.onnx"),
            tokenizer_path: PathBuf::from("./models/clip-vit-base-patch32/tokenizer.json"),
            prompt_template: DEFAULT_PROMPT_TEMPLATE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub listen: SocketAddr,
    pub cors_origins: Vec<String>,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    /// TOML brand table; built-in table when absent
    pub catalog_path: Option<PathBuf>,
    pub failure_policy: ClassificationFailurePolicy,
    /// Write annotated PNGs here when set
    pub annotation_dir: Option<PathBuf>,
    pub font_path: Option<PathBuf>,
    pub detector: DetectorConfig,
    pub classifier: ClassifierConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 8000)),
            cors_origins: vec!["http://localhost:3000".to_string()],
            upload_dir: PathBuf::from("./uploads"),
            max_upload_bytes: MAX_IMAGE_SIZE,
            catalog_path: None,
            failure_policy: ClassificationFailurePolicy::default(),
            annotation_dir: None,
            font_path: None,
            detector: DetectorConfig::default(),
            classifier: ClassifierConfig::default(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidEnv {
            key: key.to_string(),
            value,
        })
}

impl ServiceConfig {
    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Defaults or `path`, then process environment, then validation
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from environment-style variables
    ///
    /// `lookup` is `std::env::var` in production and a map in tests.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("BRAND_LENS_LISTEN") {
            self.listen = parse_env("BRAND_LENS_LISTEN", v)?;
        }
        if let Some(v) = lookup("CORS_ALLOWED_ORIGINS") {
            self.cors_origins = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = lookup("UPLOAD_DIR") {
            self.upload_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("MAX_UPLOAD_BYTES") {
            self.max_upload_bytes = parse_env("MAX_UPLOAD_BYTES", v)?;
        }
        if let Some(v) = lookup("DETECTOR_MODEL_PATH") {
            self.detector.model_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("DETECTOR_LABELS_PATH") {
            self.detector.labels_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("DETECTOR_CONFIDENCE_THRESHOLD") {
            self.detector.confidence_threshold = parse_env("DETECTOR_CONFIDENCE_THRESHOLD", v)?;
        }
        if let Some(v) = lookup("DETECTOR_IOU_THRESHOLD") {
            self.detector.iou_threshold = parse_env("DETECTOR_IOU_THRESHOLD", v)?;
        }
        if let Some(v) = lookup("CLIP_MODEL_PATH") {
            self.classifier.model_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("CLIP_TOKENIZER_PATH") {
            self.classifier.tokenizer_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("CLIP_PROMPT_TEMPLATE") {
            self.classifier.prompt_template = v;
        }
        if let Some(v) = lookup("BRAND_CATALOG_PATH") {
            self.catalog_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("CLASSIFICATION_FAILURE_POLICY") {
            self.failure_policy = match v.as_str() {
                "fail_request" => ClassificationFailurePolicy::FailRequest,
                "degrade_to_unknown" => ClassificationFailurePolicy::DegradeToUnknown,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        key: "CLASSIFICATION_FAILURE_POLICY".to_string(),
                        value: v,
                    })
                }
            };
        }
        if let Some(v) = lookup("ANNOTATION_DIR") {
            self.annotation_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("ANNOTATION_FONT_PATH") {
            self.font_path = Some(PathBuf::from(v));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.detector;
        if !(0.0..=1.0).contains(&d.confidence_threshold) {
            return Err(ConfigError::Invalid(format!(
                "detector.confidence_threshold must be in [0, 1], got {}",
                d.confidence_threshold
            )));
        }
        if !(0.0..=1.0).contains(&d.iou_threshold) {
            return Err(ConfigError::Invalid(format!(
                "detector.iou_threshold must be in [0, 1], got {}",
                d.iou_threshold
            )));
        }
        if d.input_size == 0 {
            return Err(ConfigError::Invalid("detector.input_size must be > 0".into()));
        }
        if d.max_detections == 0 {
            return Err(ConfigError::Invalid("detector.max_detections must be > 0".into()));
        }
        if !self.classifier.prompt_template.contains("{}") {
            return Err(ConfigError::Invalid(format!(
                "classifier.prompt_template '{}' has no {{}} placeholder",
                self.classifier.prompt_template
            )));
        }
        if self.max_upload_bytes == 0 {
            return Err(ConfigError::Invalid("max_upload_bytes must be > 0".into()));
        }
        Ok(())
    }
}
