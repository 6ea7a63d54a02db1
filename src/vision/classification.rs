// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Zero-shot region classification with CLIP
//!
//! The image region and every candidate string are scored by a CLIP ONNX
//! export (`logits_per_image`); the logits are softmaxed across candidates
//! and the first maximum wins.

use anyhow::{anyhow, Context, Result};
use image::{DynamicImage, GenericImageView};
use ndarray::Array2;
use ort::execution_providers::CPUExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokenizers::Tokenizer;
use tracing::{debug, info};

use super::preprocessing::preprocess_for_clip;

/// CLIP text context length
pub const CLIP_MAX_TOKENS: usize = 77;

/// CLIP end-of-text id, used for padding when the tokenizer lacks it
const CLIP_EOT_ID: u32 = 49407;

/// Template that feeds candidate names to the text tower unchanged
pub const DEFAULT_PROMPT_TEMPLATE: &str = "{}";

/// Outcome of one zero-shot classification call
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    /// Winning candidate, always one of the inputs
    pub predicted_label: String,
    /// Probability of the winning candidate (0.0-1.0]
    pub confidence: f32,
    /// Softmax distribution in candidate order
    pub probabilities: Vec<f32>,
}

impl ClassificationResult {
    /// Softmax `logits` over `candidates` and pick the first maximum
    pub fn from_logits(candidates: &[String], logits: &[f32]) -> Result<Self> {
        if candidates.is_empty() {
            anyhow::bail!("Cannot classify against an empty candidate list");
        }
        if candidates.len() != logits.len() {
            anyhow::bail!(
                "Got {} logits for {} candidates",
                logits.len(),
                candidates.len()
            );
        }

        let probabilities = softmax(logits);
        let best = stable_argmax(&probabilities)
            .ok_or_else(|| anyhow!("Similarity scores are not finite"))?;

        Ok(Self {
            predicted_label: candidates[best].clone(),
            confidence: probabilities[best],
            probabilities,
        })
    }
}

/// Numerically stable softmax
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Index of the first maximum; `None` for empty or NaN-only input
pub fn stable_argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, &v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((idx, v)),
        }
    }
    best.map(|(idx, _)| idx)
}

/// Ranks candidate strings by similarity to an image region
#[cfg_attr(test, mockall::automock)]
pub trait RegionClassifier: Send + Sync {
    /// `candidates` must be non-empty and `region` must have positive area
    fn classify(&self, region: &DynamicImage, candidates: &[String])
        -> Result<ClassificationResult>;
}

/// CLIP ViT-B/32 zero-shot classifier on ONNX Runtime
///
/// Expects a combined export with `input_ids`, `attention_mask` and
/// `pixel_values` inputs and a `logits_per_image` output.
#[derive(Clone)]
pub struct ClipClassifier {
    /// ONNX Runtime session (serialized across requests)
    session: Arc<Mutex<Session>>,
    /// CLIP BPE tokenizer
    tokenizer: Arc<Tokenizer>,
    /// Index of `logits_per_image` among the session outputs
    logits_index: usize,
    /// Padding id for batched prompts
    pad_id: u32,
    /// Prompt template with a single `{}` placeholder
    prompt_template: String,
}

impl std::fmt::Debug for ClipClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClipClassifier")
            .field("logits_index", &self.logits_index)
            .field("pad_id", &self.pad_id)
            .field("prompt_template", &self.prompt_template)
            .finish_non_exhaustive()
    }
}

impl ClipClassifier {
    /// Load the CLIP model and its tokenizer
    ///
    /// # Errors
    /// Returns error if:
    /// - Model or tokenizer file not found or invalid
    /// - ONNX Runtime initialization fails
    /// - The template has no `{}` placeholder
    pub async fn new<P: AsRef<Path>>(
        model_path: P,
        tokenizer_path: P,
        prompt_template: impl Into<String>,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        let tokenizer_path = tokenizer_path.as_ref();
        let prompt_template = prompt_template.into();

        if !model_path.exists() {
            anyhow::bail!("CLIP model file not found: {}", model_path.display());
        }
        if !tokenizer_path.exists() {
            anyhow::bail!("Tokenizer file not found: {}", tokenizer_path.display());
        }
        if !prompt_template.contains("{}") {
            anyhow::bail!("Prompt template '{}' has no {{}} placeholder", prompt_template);
        }

        info!("Loading CLIP model from {}", model_path.display());

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
                "Failed to load CLIP model from {}",
                model_path.display()
            ))?;

        for required in ["input_ids", "attention_mask", "pixel_values"] {
            if !session.inputs.iter().any(|i| i.name == required) {
                anyhow::bail!("CLIP model is missing input '{}'", required);
            }
        }

        let logits_index = session
            .outputs
            .iter()
            .position(|o| o.name == "logits_per_image")
            .unwrap_or(0);
        debug!("CLIP logits_per_image at output index {}", logits_index);

        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;
        let pad_id = tokenizer
            .token_to_id("<|endoftext|>")
            .unwrap_or(CLIP_EOT_ID);

        info!("✅ CLIP model loaded successfully (CPU-only)");

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
            logits_index,
            pad_id,
            prompt_template,
        })
    }

    /// Render a candidate through the prompt template
    pub fn prompt_for(&self, candidate: &str) -> String {
        render_prompt(&self.prompt_template, candidate)
    }

    /// Tokenize candidates into padded `input_ids` and `attention_mask`
    fn encode_candidates(&self, candidates: &[String]) -> Result<(Array2<i64>, Array2<i64>)> {
        let prompts: Vec<String> = candidates.iter().map(|c| self.prompt_for(c)).collect();

        let encodings = self
            .tokenizer
            .encode_batch(prompts, true)
            .map_err(|e| anyhow!("Tokenization failed: {}", e))?;

        let ids: Vec<Vec<u32>> = encodings
            .iter()
            .map(|e| truncate_tokens(e.get_ids(), CLIP_MAX_TOKENS))
            .collect();

        Ok(pad_token_batch(&ids, self.pad_id as i64))
    }
}

impl RegionClassifier for ClipClassifier {
    fn classify(
        &self,
        region: &DynamicImage,
        candidates: &[String],
    ) -> Result<ClassificationResult> {
        if candidates.is_empty() {
            anyhow::bail!("Cannot classify against an empty candidate list");
        }
        let (w, h) = region.dimensions();
        if w == 0 || h == 0 {
            anyhow::bail!("Cannot classify a zero-area region ({}x{})", w, h);
        }

        let (input_ids, attention_mask) = self.encode_candidates(candidates)?;
        let pixel_values = preprocess_for_clip(region);

        let logits: Vec<f32> = {
            let mut session = self
                .session
                .lock()
                .map_err(|_| anyhow!("CLIP session lock poisoned"))?;

            let outputs = session
                .run(ort::inputs![
                    "input_ids" => Value::from_array(input_ids)?,
                    "attention_mask" => Value::from_array(attention_mask)?,
                    "pixel_values" => Value::from_array(pixel_values)?
                ])
                .context("CLIP inference failed")?;

            let logits_tensor = outputs[self.logits_index]
                .try_extract_array::<f32>()
                .context("Failed to extract logits_per_image")?;
            debug!("CLIP logits shape: {:?}", logits_tensor.shape());

            logits_tensor.iter().copied().collect()
        };

        let result = ClassificationResult::from_logits(candidates, &logits)?;
        debug!(
            "CLIP picked '{}' ({:.3}) from {} candidates",
            result.predicted_label,
            result.confidence,
            candidates.len()
        );
        Ok(result)
    }
}

/// Replace the `{}` placeholder with `candidate`
pub fn render_prompt(template: &str, candidate: &str) -> String {
    template.replacen("{}", candidate, 1)
}

/// Cut a token row to `max_len`, keeping its final (end-of-text) token
///
/// The CLIP text tower pools at the end-of-text position, so that token has to
/// survive truncation.
pub fn truncate_tokens(ids: &[u32], max_len: usize) -> Vec<u32> {
    match ids.split_last() {
        Some((&last, head)) if ids.len() > max_len && max_len > 0 => {
            let mut row = head[..max_len - 1].to_vec();
            row.push(last);
            row
        }
        _ => ids.iter().take(max_len).copied().collect(),
    }
}

/// Right-pad token id rows to a common length
///
/// Returns `(input_ids, attention_mask)` of shape `[rows, longest]`.
pub fn pad_token_batch(rows: &[Vec<u32>], pad_id: i64) -> (Array2<i64>, Array2<i64>) {
    let longest = rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut input_ids = Array2::from_elem((rows.len(), longest), pad_id);
    let mut attention_mask = Array2::zeros((rows.len(), longest));

    for (r, row) in rows.iter().enumerate() {
        for (c, &id) in row.iter().enumerate() {
            input_ids[[r, c]] = id as i64;
            attention_mask[[r, c]] = 1;
        }
    }

    (input_ids, attention_mask)
}
