// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Render annotated detections onto the uploaded image

use ab_glyph::{FontVec, PxScale};
use anyhow::{Context, Result};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

use super::pipeline::AnnotatedDetection;

const BOX_COLOR: [u8; 3] = [255, 0, 0];
const BOX_THICKNESS: u32 = 3;
const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_OFFSET_Y: i32 = 10;

/// Draws boxes and brand labels
///
/// Labels are only rendered when a TTF/OTF font has been supplied.
pub struct Annotator {
    font: Option<FontVec>,
    font_size: f32,
    color: Rgb<u8>,
    thickness: u32,
}

impl Default for Annotator {
    fn default() -> Self {
        Self {
            font: None,
            font_size: LABEL_FONT_SIZE,
            color: Rgb(BOX_COLOR),
            thickness: BOX_THICKNESS,
        }
    }
}

impl Annotator {
    /// Annotator that also writes labels with the font at `path`
    pub fn with_font_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read font file: {}", path.display()))?;
        let font = FontVec::try_from_vec(bytes)
            .map_err(|e| anyhow::anyhow!("Invalid font file {}: {}", path.display(), e))?;

        Ok(Self {
            font: Some(font),
            ..Self::default()
        })
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Label text for one detection, e.g. `Dell (0.87)`
    pub fn label(item: &AnnotatedDetection) -> String {
        format!("{} ({:.2})", item.predicted_brand, item.clip_confidence)
    }

    /// Draw every detection on a copy of `image`
    pub fn draw(&self, image: &DynamicImage, items: &[AnnotatedDetection]) -> RgbImage {
        let mut canvas = image.to_rgb8();
        let (w, h) = canvas.dimensions();

        for item in items {
            let x0 = (item.bbox.xmin.floor().max(0.0) as u32).min(w.saturating_sub(1));
            let y0 = (item.bbox.ymin.floor().max(0.0) as u32).min(h.saturating_sub(1));
            let x1 = (item.bbox.xmax.ceil().max(0.0) as u32).min(w);
            let y1 = (item.bbox.ymax.ceil().max(0.0) as u32).min(h);
            if x1 <= x0 || y1 <= y0 {
                continue;
            }

            // Concentric rectangles, growing inwards
            for t in 0..self.thickness {
                let bw = (x1 - x0).saturating_sub(2 * t);
                let bh = (y1 - y0).saturating_sub(2 * t);
                if bw == 0 || bh == 0 {
                    break;
                }
                let rect = Rect::at((x0 + t) as i32, (y0 + t) as i32).of_size(bw, bh);
                draw_hollow_rect_mut(&mut canvas, rect, self.color);
            }

            if let Some(font) = &self.font {
                draw_text_mut(
                    &mut canvas,
                    self.color,
                    x0 as i32,
                    (y0 as i32 - LABEL_OFFSET_Y).max(0),
                    PxScale::from(self.font_size),
                    font,
                    &Self::label(item),
                );
            }
        }

        canvas
    }

    /// Draw and write a PNG with a random name into `dir`
    pub fn save(
        &self,
        image: &DynamicImage,
        items: &[AnnotatedDetection],
        dir: &Path,
    ) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;

        let path = dir.join(format!("{}.png", Uuid::new_v4()));
        self.draw(image, items)
            .save(&path)
            .with_context(|| format!("Failed to write annotated image: {}", path.display()))?;

        debug!("Annotated image written to {}", path.display());
        Ok(path)
    }
}
