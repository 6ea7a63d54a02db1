// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image preprocessing for the detector and the CLIP classifier

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use ndarray::Array4;

/// Default square input size for the YOLO detector
pub const DETECTION_INPUT_SIZE: u32 = 640;

/// Letterbox fill value used by YOLOv5
pub const LETTERBOX_FILL: u8 = 114;

/// CLIP ViT-B/32 input resolution
pub const CLIP_INPUT_SIZE: u32 = 224;

/// CLIP normalization mean values (not ImageNet)
pub const CLIP_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];

/// CLIP normalization std values
pub const CLIP_STD: [f32; 3] = [0.268_629_54, 0.261_302_58, 0.275_777_11];

/// Scale and resized dimensions for fitting `orig` inside a square `target`
fn fit_within(orig_w: u32, orig_h: u32, target_size: u32) -> (f32, u32, u32) {
    let scale = (target_size as f32 / orig_w as f32).min(target_size as f32 / orig_h as f32);
    let new_w = ((orig_w as f32 * scale).round() as u32).clamp(1, target_size);
    let new_h = ((orig_h as f32 * scale).round() as u32).clamp(1, target_size);
    (scale, new_w, new_h)
}

/// Preprocess an image for the YOLO detector
///
/// Steps:
/// 1. Letterbox to `input_size` x `input_size` (aspect preserved, centred)
/// 2. Scale pixels to [0, 1]
/// 3. Convert to NCHW tensor format [1, 3, H, W]
pub fn preprocess_for_detection(image: &DynamicImage, input_size: u32) -> Array4<f32> {
    let letterboxed = resize_with_padding(image, input_size, LETTERBOX_FILL);
    let rgb = letterboxed.to_rgb8();

    let size = input_size as usize;
    let mut tensor = Array4::zeros((1, 3, size, size));

    for (x, y, pixel) in rgb.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = pixel[c] as f32 / 255.0;
        }
    }

    tensor
}

/// Preprocess a cropped region for the CLIP image tower
///
/// Steps:
/// 1. Resize so the shortest side is 224 (bicubic)
/// 2. Center crop 224x224
/// 3. Normalize with CLIP mean/std: (pixel/255 - mean) / std
/// 4. Convert to NCHW tensor format [1, 3, 224, 224]
pub fn preprocess_for_clip(image: &DynamicImage) -> Array4<f32> {
    let cropped = resize_and_center_crop(image, CLIP_INPUT_SIZE);
    let rgb = cropped.to_rgb8();

    let size = CLIP_INPUT_SIZE as usize;
    let mut tensor = Array4::zeros((1, 3, size, size));

    for (x, y, pixel) in rgb.enumerate_pixels() {
        for c in 0..3 {
            let normalized = (pixel[c] as f32 / 255.0 - CLIP_MEAN[c]) / CLIP_STD[c];
            tensor[[0, c, y as usize, x as usize]] = normalized;
        }
    }

    tensor
}

/// Resize image with aspect ratio preservation and padding
///
/// The image is scaled to fit within target_size x target_size, then
/// centred on a canvas filled with `fill`.
pub fn resize_with_padding(image: &DynamicImage, target_size: u32, fill: u8) -> DynamicImage {
    let (orig_w, orig_h) = image.dimensions();
    let mut output = RgbImage::from_pixel(target_size, target_size, Rgb([fill, fill, fill]));

    if orig_w == 0 || orig_h == 0 {
        return DynamicImage::ImageRgb8(output);
    }

    let (_, new_w, new_h) = fit_within(orig_w, orig_h, target_size);
    let resized = image
        .resize_exact(new_w, new_h, FilterType::Triangle)
        .to_rgb8();

    let offset_x = (target_size - new_w) / 2;
    let offset_y = (target_size - new_h) / 2;
    image::imageops::replace(&mut output, &resized, offset_x as i64, offset_y as i64);

    DynamicImage::ImageRgb8(output)
}

/// Shortest-side resize followed by a centred square crop
pub fn resize_and_center_crop(image: &DynamicImage, target_size: u32) -> DynamicImage {
    let (orig_w, orig_h) = image.dimensions();

    if orig_w == 0 || orig_h == 0 {
        return DynamicImage::ImageRgb8(RgbImage::new(target_size, target_size));
    }

    let scale = target_size as f32 / orig_w.min(orig_h) as f32;
    let new_w = ((orig_w as f32 * scale).round() as u32).max(target_size);
    let new_h = ((orig_h as f32 * scale).round() as u32).max(target_size);

    let resized = image.resize_exact(new_w, new_h, FilterType::CatmullRom);
    let left = (new_w - target_size) / 2;
    let top = (new_h - target_size) / 2;

    resized.crop_imm(left, top, target_size, target_size)
}

/// Letterbox geometry for mapping detections back to the source image
#[derive(Debug, Clone, Copy)]
pub struct PreprocessInfo {
    /// Scale factor applied
    pub scale: f32,
    /// X offset from padding
    pub offset_x: u32,
    /// Y offset from padding
    pub offset_y: u32,
    /// Original image width
    pub original_width: u32,
    /// Original image height
    pub original_height: u32,
}

impl PreprocessInfo {
    /// Calculate letterbox info for an image
    pub fn new(image: &DynamicImage, target_size: u32) -> Self {
        let (orig_w, orig_h) = image.dimensions();

        if orig_w == 0 || orig_h == 0 {
            return Self {
                scale: 1.0,
                offset_x: 0,
                offset_y: 0,
                original_width: orig_w,
                original_height: orig_h,
            };
        }

        let (scale, new_w, new_h) = fit_within(orig_w, orig_h, target_size);

        Self {
            scale,
            offset_x: (target_size - new_w) / 2,
            offset_y: (target_size - new_h) / 2,
            original_width: orig_w,
            original_height: orig_h,
        }
    }

    /// Map a coordinate from preprocessed space back to original image space
    pub fn map_to_original(&self, x: f32, y: f32) -> (f32, f32) {
        let orig_x = (x - self.offset_x as f32) / self.scale;
        let orig_y = (y - self.offset_y as f32) / self.scale;
        (orig_x, orig_y)
    }

    /// Map a point back and clip it to the original image
    pub fn map_and_clip(&self, x: f32, y: f32) -> (f32, f32) {
        let (ox, oy) = self.map_to_original(x, y);
        (
            ox.clamp(0.0, self.original_width as f32),
            oy.clamp(0.0, self.original_height as f32),
        )
    }
}
