// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image loading, format sniffing and region cropping

use image::{DynamicImage, GenericImageView, ImageFormat};
use std::path::Path;
use thiserror::Error;

use super::detection::BoundingBox;

/// Default upload size limit (10MB)
pub const MAX_IMAGE_SIZE: usize = 10 * 1024 * 1024;

/// Errors raised while loading or slicing images
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Image data is too large: {0} bytes (max: {1} bytes)")]
    TooLarge(usize, usize),

    #[error("Unsupported image format")]
    UnsupportedFormat,

    #[error("Failed to decode image: {0}")]
    DecodeFailed(String),

    #[error("Image data is empty")]
    EmptyData,

    #[error("Failed to read image file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Degenerate region {width}x{height} at ({x}, {y})")]
    DegenerateRegion {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
}

/// Image information extracted during loading
#[derive(Debug, Clone)]
pub struct ImageInfo {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Detected format
    pub format: ImageFormat,
    /// Size in bytes
    pub size_bytes: usize,
}

/// Decode raw image bytes (multipart uploads)
///
/// Inputs larger than `max_bytes` are rejected before decoding. The image is
/// converted to RGB so every downstream stage sees the same pixel layout
/// regardless of the source format.
pub fn decode_image_bytes(
    bytes: &[u8],
    max_bytes: usize,
) -> Result<(DynamicImage, ImageInfo), ImageError> {
    if bytes.len() > max_bytes {
        return Err(ImageError::TooLarge(bytes.len(), max_bytes));
    }

    if bytes.is_empty() {
        return Err(ImageError::EmptyData);
    }

    let format = detect_format(bytes)?;

    let img = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| ImageError::DecodeFailed(e.to_string()))?;
    let img = DynamicImage::ImageRgb8(img.to_rgb8());

    let info = ImageInfo {
        width: img.width(),
        height: img.height(),
        format,
        size_bytes: bytes.len(),
    };

    Ok((img, info))
}

/// Read and decode an image persisted on disk
pub fn load_image_file<P: AsRef<Path>>(
    path: P,
    max_bytes: usize,
) -> Result<(DynamicImage, ImageInfo), ImageError> {
    let bytes = std::fs::read(path.as_ref())?;
    decode_image_bytes(&bytes, max_bytes)
}

/// Detect image format from magic bytes
pub fn detect_format(bytes: &[u8]) -> Result<ImageFormat, ImageError> {
    if bytes.len() < 4 {
        return Err(ImageError::UnsupportedFormat);
    }

    match bytes {
        // PNG: 89 50 4E 47
        [0x89, 0x50, 0x4E, 0x47, ..] => Ok(ImageFormat::Png),

        // JPEG: FF D8 FF
        [0xFF, 0xD8, 0xFF, ..] => Ok(ImageFormat::Jpeg),

        // WebP: RIFF .... WEBP
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => Ok(ImageFormat::WebP),

        // GIF87a / GIF89a
        [0x47, 0x49, 0x46, 0x38, x, ..] if *x == 0x37 || *x == 0x39 => Ok(ImageFormat::Gif),

        // BMP: BM
        [0x42, 0x4D, ..] => Ok(ImageFormat::Bmp),

        // TIFF, either byte order
        [0x49, 0x49, 0x2A, 0x00, ..] | [0x4D, 0x4D, 0x00, 0x2A, ..] => Ok(ImageFormat::Tiff),

        _ => Err(ImageError::UnsupportedFormat),
    }
}

/// Crop `image` to `bbox`
///
/// Box edges are rounded to whole pixels and clamped to the image bounds.
/// A box that ends up with zero width or height is reported as
/// [`ImageError::DegenerateRegion`]; callers decide whether that is fatal.
pub fn crop_region(image: &DynamicImage, bbox: &BoundingBox) -> Result<DynamicImage, ImageError> {
    let (img_w, img_h) = image.dimensions();

    let clamp = |v: f32, max: u32| -> u32 { v.round().clamp(0.0, max as f32) as u32 };

    let x0 = clamp(bbox.xmin, img_w);
    let y0 = clamp(bbox.ymin, img_h);
    let x1 = clamp(bbox.xmax, img_w);
    let y1 = clamp(bbox.ymax, img_h);

    let width = x1.saturating_sub(x0);
    let height = y1.saturating_sub(y0);

    if bbox.is_degenerate() || width == 0 || height == 0 {
        return Err(ImageError::DegenerateRegion {
            x: x0,
            y: y0,
            width,
            height,
        });
    }

    Ok(image.crop_imm(x0, y0, width, height))
}
