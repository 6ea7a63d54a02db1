// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Upload endpoint handler

use axum::{extract::State, Json};
use axum_extra::extract::multipart::{Multipart, MultipartRejection};
use std::io::Write;
use std::path::Path;
use std::time::Instant;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use super::response::UploadResponse;
use crate::api::errors::ApiError;
use crate::api::http_server::{AnnotationOutput, AppState};
use crate::vision::{load_image_file, AnnotationPipeline, PipelineError};

/// Multipart field carrying the image
pub const IMAGE_FIELD: &str = "image";

/// POST /upload - Detect products and predict their brands
///
/// Accepts `multipart/form-data` with the file in field `image`. The upload
/// is kept in a temporary file under the upload directory only while it is
/// processed.
///
/// # Response
/// - `items`: one entry per detected object, in detector order
/// - `annotated_image`: file name of the annotated copy (if enabled)
///
/// # Errors
/// - 400 Bad Request: not multipart, no `image` field, or empty file
/// - 500 Internal Server Error: undecodable image or inference failure
pub async fn upload_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    let start = Instant::now();
    let mut multipart = multipart.map_err(|e| ApiError::InvalidRequest(e.body_text()))?;

    // 1. Pull the image field out of the form
    let (file_name, bytes) = read_image_field(&mut multipart).await?;
    debug!(
        "Upload received: {} ({} bytes)",
        file_name.as_deref().unwrap_or("<unnamed>"),
        bytes.len()
    );

    // 2. Persist transiently
    let upload = persist_upload(&state.upload_dir, file_name.as_deref(), &bytes)?;
    drop(bytes);

    // 3. Run inference off the async runtime; the temp file goes with the task
    let pipeline = state.pipeline.clone();
    let annotation = state.annotation.clone();
    let max_bytes = state.max_upload_bytes;
    let response = tokio::task::spawn_blocking(move || {
        let result = process_upload(&pipeline, annotation.as_ref(), upload.path(), max_bytes);
        if let Err(e) = upload.close() {
            warn!("Failed to remove transient upload: {}", e);
        }
        result
    })
    .await
    .map_err(|e| ApiError::InternalError(format!("Processing task failed: {}", e)))??;

    info!(
        "Upload processed: {} items in {}ms",
        response.items.len(),
        start.elapsed().as_millis()
    );

    Ok(Json(response))
}

async fn read_image_field(
    multipart: &mut Multipart,
) -> Result<(Option<String>, axum::body::Bytes), ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::InvalidRequest(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        let file_name = field.file_name().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::InvalidRequest(format!("Failed to read upload: {}", e)))?;

        if bytes.is_empty() {
            return Err(ApiError::InvalidRequest("Uploaded image is empty".to_string()));
        }
        return Ok((file_name, bytes));
    }

    Err(ApiError::InvalidRequest(format!(
        "Missing '{}' file field",
        IMAGE_FIELD
    )))
}

/// Extension of the client file name, if it is safe to reuse
fn upload_suffix(file_name: Option<&str>) -> String {
    file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default()
}

fn persist_upload(dir: &Path, file_name: Option<&str>, bytes: &[u8]) -> Result<NamedTempFile, ApiError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| ApiError::InternalError(format!("Failed to create upload directory: {}", e)))?;

    let mut file = tempfile::Builder::new()
        .prefix("upload-")
        .suffix(&upload_suffix(file_name))
        .tempfile_in(dir)
        .map_err(|e| ApiError::InternalError(format!("Failed to store upload: {}", e)))?;

    file.write_all(bytes)
        .and_then(|_| file.flush())
        .map_err(|e| ApiError::InternalError(format!("Failed to store upload: {}", e)))?;

    Ok(file)
}

fn process_upload(
    pipeline: &AnnotationPipeline,
    annotation: Option<&AnnotationOutput>,
    path: &Path,
    max_bytes: usize,
) -> Result<UploadResponse, ApiError> {
    let (image, info) = load_image_file(path, max_bytes).map_err(PipelineError::from)?;
    debug!("Decoded upload: {}x{} {:?}", info.width, info.height, info.format);

    let items = pipeline.process(&image)?;

    // Annotated output never changes the returned data
    let annotated_image = annotation.and_then(|out| {
        match out.annotator.save(&image, &items, &out.dir) {
            Ok(path) => path.file_name().map(|n| n.to_string_lossy().into_owned()),
            Err(e) => {
                warn!("Failed to write annotated image: {:#}", e);
                None
            }
        }
    });

    let mut response = UploadResponse::new(items);
    response.annotated_image = annotated_image;
    Ok(response)
}
