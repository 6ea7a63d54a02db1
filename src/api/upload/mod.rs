// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Upload API endpoint module
//!
//! Provides POST /upload for detecting products and predicting their brands.

pub mod handler;
pub mod response;

pub use handler::{upload_handler, IMAGE_FIELD};
pub use response::{ItemResponse, UploadResponse};
