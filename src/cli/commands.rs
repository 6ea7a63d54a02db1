// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tracing::info;

use crate::api::UploadResponse;
use crate::config::ServiceConfig;
use crate::service::{load_annotator, load_catalog, load_pipeline};
use crate::vision::load_image_file;

/// Arguments for the catalog command
#[derive(Args, Debug)]
pub struct CatalogArgs {
    /// Only show this category
    #[arg(long)]
    pub category: Option<String>,
}

/// Arguments for the annotate command
#[derive(Args, Debug)]
pub struct AnnotateArgs {
    /// Image to process
    pub image: PathBuf,

    /// Also write an annotated PNG into this directory
    #[arg(long)]
    pub output: Option<PathBuf>,
}

pub fn check_config(config: &ServiceConfig) -> Result<()> {
    let rendered = toml::to_string_pretty(config).context("Failed to render configuration")?;
    println!("{}", rendered);
    Ok(())
}

pub fn show_catalog(config: &ServiceConfig, args: CatalogArgs) -> Result<()> {
    let catalog = load_catalog(config)?;

    if let Some(category) = args.category {
        match catalog.lookup(&category) {
            Some(brands) => println!("{}: {}", category, brands.join(", ")),
            None => anyhow::bail!("Category '{}' is not in the catalog", category),
        }
        return Ok(());
    }

    for category in catalog.categories() {
        let brands = catalog.lookup(category).unwrap_or_default();
        println!("{}: {}", category, brands.join(", "));
    }
    Ok(())
}

pub async fn annotate(config: &ServiceConfig, args: AnnotateArgs) -> Result<()> {
    let (image, _) = load_image_file(&args.image, config.max_upload_bytes)
        .with_context(|| format!("Failed to open {}", args.image.display()))?;
    let pipeline = load_pipeline(config).await?;

    let items = tokio::task::spawn_blocking(move || {
        let items = pipeline.process(&image);
        items.map(|items| (image, items))
    })
    .await
    .context("Pipeline task failed")?;
    let (image, items) = items?;

    if let Some(ref dir) = args.output {
        let path = load_annotator(config)?.save(&image, &items, dir)?;
        info!("Annotated image saved to {}", path.display());
    }

    let response = UploadResponse::new(items);
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
