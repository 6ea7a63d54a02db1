// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::Result;
use brand_lens::{api::start_server, cli::ServerArgs, service::build_app_state};
use clap::Parser;
use std::env;

#[tokio::main]
async fn main() -> Result<()> {
    // Pick up .env before reading any configuration
    dotenv::dotenv().ok();

    // Initialize tracing subscriber for logging
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    let args = ServerArgs::parse();

    println!("🚀 Starting {}...\n", brand_lens::version::get_version_string());
    println!("📦 BUILD VERSION: {}", brand_lens::version::VERSION);
    println!("📅 Build Date: {}", brand_lens::version::BUILD_DATE);
    println!();

    let config = args.load_config()?;
    tracing::info!("Upload directory: {}", config.upload_dir.display());
    tracing::info!("Classification failure policy: {:?}", config.failure_policy);

    println!("🧠 Loading detection and classification models...");
    let state = build_app_state(&config).await?;
    println!("✅ Models loaded");

    println!("🌐 Serving on http://{}", config.listen);
    start_server(&config, state).await
}
