// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::config::ServiceConfig;

/// Brand Lens HTTP server
#[derive(Parser, Debug)]
#[command(name = "brand-lens")]
#[command(version)]
#[command(about = "Detect products in uploaded images and predict their brands", long_about = None)]
pub struct ServerArgs {
    /// TOML configuration file
    #[arg(long, env = "BRAND_LENS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to listen on (overrides the config file)
    #[arg(long, env = "BRAND_LENS_LISTEN")]
    pub listen: Option<SocketAddr>,
}

impl ServerArgs {
    /// Config file + environment, with command-line flags on top
    pub fn load_config(&self) -> Result<ServiceConfig> {
        let mut config = ServiceConfig::load(self.config.as_deref())?;
        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        Ok(config)
    }
}

/// Brand Lens CLI
#[derive(Parser, Debug)]
#[command(name = "brand-lens-cli")]
#[command(version)]
#[command(about = "Offline tools for the Brand Lens service", long_about = None)]
pub struct Cli {
    /// TOML configuration file
    #[arg(long, env = "BRAND_LENS_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the effective configuration as TOML
    CheckConfig,

    /// Show the brand catalog in use
    Catalog(commands::CatalogArgs),

    /// Run the pipeline on a local image and print the result as JSON
    Annotate(commands::AnnotateArgs),
}

fn load_config(path: Option<&Path>) -> Result<ServiceConfig> {
    Ok(ServiceConfig::load(path)?)
}

/// Execute CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Commands::CheckConfig => commands::check_config(&config),
        Commands::Catalog(args) => commands::show_catalog(&config, args),
        Commands::Annotate(args) => commands::annotate(&config, args).await,
    }
}
