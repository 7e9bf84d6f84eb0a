pub mod ai;
pub mod categorize;
pub mod cli;
mod commands;
pub mod config;
pub mod error;
pub mod jobs;
pub mod mover;
pub mod rate_limit;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

/// Parse the command line and dispatch
pub async fn run() -> anyhow::Result<()> {
    // .env in the working directory, if any
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // RUST_LOG wins. Default: warn for dependencies, info for our job summaries
    let default_filter = if cli.verbose {
        "warn,plugsort_lib=debug"
    } else {
        "warn,plugsort_lib=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with_writer(std::io::stderr)
        .init();

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Run(args) => commands::run::run(config, args).await,
        Commands::Categories { action } => commands::categories::run(config, action),
        Commands::Providers { action } => commands::providers::run(config, action).await,
        Commands::Settings { action } => commands::settings::run(config, action),
    }
}
