#![warn(clippy::all, clippy::pedantic)]

use anyhow::{Context, Result};
use benjamin::Config;
use benjamin::cli::commands::Cli;
use clap::Parser;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    let mut config = Config::load_or_init()?;
    if let Some(state_dir) = &cli.state_dir {
        config.state_dir.clone_from(state_dir);
        std::fs::create_dir_all(state_dir).context("Failed to create state directory")?;
    }
    benjamin::app::dispatch::dispatch(cli, Arc::new(config)).await
}
