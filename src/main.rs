use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};
use powerplatform_client::config::ProviderConfig;

mod cli;

use cli::commands::{handle_request_command, handle_scope_command, handle_strategy_command};
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_default_env().init();

    let cli = Cli::parse();
    info!("Starting ppc");

    let config = ProviderConfig::load().context("Failed to load configuration")?;
    debug!("Loaded configuration for cloud {}", config.cloud);

    match cli.command {
        Commands::Scope(args) => handle_scope_command(&config, args),
        Commands::Strategy => handle_strategy_command(&config),
        Commands::Request(args) => handle_request_command(config, args).await,
    }
}
