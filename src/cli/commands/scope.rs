use anyhow::{Context, Result};
use clap::Args;
use colored::*;
use powerplatform_client::api::resolve_scope;
use powerplatform_client::config::ProviderConfig;

#[derive(Args)]
pub struct ScopeCommand {
    /// Absolute URL of the API endpoint
    pub url: String,
}

pub fn handle_scope_command(config: &ProviderConfig, args: ScopeCommand) -> Result<()> {
    let scope = resolve_scope(&args.url, &config.urls)
        .with_context(|| format!("Failed to resolve scope for {}", args.url))?;

    println!("{} {}", "Cloud:".dimmed(), config.cloud.to_string().cyan());
    println!("{}", scope.green().bold());
    Ok(())
}
