use anyhow::Result;
use colored::*;
use powerplatform_client::auth::{AuthError, CredentialStrategy};
use powerplatform_client::config::ProviderConfig;

pub fn handle_strategy_command(config: &ProviderConfig) -> Result<()> {
    match CredentialStrategy::select(&config.credentials) {
        Ok(strategy) => {
            println!("{}", strategy.name().green().bold());
            if !strategy.tenant_id().is_empty() {
                println!("{} {}", "Tenant:".dimmed(), strategy.tenant_id());
            }
            Ok(())
        }
        Err(AuthError::NoCredentials) => {
            println!("{}", "No credentials configured".yellow());
            println!(
                "Set POWER_PLATFORM_TENANT_ID/CLIENT_ID/CLIENT_SECRET, POWER_PLATFORM_USE_CLI, \
                 POWER_PLATFORM_USE_OIDC or POWER_PLATFORM_USE_MSI"
            );
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
