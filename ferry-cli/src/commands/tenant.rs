//! Tenant command handlers

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use ferry_client::ArtifactDirectory;

use crate::config::Config;

/// Tenant subcommands
#[derive(Subcommand)]
pub enum TenantCommands {
    /// Check that the tenant is reachable with the configured credentials
    Check,
}

pub async fn handle_tenant_command(command: TenantCommands, config: &Config) -> Result<()> {
    let client = config.client();

    match command {
        TenantCommands::Check => {
            let check = client.check_connection(&config.tenant).await?;
            if check.success {
                println!(
                    "{} Connected to {}",
                    "✓".green(),
                    config.tenant.to_string().cyan()
                );
            } else {
                println!(
                    "{} Connection to {} failed",
                    "✗".red(),
                    config.tenant.to_string().cyan()
                );
            }
            if !check.message.is_empty() {
                println!("  {}", check.message.dimmed());
            }
            if !check.success {
                anyhow::bail!("tenant {} is not reachable", config.tenant.id);
            }
            Ok(())
        }
    }
}
