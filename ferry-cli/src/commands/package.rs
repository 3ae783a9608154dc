//! Package command handlers

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use ferry_client::ArtifactDirectory;
use ferry_core::domain::catalog::Package;

use crate::config::Config;

/// Package subcommands
#[derive(Subcommand)]
pub enum PackageCommands {
    /// List all packages on the tenant
    List,
}

pub async fn handle_package_command(command: PackageCommands, config: &Config) -> Result<()> {
    let client = config.client();

    match command {
        PackageCommands::List => {
            let packages = client.packages(&config.tenant).await?;

            if packages.is_empty() {
                println!("{}", "No packages found.".yellow());
            } else {
                println!("{}", format!("Found {} package(s):", packages.len()).bold());
                println!();
                for package in &packages {
                    print_package(package);
                }
            }
            Ok(())
        }
    }
}

fn print_package(package: &Package) {
    println!("  {} {} ({})", "▸".cyan(), package.name.bold(), package.id.dimmed());
    println!("    Version: {}", package.version);
    println!("    iFlows:  {}", package.iflow_count);
    if let Some(description) = &package.description {
        println!("    {}", description.dimmed());
    }
    println!();
}
