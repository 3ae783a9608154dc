//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod iflow;
mod package;
mod tenant;
mod workflow;

pub use iflow::IflowCommands;
pub use package::PackageCommands;
pub use tenant::TenantCommands;
pub use workflow::WorkflowCommands;

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Tenant connectivity
    Tenant {
        #[command(subcommand)]
        command: TenantCommands,
    },
    /// Integration packages
    Package {
        #[command(subcommand)]
        command: PackageCommands,
    },
    /// Integration flows: configuration and dependencies
    Iflow {
        #[command(subcommand)]
        command: IflowCommands,
    },
    /// Background workflows
    Workflow {
        #[command(subcommand)]
        command: WorkflowCommands,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Tenant { command } => tenant::handle_tenant_command(command, config).await,
        Commands::Package { command } => package::handle_package_command(command, config).await,
        Commands::Iflow { command } => iflow::handle_iflow_command(command, config).await,
        Commands::Workflow { command } => workflow::handle_workflow_command(command, config).await,
    }
}

/// Parse a single key=value pair
pub(crate) fn parse_key_val(s: &str) -> Result<(String, String)> {
    let pos = s
        .find('=')
        .ok_or_else(|| anyhow::anyhow!("invalid KEY=value: no `=` found in `{}`", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}
