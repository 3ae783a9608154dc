//! Ferry CLI
//!
//! Command-line front-end for the Ferry engine: run background workflows
//! against a tenant and inspect its packages and iFlows.

mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "ferry")]
#[command(about = "Ferry integration artifact pipeline CLI", long_about = None)]
struct Cli {
    /// Artifact service URL
    #[arg(long, env = "FERRY_SERVICE_URL", default_value = "http://localhost:8000")]
    service_url: String,

    /// Tenant identifier
    #[arg(long, env = "FERRY_TENANT_ID", default_value = "default")]
    tenant_id: String,

    /// Tenant display name (defaults to the id)
    #[arg(long, env = "FERRY_TENANT_NAME")]
    tenant_name: Option<String>,

    /// Base URL of the tenant's integration runtime
    #[arg(long, env = "FERRY_TENANT_URL", default_value = "")]
    tenant_url: String,

    /// OAuth client id
    #[arg(long, env = "FERRY_CLIENT_ID")]
    client_id: Option<String>,

    /// OAuth client secret
    #[arg(long, env = "FERRY_CLIENT_SECRET", hide_env_values = true)]
    client_secret: Option<String>,

    /// OAuth token endpoint
    #[arg(long, env = "FERRY_TOKEN_URL")]
    token_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ferry=info,ferry_engine=info,ferry_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = Config::build(
        cli.service_url,
        cli.tenant_id,
        cli.tenant_name,
        cli.tenant_url,
        cli.client_id,
        cli.client_secret,
        cli.token_url,
    )?;

    handle_command(cli.command, &config).await
}
