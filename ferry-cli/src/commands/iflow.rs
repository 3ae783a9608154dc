//! iFlow command handlers
//!
//! Lists flows, scores their dependency risk and shows or edits their
//! per-environment configuration.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use ferry_client::ArtifactDirectory;
use ferry_core::domain::catalog::{FlowRef, IFlow};
use ferry_core::domain::dependency::{DependencyAnalysis, ResourceCategory, RiskLevel};
use ferry_core::domain::environment::{Environment, IssueSeverity, ValidationReport};
use ferry_engine::{ConfigurationStore, DependencyScorer};

use super::parse_key_val;
use crate::config::Config;

/// iFlow subcommands
#[derive(Subcommand)]
pub enum IflowCommands {
    /// List flows of one or more packages
    List {
        /// Package ID (repeatable)
        #[arg(short, long = "package", required = true)]
        packages: Vec<String>,
    },
    /// Categorize a flow's resources and score its risk
    Analyze {
        /// iFlow ID
        id: String,

        /// Version to analyze
        #[arg(long, default_value = "active")]
        version: String,

        /// Print the analysis as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a flow's effective parameters for an environment
    Config {
        /// iFlow ID
        id: String,

        /// Target environment
        #[arg(short, long, default_value = "development")]
        env: Environment,

        /// Override a parameter (e.g., --set Timeout=60)
        #[arg(short, long = "set", value_parser = parse_key_val)]
        set: Vec<(String, String)>,

        /// Persist the overrides to the configuration service
        #[arg(long)]
        save: bool,
    },
}

pub async fn handle_iflow_command(command: IflowCommands, config: &Config) -> Result<()> {
    match command {
        IflowCommands::List { packages } => list_iflows(config, &packages).await,
        IflowCommands::Analyze { id, version, json } => {
            analyze_iflow(config, FlowRef::new(id, version), json).await
        }
        IflowCommands::Config { id, env, set, save } => {
            configure_iflow(config, id, env, set, save).await
        }
    }
}

async fn list_iflows(config: &Config, packages: &[String]) -> Result<()> {
    let client = config.client();
    let flows = client.iflows(&config.tenant, packages).await?;

    if flows.is_empty() {
        println!("{}", "No iFlows found.".yellow());
    } else {
        println!("{}", format!("Found {} iFlow(s):", flows.len()).bold());
        println!();
        for flow in &flows {
            print_iflow(flow);
        }
    }

    Ok(())
}

async fn analyze_iflow(config: &Config, flow: FlowRef, json: bool) -> Result<()> {
    let scorer = DependencyScorer::new(config.client(), config.engine.risk_policy)
        .with_read_timeout(config.engine.read_timeout);

    let analysis = scorer
        .analyze(&config.tenant, &flow)
        .await
        .with_context(|| format!("Failed to analyze {}", flow))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&analysis)?);
    } else {
        print_analysis(&analysis);
    }

    Ok(())
}

async fn configure_iflow(
    config: &Config,
    id: String,
    env: Environment,
    set: Vec<(String, String)>,
    save: bool,
) -> Result<()> {
    let client = config.client();
    let store = ConfigurationStore::new(config.tenant.clone(), client.clone(), client)
        .with_timeouts(config.engine.read_timeout, config.engine.write_timeout);
    store.switch_environment(env);

    let flows = vec![id.clone()];
    let mut loaded = store.load_configuration(&flows, env).await;
    if let Some(error) = loaded.remove(&id).and_then(|result| result.error) {
        return Err(error).with_context(|| format!("Failed to load configuration of {}", id));
    }

    for (key, value) in set {
        store.update_parameter(&id, &key, &value)?;
    }

    println!(
        "{}",
        format!("Configuration of {} for {}:", id, env).bold()
    );
    let overrides = store.overrides();
    let overridden = overrides.get(&id);
    for parameter in store.effective_parameters(&id)? {
        let marker = if overridden.is_some_and(|values| values.contains_key(&parameter.key)) {
            "*".yellow()
        } else {
            " ".normal()
        };
        let required = if parameter.mandatory { " (required)" } else { "" };
        println!(
            " {} {} = {}  {}{}",
            marker,
            parameter.key.cyan(),
            parameter.value,
            parameter.data_type.dimmed(),
            required.dimmed()
        );
    }
    println!();

    let report = store.validate_flows(&flows, env);
    print_validation(&report);

    if save {
        if !report.passed() {
            anyhow::bail!("refusing to save {} with validation errors", id);
        }
        store.save(env).await?;
        println!("{} Saved configuration for {}", "✓".green(), env);
    } else if store.has_unsaved_changes() {
        println!("{}", "Overrides not saved; pass --save to persist them.".dimmed());
    }

    Ok(())
}

fn print_iflow(flow: &IFlow) {
    println!("  {} {} ({})", "▸".cyan(), flow.name.bold(), flow.id.dimmed());
    println!("    Package: {}", flow.package_id);
    println!("    Version: {}", flow.version);
    if let Some(status) = &flow.status {
        println!("    Status:  {}", status);
    }
    println!();
}

fn print_analysis(analysis: &DependencyAnalysis) {
    println!(
        "{}",
        format!("Dependencies of {} {}:", analysis.iflow_id, analysis.version).bold()
    );

    let categories = [
        ("Value mappings", ResourceCategory::ValueMappings),
        ("Groovy scripts", ResourceCategory::GroovyScripts),
        ("Message mappings", ResourceCategory::MessageMappings),
        ("External services", ResourceCategory::ExternalServices),
        ("Process direct", ResourceCategory::ProcessDirect),
        ("Other", ResourceCategory::Other),
    ];
    for (label, category) in categories {
        let resources = analysis.category(category);
        if resources.is_empty() {
            continue;
        }
        let heading = format!("{} ({})", label, resources.len());
        if category.is_critical() {
            println!("  {}", heading.yellow());
        } else {
            println!("  {}", heading);
        }
        for resource in resources {
            println!("    - {} {}", resource.name, resource.resource_type.dimmed());
        }
    }

    println!();
    println!("  Total resources:       {}", analysis.total_resources());
    println!("  Critical dependencies: {}", analysis.critical_dependency_count);
    println!("  Risk:                  {}", colorize_risk(analysis.risk_level));
}

fn print_validation(report: &ValidationReport) {
    if report.issues.is_empty() {
        println!("{} No configuration issues", "✓".green());
        return;
    }

    for issue in &report.issues {
        let label = match issue.severity {
            IssueSeverity::Error => "error".red(),
            IssueSeverity::Warning => "warning".yellow(),
        };
        match &issue.parameter_key {
            Some(key) => println!("  {} {}: {}", label, key.cyan(), issue.message),
            None => println!("  {} {}", label, issue.message),
        }
    }
}

fn colorize_risk(level: RiskLevel) -> ColoredString {
    let text = level.to_string();
    match level {
        RiskLevel::Low => text.green(),
        RiskLevel::Medium => text.yellow(),
        RiskLevel::High => text.red(),
    }
}
