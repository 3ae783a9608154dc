//! Workflow command handlers
//!
//! Lists the template catalog and runs workflows in-process, following
//! their log until they finish.

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use ferry_core::domain::environment::Environment;
use ferry_core::domain::log::{LogEntry, LogLevel};
use ferry_core::domain::workflow::{
    StepStatus, WorkflowConfig, WorkflowExecution, WorkflowStatus, WorkflowTemplate,
};
use ferry_engine::WorkflowEngine;
use ferry_engine::workflow::parse_workflow_type;
use std::collections::BTreeMap;

use super::parse_key_val;
use crate::config::Config;

/// Workflow subcommands
#[derive(Subcommand)]
pub enum WorkflowCommands {
    /// List available workflow templates
    Templates,
    /// Run a workflow and follow its progress
    Run {
        /// Workflow type (e.g., full-pipeline)
        workflow_type: String,

        /// Package ID to operate on (repeatable; default: all)
        #[arg(short, long = "package")]
        packages: Vec<String>,

        /// iFlow ID to operate on (repeatable; default: all in the packages)
        #[arg(short, long = "iflow")]
        iflows: Vec<String>,

        /// Target environment for validate and deploy steps
        #[arg(short, long)]
        env: Option<Environment>,

        /// Test case for a flow (e.g., --test Orders_Inbound=smoke)
        #[arg(short, long = "test", value_parser = parse_key_val)]
        tests: Vec<(String, String)>,

        /// Retry a failed execution up to this many times
        #[arg(long, default_value_t = 0)]
        retries: u32,
    },
}

pub async fn handle_workflow_command(command: WorkflowCommands, config: &Config) -> Result<()> {
    match command {
        WorkflowCommands::Templates => {
            list_templates();
            Ok(())
        }
        WorkflowCommands::Run {
            workflow_type,
            packages,
            iflows,
            env,
            tests,
            retries,
        } => {
            let workflow_type = parse_workflow_type(&workflow_type)?;
            let mut workflow_config = WorkflowConfig::new(workflow_type)
                .with_packages(packages)
                .with_flows(iflows);
            workflow_config.environment = env;
            workflow_config.test_cases = group_test_cases(tests);

            run_workflow(config, workflow_config, retries).await
        }
    }
}

fn list_templates() {
    let templates = ferry_engine::workflow::catalog();

    println!("{}", format!("{} workflow template(s):", templates.len()).bold());
    println!();
    for template in &templates {
        print_template(template);
    }
}

/// Groups repeated FLOW=CASE pairs by flow, keeping their order
fn group_test_cases(pairs: Vec<(String, String)>) -> BTreeMap<String, Vec<String>> {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (flow, case) in pairs {
        grouped.entry(flow).or_default().push(case);
    }
    grouped
}

async fn run_workflow(config: &Config, workflow_config: WorkflowConfig, retries: u32) -> Result<()> {
    let client = config.client();
    let engine = WorkflowEngine::with_services(client.clone(), client, &config.engine);

    let mut execution = engine.execute_workflow(config.tenant.clone(), workflow_config)?;
    let mut attempts_left = retries;

    loop {
        println!(
            "{} {} execution {}",
            "▶".cyan(),
            execution.workflow_type.to_string().bold(),
            execution.id.to_string().dimmed()
        );

        let finished = follow(&engine, &execution).await?;
        print_summary(&finished);

        match finished.status {
            WorkflowStatus::Completed => return Ok(()),
            WorkflowStatus::Failed if attempts_left > 0 => {
                attempts_left -= 1;
                println!("{}", "Retrying...".yellow());
                execution = engine.retry_workflow(finished.id)?;
            }
            status => anyhow::bail!("workflow {} {}", finished.id, status.to_string().to_lowercase()),
        }
    }
}

/// Prints new log entries as they appear until the execution is terminal
///
/// Ctrl-C requests cancellation; the execution stops at the next step
/// boundary.
async fn follow(engine: &WorkflowEngine, execution: &WorkflowExecution) -> Result<WorkflowExecution> {
    let Some(mut rx) = engine.subscribe(execution.id) else {
        anyhow::bail!("execution {} not found", execution.id);
    };

    let mut printed = 0;
    let mut cancel_sent = false;
    loop {
        let snapshot = rx.borrow_and_update().clone();
        for entry in snapshot.logs.iter().skip(printed) {
            print_log_entry(entry);
        }
        printed = snapshot.logs.len();

        if snapshot.is_terminal() {
            return Ok(snapshot);
        }

        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    return engine
                        .get_execution(execution.id)
                        .ok_or_else(|| anyhow::anyhow!("execution {} disappeared", execution.id));
                }
            }
            _ = tokio::signal::ctrl_c(), if !cancel_sent => {
                let step = snapshot
                    .current_step()
                    .map(|step| step.name.as_str())
                    .unwrap_or("the current step");
                println!("{}", format!("Cancelling after {}...", step).yellow());
                engine.cancel_workflow(execution.id)?;
                cancel_sent = true;
            }
        }
    }
}

fn print_template(template: &WorkflowTemplate) {
    println!(
        "  {} {} ({})",
        "▸".cyan(),
        template.workflow_type.to_string().bold(),
        template.name
    );
    println!("    {}", template.description.dimmed());
    println!(
        "    Category: {}  Estimated: {}",
        template.category, template.estimated_duration
    );
    let steps: Vec<&str> = template.steps.iter().map(|step| step.id.as_str()).collect();
    println!("    Steps:    {}", steps.join(" → "));
    println!();
}

fn print_summary(execution: &WorkflowExecution) {
    println!("{}", "─".repeat(80).dimmed());
    println!(
        "  {} {}%, {} artifact(s)",
        colorize_status(&execution.status),
        execution.total_progress,
        execution.artifacts.len()
    );
    if let Some(failed) = execution.steps.iter().find(|s| s.status == StepStatus::Failed) {
        let error = failed.error_message.as_deref().unwrap_or_default();
        println!("  {} {}: {}", "✗".red(), failed.name, error.red());
    }
}

fn print_log_entry(log: &LogEntry) {
    let level_str = log.level.to_string();
    let level_colored = match log.level {
        LogLevel::Debug => level_str.dimmed(),
        LogLevel::Info => level_str.cyan(),
        LogLevel::Warning => level_str.yellow(),
        LogLevel::Error => level_str.red(),
    };

    println!(
        "{} [{}] {}",
        log.timestamp.format("%H:%M:%S").to_string().dimmed(),
        level_colored,
        log.message
    );
}

fn colorize_status(status: &WorkflowStatus) -> ColoredString {
    let status_str = status.to_string();
    match status {
        WorkflowStatus::Pending => status_str.yellow(),
        WorkflowStatus::Running => status_str.cyan(),
        WorkflowStatus::Completed => status_str.green(),
        WorkflowStatus::Failed => status_str.red(),
        WorkflowStatus::Cancelled => status_str.dimmed(),
    }
}
