//! Step work
//!
//! A step is one unit of external work with a progress callback. The
//! engine owns sequencing and bookkeeping; a [`StepExecutor`] only performs
//! the work for a step kind and returns what it produced.

use async_trait::async_trait;
use ferry_client::{ArtifactDirectory, ArtifactTransport};
use ferry_core::domain::catalog::{FlowRef, IFlow, Package, PackageId};
use ferry_core::domain::dependency::RiskLevel;
use ferry_core::domain::environment::{Environment, IssueSeverity, ValidationReport};
use ferry_core::domain::transport::{
    DEFAULT_TEST_CASE, DeploymentResult, TestResult, UploadResult,
};
use ferry_core::domain::workflow::{
    Artifact, ArtifactKind, StepKind, WorkflowExecution, WorkflowStep,
};
use ferry_core::dto::transport::DeployRequest;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{FerryError, Result};
use crate::service::call::bounded;
use crate::service::configuration::check_parameters;
use crate::service::dependency::DependencyScorer;

/// Progress reporter handed to a running step (0..=100)
pub type Progress<'a> = &'a (dyn Fn(u8) + Send + Sync);

/// Catalog data discovered by earlier steps of the same execution
#[derive(Debug, Default)]
pub struct StepScratch {
    pub packages: Option<Vec<Package>>,
    pub flows: Option<Vec<IFlow>>,
}

/// What a step sees while it runs
pub struct StepContext<'a> {
    /// Execution state as of the moment the step started
    pub execution: &'a WorkflowExecution,
    pub scratch: &'a mut StepScratch,
}

/// What a successful step produced
#[derive(Debug, Default)]
pub struct StepOutcome {
    pub artifacts: Vec<Artifact>,
    pub summary: String,
}

impl StepOutcome {
    pub fn summary(summary: impl Into<String>) -> Self {
        Self {
            artifacts: Vec::new(),
            summary: summary.into(),
        }
    }

    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifacts.push(artifact);
        self
    }
}

/// Performs the work behind a step
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn run(
        &self,
        step: &WorkflowStep,
        context: StepContext<'_>,
        progress: Progress<'_>,
    ) -> Result<StepOutcome>;
}

/// Reports `done` of `total` items as a percentage below 100
fn report_progress(progress: Progress<'_>, done: usize, total: usize) {
    if total > 0 {
        progress(((done * 100) / total).min(99) as u8);
    }
}

/// Idempotency key of one deploy, stable across retries of an execution
fn deploy_key(execution: &WorkflowExecution, iflow_id: &str, environment: Environment) -> Uuid {
    let name = format!("{}/{}", iflow_id, environment);
    Uuid::new_v5(&execution.lineage, name.as_bytes())
}

/// Step work backed by the artifact directory and transport services
pub struct ServiceSteps {
    directory: Arc<dyn ArtifactDirectory>,
    transport: Arc<dyn ArtifactTransport>,
    scorer: DependencyScorer,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl ServiceSteps {
    pub fn new(
        directory: Arc<dyn ArtifactDirectory>,
        transport: Arc<dyn ArtifactTransport>,
        config: &EngineConfig,
    ) -> Self {
        let scorer = DependencyScorer::new(Arc::clone(&directory), config.risk_policy)
            .with_read_timeout(config.read_timeout);
        Self {
            directory,
            transport,
            scorer,
            read_timeout: config.read_timeout,
            write_timeout: config.write_timeout,
        }
    }

    // ========================================================================
    // Discovery
    // ========================================================================

    async fn packages(&self, context: &mut StepContext<'_>) -> Result<Vec<Package>> {
        if let Some(packages) = &context.scratch.packages {
            return Ok(packages.clone());
        }

        let execution = context.execution;
        let all = bounded(
            self.read_timeout,
            self.directory.packages(&execution.tenant),
        )
        .await?;

        let requested = &execution.config.package_ids;
        let packages = if requested.is_empty() {
            all
        } else {
            let selected: Vec<Package> = all
                .into_iter()
                .filter(|package| requested.contains(&package.id))
                .collect();
            if let Some(missing) = requested
                .iter()
                .find(|id| !selected.iter().any(|p| &p.id == *id))
            {
                return Err(FerryError::not_found("Package", missing.clone()));
            }
            selected
        };

        context.scratch.packages = Some(packages.clone());
        Ok(packages)
    }

    async fn flows(&self, context: &mut StepContext<'_>) -> Result<Vec<IFlow>> {
        if let Some(flows) = &context.scratch.flows {
            return Ok(flows.clone());
        }

        let package_ids: Vec<PackageId> = self
            .packages(context)
            .await?
            .into_iter()
            .map(|package| package.id)
            .collect();

        let execution = context.execution;
        let all = bounded(
            self.read_timeout,
            self.directory.iflows(&execution.tenant, &package_ids),
        )
        .await?;

        let requested = &execution.config.iflow_ids;
        let flows = if requested.is_empty() {
            all
        } else {
            let selected: Vec<IFlow> = all
                .into_iter()
                .filter(|flow| requested.contains(&flow.id))
                .collect();
            if let Some(missing) = requested
                .iter()
                .find(|id| !selected.iter().any(|f| &f.id == *id))
            {
                return Err(FerryError::not_found("iFlow", missing.clone()));
            }
            selected
        };

        context.scratch.flows = Some(flows.clone());
        Ok(flows)
    }

    async fn connect(&self, context: StepContext<'_>) -> Result<StepOutcome> {
        let tenant = &context.execution.tenant;
        let check = bounded(self.read_timeout, self.directory.check_connection(tenant)).await?;
        if !check.success {
            return Err(FerryError::Connectivity(check.message));
        }
        Ok(StepOutcome::summary(check.message))
    }

    async fn discover_packages(&self, mut context: StepContext<'_>) -> Result<StepOutcome> {
        context.scratch.packages = None;
        let packages = self.packages(&mut context).await?;
        Ok(StepOutcome::summary(format!(
            "Discovered {} package(s)",
            packages.len()
        )))
    }

    async fn discover_flows(&self, mut context: StepContext<'_>) -> Result<StepOutcome> {
        context.scratch.flows = None;
        let flows = self.flows(&mut context).await?;
        Ok(StepOutcome::summary(format!("Discovered {} iFlow(s)", flows.len())))
    }

    // ========================================================================
    // Export
    // ========================================================================

    async fn export_packages(
        &self,
        mut context: StepContext<'_>,
        step: &WorkflowStep,
        progress: Progress<'_>,
    ) -> Result<StepOutcome> {
        let packages = self.packages(&mut context).await?;
        let flows = self.flows(&mut context).await?;
        let mut outcome = StepOutcome::summary(format!("Exported {} package(s)", packages.len()));

        for (index, package) in packages.iter().enumerate() {
            let contained: Vec<&IFlow> = flows
                .iter()
                .filter(|flow| flow.package_id == package.id)
                .collect();
            outcome.artifacts.push(Artifact::json(
                format!("{}.package.json", package.id),
                ArtifactKind::PackageExport,
                &step.id,
                json!({ "package": package, "iflows": contained }),
            ));
            report_progress(progress, index + 1, packages.len());
        }

        Ok(outcome)
    }

    async fn export_flows(
        &self,
        mut context: StepContext<'_>,
        step: &WorkflowStep,
        progress: Progress<'_>,
    ) -> Result<StepOutcome> {
        let flows = self.flows(&mut context).await?;
        let execution = context.execution;
        let tenant = &execution.tenant;
        let mut outcome = StepOutcome::summary(format!("Exported {} iFlow(s)", flows.len()));

        for (index, flow) in flows.iter().enumerate() {
            let parameters = bounded(
                self.read_timeout,
                self.directory.configuration(tenant, &flow.reference()),
            )
            .await?;
            outcome.artifacts.push(Artifact::json(
                format!("{}.iflow.json", flow.id),
                ArtifactKind::FlowExport,
                &step.id,
                json!({ "iflow": flow, "parameters": parameters }),
            ));
            report_progress(progress, index + 1, flows.len());
        }

        Ok(outcome)
    }

    // ========================================================================
    // Checks
    // ========================================================================

    async fn validate_configuration(
        &self,
        mut context: StepContext<'_>,
        step: &WorkflowStep,
        progress: Progress<'_>,
    ) -> Result<StepOutcome> {
        let flows = self.flows(&mut context).await?;
        let execution = context.execution;
        let environment = execution.config.environment.unwrap_or(Environment::Development);
        let mut validation = ValidationReport::default();

        for (index, flow) in flows.iter().enumerate() {
            let declared = bounded(
                self.read_timeout,
                self.directory
                    .configuration(&execution.tenant, &FlowRef::active(flow.id.clone())),
            )
            .await?;
            validation
                .issues
                .extend(check_parameters(&flow.id, environment, &declared, None));
            report_progress(progress, index + 1, flows.len());
        }

        if !validation.passed() {
            let first = validation
                .issues
                .iter()
                .find(|issue| issue.severity == IssueSeverity::Error)
                .map(|issue| format!("{}: {}", issue.iflow_id, issue.message))
                .unwrap_or_default();
            return Err(FerryError::Validation(format!(
                "{} configuration error(s) for {}, first: {}",
                validation.error_count(),
                environment,
                first
            )));
        }

        let summary = format!(
            "Validated {} iFlow(s) for {} ({} warning(s))",
            flows.len(),
            environment,
            validation.issues.len()
        );
        Ok(StepOutcome::summary(summary).with_artifact(Artifact::json(
            format!("validation-{}.json", environment),
            ArtifactKind::ValidationReport,
            &step.id,
            json!(validation),
        )))
    }

    async fn analyze_dependencies(
        &self,
        mut context: StepContext<'_>,
        step: &WorkflowStep,
        progress: Progress<'_>,
    ) -> Result<StepOutcome> {
        let flows = self.flows(&mut context).await?;
        let execution = context.execution;
        let tenant = &execution.tenant;
        let mut analyses = BTreeMap::new();

        for (index, flow) in flows.iter().enumerate() {
            let analysis = self
                .scorer
                .analyze(tenant, &FlowRef::active(flow.id.clone()))
                .await?;
            analyses.insert(flow.id.clone(), analysis);
            report_progress(progress, index + 1, flows.len());
        }

        let risky = analyses
            .values()
            .filter(|analysis| analysis.risk_level > RiskLevel::Low)
            .count();
        Ok(StepOutcome::summary(format!(
            "Analyzed {} iFlow(s), {} above low risk",
            analyses.len(),
            risky
        ))
        .with_artifact(Artifact::json(
            "dependencies.json",
            ArtifactKind::DependencyReport,
            &step.id,
            json!(analyses),
        )))
    }

    // ========================================================================
    // Transport
    // ========================================================================

    async fn upload(
        &self,
        mut context: StepContext<'_>,
        step: &WorkflowStep,
        progress: Progress<'_>,
    ) -> Result<StepOutcome> {
        let flows = self.flows(&mut context).await?;
        let execution = context.execution;
        let tenant = &execution.tenant;
        let mut results = Vec::new();

        for (index, flow) in flows.iter().enumerate() {
            let flow = FlowRef::active(flow.id.clone());
            let response = bounded(self.write_timeout, self.transport.upload(tenant, &flow)).await?;
            if !response.status.is_success() {
                return Err(FerryError::rejected(
                    "Upload",
                    flow.id,
                    response.message.unwrap_or_default(),
                ));
            }
            results.push(UploadResult {
                iflow_id: flow.id,
                version: flow.version,
                status: response.status,
                message: response.message,
            });
            report_progress(progress, index + 1, flows.len());
        }

        Ok(StepOutcome::summary(format!("Uploaded {} iFlow(s)", results.len()))
            .with_artifact(Artifact::json(
                "uploads.json",
                ArtifactKind::DeploymentRecord,
                &step.id,
                json!(results),
            )))
    }

    async fn deploy(
        &self,
        mut context: StepContext<'_>,
        step: &WorkflowStep,
        progress: Progress<'_>,
    ) -> Result<StepOutcome> {
        let flows = self.flows(&mut context).await?;
        let execution = context.execution;
        let environment = execution.config.environment.unwrap_or(Environment::Development);
        let mut results = Vec::new();

        for (index, flow) in flows.iter().enumerate() {
            let flow = FlowRef::active(flow.id.clone());
            let request = DeployRequest {
                target_environment: environment,
                idempotency_key: deploy_key(execution, &flow.id, environment),
            };
            let response = bounded(
                self.write_timeout,
                self.transport.deploy(&execution.tenant, &flow, &request),
            )
            .await?;
            if !response.status.is_success() {
                return Err(FerryError::rejected(
                    "Deploy",
                    flow.id,
                    format!("deployment {} reported failure", response.deployment_id),
                ));
            }
            results.push(DeploymentResult {
                iflow_id: flow.id,
                version: flow.version,
                environment,
                deployment_id: response.deployment_id,
                runtime_id: response.runtime_id,
                status: response.status,
                idempotency_key: request.idempotency_key,
            });
            report_progress(progress, index + 1, flows.len());
        }

        Ok(
            StepOutcome::summary(format!("Deployed {} iFlow(s) to {}", results.len(), environment))
                .with_artifact(Artifact::json(
                    format!("deployments-{}.json", environment),
                    ArtifactKind::DeploymentRecord,
                    &step.id,
                    json!(results),
                )),
        )
    }

    async fn run_tests(
        &self,
        mut context: StepContext<'_>,
        step: &WorkflowStep,
        progress: Progress<'_>,
    ) -> Result<StepOutcome> {
        let flows = self.flows(&mut context).await?;
        let execution = context.execution;
        let default_cases = vec![DEFAULT_TEST_CASE.to_string()];
        let runs: Vec<(&str, &String)> = flows
            .iter()
            .flat_map(|flow| {
                let cases = execution
                    .config
                    .test_cases
                    .get(&flow.id)
                    .filter(|cases| !cases.is_empty())
                    .unwrap_or(&default_cases);
                cases.iter().map(move |case| (flow.id.as_str(), case))
            })
            .collect();

        let mut results = Vec::new();
        for (index, (iflow_id, case)) in runs.iter().enumerate() {
            let response = bounded(
                self.write_timeout,
                self.transport.test(&execution.tenant, iflow_id, case),
            )
            .await?;
            results.push(TestResult {
                iflow_id: iflow_id.to_string(),
                test_case_id: case.to_string(),
                status: response.status,
                execution_time_ms: response.execution_time_ms,
                result: response.result,
                error: response.error,
            });
            report_progress(progress, index + 1, runs.len());
        }

        let failed: BTreeSet<&str> = results
            .iter()
            .filter(|result| !result.status.is_success())
            .map(|result| result.iflow_id.as_str())
            .collect();
        if let Some(first) = failed.iter().next() {
            return Err(FerryError::rejected(
                "Test",
                first.to_string(),
                format!("{} of {} test case(s) failed", failed.len(), results.len()),
            ));
        }

        Ok(StepOutcome::summary(format!("{} test case(s) passed", results.len()))
            .with_artifact(Artifact::json(
                "tests.json",
                ArtifactKind::TestReport,
                &step.id,
                json!(results),
            )))
    }

    fn archive(&self, context: StepContext<'_>, step: &WorkflowStep) -> StepOutcome {
        let execution = context.execution;
        let artifacts = &execution.artifacts;
        let total_bytes: u64 = artifacts.iter().map(|a| a.size_bytes).sum();
        let entries: Vec<_> = artifacts
            .iter()
            .map(|a| json!({ "id": a.id, "name": a.name, "kind": a.kind, "size_bytes": a.size_bytes }))
            .collect();

        let name = format!(
            "{}-{}.manifest.json",
            execution.workflow_type,
            execution.created_at.format("%Y%m%dT%H%M%S")
        );
        StepOutcome::summary(format!(
            "Archived {} artifact(s), {} bytes",
            artifacts.len(),
            total_bytes
        ))
        .with_artifact(Artifact::json(
            name,
            ArtifactKind::ArchiveManifest,
            &step.id,
            json!({
                "tenant": execution.tenant.id,
                "execution_id": execution.id,
                "total_bytes": total_bytes,
                "artifacts": entries,
            }),
        ))
    }
}

#[async_trait]
impl StepExecutor for ServiceSteps {
    async fn run(
        &self,
        step: &WorkflowStep,
        context: StepContext<'_>,
        progress: Progress<'_>,
    ) -> Result<StepOutcome> {
        debug!("Running step {} ({:?})", step.id, step.kind);
        match step.kind {
            StepKind::Connect => self.connect(context).await,
            StepKind::DiscoverPackages => self.discover_packages(context).await,
            StepKind::DiscoverFlows => self.discover_flows(context).await,
            StepKind::ExportPackages => self.export_packages(context, step, progress).await,
            StepKind::ExportFlows => self.export_flows(context, step, progress).await,
            StepKind::ValidateConfiguration => {
                self.validate_configuration(context, step, progress).await
            }
            StepKind::AnalyzeDependencies => {
                self.analyze_dependencies(context, step, progress).await
            }
            StepKind::UploadArtifacts => self.upload(context, step, progress).await,
            StepKind::DeployArtifacts => self.deploy(context, step, progress).await,
            StepKind::RunTests => self.run_tests(context, step, progress).await,
            StepKind::Archive => Ok(self.archive(context, step)),
        }
    }
}
