//! Pipeline driver
//!
//! Performs the external work behind each stage and hands the result to
//! the session. A stage whose calls fail leaves the session untouched.

use ferry_client::{ArtifactDirectory, ArtifactTransport};
use ferry_core::domain::catalog::{FlowId, FlowRef, PackageId};
use ferry_core::domain::dependency::DependencyAnalysis;
use ferry_core::domain::environment::{Environment, ValidationReport};
use ferry_core::domain::pipeline::{SessionSnapshot, Stage, StageData};
use ferry_core::domain::tenant::Tenant;
use ferry_core::domain::transport::{
    DEFAULT_TEST_CASE, DeploymentResult, TestResult, UploadResult,
};
use ferry_core::dto::transport::DeployRequest;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{FerryError, Result};
use crate::pipeline::session::PipelineSession;
use crate::service::call::bounded;
use crate::service::configuration::ConfigurationStore;
use crate::service::dependency::DependencyScorer;

/// Drives one pipeline session against one tenant
pub struct PipelineDriver {
    tenant: Tenant,
    directory: Arc<dyn ArtifactDirectory>,
    transport: Arc<dyn ArtifactTransport>,
    session: PipelineSession,
    read_timeout: Duration,
    write_timeout: Duration,
    /// Keys reused by deploy retries until the stage completes
    deploy_keys: HashMap<(FlowId, Environment), Uuid>,
}

impl PipelineDriver {
    pub fn new(
        tenant: Tenant,
        directory: Arc<dyn ArtifactDirectory>,
        transport: Arc<dyn ArtifactTransport>,
    ) -> Self {
        Self {
            tenant,
            directory,
            transport,
            session: PipelineSession::new(),
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(120),
            deploy_keys: HashMap::new(),
        }
    }

    pub fn with_timeouts(mut self, read: Duration, write: Duration) -> Self {
        self.read_timeout = read;
        self.write_timeout = write;
        self
    }

    pub fn tenant(&self) -> &Tenant {
        &self.tenant
    }

    pub fn session(&self) -> &PipelineSession {
        &self.session
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.snapshot()
    }

    pub fn navigate_to(&mut self, stage: Stage) -> Result<()> {
        self.session.navigate_to(stage)
    }

    fn selected_packages(&self) -> Vec<PackageId> {
        self.session
            .data()
            .selected_packages
            .iter()
            .flatten()
            .cloned()
            .collect()
    }

    fn selected_flows(&self) -> Vec<FlowId> {
        self.session
            .data()
            .selected_flows
            .iter()
            .flatten()
            .cloned()
            .collect()
    }

    // ========================================================================
    // Stages 1-2: selection
    // ========================================================================

    /// Stage 1: every id must exist on the tenant
    pub async fn select_packages(&mut self, ids: &[PackageId]) -> Result<()> {
        if ids.is_empty() {
            return Err(FerryError::Validation(
                "select at least one package".to_string(),
            ));
        }

        let packages = bounded(self.read_timeout, self.directory.packages(&self.tenant)).await?;
        let known: BTreeSet<&str> = packages.iter().map(|p| p.id.as_str()).collect();
        if let Some(missing) = ids.iter().find(|id| !known.contains(id.as_str())) {
            return Err(FerryError::not_found("Package", missing.clone()));
        }

        info!("Selected {} package(s)", ids.len());
        self.session.complete_stage(
            Stage::PackageSelection,
            StageData::with_selected_packages(ids.iter().cloned()),
        )
    }

    /// Stage 2: every id must belong to a selected package
    pub async fn select_flows(&mut self, ids: &[FlowId]) -> Result<()> {
        self.session.check_prerequisites(Stage::FlowSelection)?;
        if ids.is_empty() {
            return Err(FerryError::Validation("select at least one iFlow".to_string()));
        }

        let packages = self.selected_packages();
        let flows = bounded(
            self.read_timeout,
            self.directory.iflows(&self.tenant, &packages),
        )
        .await?;
        let known: BTreeSet<&str> = flows.iter().map(|f| f.id.as_str()).collect();
        if let Some(missing) = ids.iter().find(|id| !known.contains(id.as_str())) {
            return Err(FerryError::not_found("iFlow", missing.clone()));
        }

        info!("Selected {} iFlow(s)", ids.len());
        self.session.complete_stage(
            Stage::FlowSelection,
            StageData::with_selected_flows(ids.iter().cloned()),
        )
    }

    // ========================================================================
    // Stages 3-5: configuration, validation, dependencies
    // ========================================================================

    /// Stage 3: records the store's overrides for every known environment
    pub fn commit_configuration(&mut self, store: &ConfigurationStore) -> Result<()> {
        let configurations = store.configurations();
        if store.has_unsaved_changes() {
            warn!(
                "Committing {} configuration with unsaved changes",
                store.active_environment()
            );
        }

        self.session.complete_stage(
            Stage::Configuration,
            StageData {
                configurations: Some(configurations),
                ..Default::default()
            },
        )
    }

    /// Stage 4: mandatory values and data types per flow and environment
    ///
    /// The stage completes only when the report has no errors; the report is
    /// returned either way.
    pub async fn validate(&mut self, store: &ConfigurationStore) -> Result<ValidationReport> {
        self.session.check_prerequisites(Stage::Validation)?;

        let flows = self.selected_flows();
        let environments: Vec<Environment> = self
            .session
            .data()
            .configurations
            .iter()
            .flat_map(BTreeMap::keys)
            .copied()
            .collect();

        let loaded = store
            .load_configuration(&flows, store.active_environment())
            .await;
        if let Some(err) = loaded.into_values().find_map(|entry| entry.error) {
            return Err(err);
        }

        let mut report = ValidationReport::default();
        for environment in environments {
            report.extend(store.validate_flows(&flows, environment));
        }

        if report.passed() {
            self.session.complete_stage(
                Stage::Validation,
                StageData {
                    validation_results: Some(report.clone()),
                    ..Default::default()
                },
            )?;
        } else {
            warn!("Validation found {} error(s)", report.error_count());
        }
        Ok(report)
    }

    /// Stage 5: scores every selected flow
    pub async fn analyze_dependencies(
        &mut self,
        scorer: &DependencyScorer,
    ) -> Result<BTreeMap<FlowId, DependencyAnalysis>> {
        self.session.check_prerequisites(Stage::DependencyAnalysis)?;

        let mut results = BTreeMap::new();
        for flow_id in self.selected_flows() {
            let analysis = scorer
                .analyze(&self.tenant, &FlowRef::active(flow_id.clone()))
                .await?;
            results.insert(flow_id, analysis);
        }

        self.session.complete_stage(
            Stage::DependencyAnalysis,
            StageData {
                dependency_results: Some(results.clone()),
                ..Default::default()
            },
        )?;
        Ok(results)
    }

    // ========================================================================
    // Stages 6-8: transport
    // ========================================================================

    /// Stage 6
    pub async fn upload(&mut self) -> Result<Vec<UploadResult>> {
        self.session.check_prerequisites(Stage::Upload)?;

        let mut results = Vec::new();
        for flow_id in self.selected_flows() {
            let flow = FlowRef::active(flow_id);
            let response = bounded(
                self.write_timeout,
                self.transport.upload(&self.tenant, &flow),
            )
            .await?;
            results.push(UploadResult {
                iflow_id: flow.id,
                version: flow.version,
                status: response.status,
                message: response.message,
            });
        }

        if let Some(failed) = results.iter().find(|r| !r.status.is_success()) {
            return Err(FerryError::rejected(
                "Upload",
                failed.iflow_id.clone(),
                failed.message.clone().unwrap_or_default(),
            ));
        }

        info!("Uploaded {} iFlow(s)", results.len());
        self.session.complete_stage(
            Stage::Upload,
            StageData {
                upload_results: Some(results.clone()),
                ..Default::default()
            },
        )?;
        Ok(results)
    }

    /// Stage 7: a retried deploy resends the same idempotency key per flow
    pub async fn deploy(&mut self, environment: Environment) -> Result<Vec<DeploymentResult>> {
        self.session.check_prerequisites(Stage::Deploy)?;

        let mut results = Vec::new();
        for flow_id in self.selected_flows() {
            let key = *self
                .deploy_keys
                .entry((flow_id.clone(), environment))
                .or_insert_with(Uuid::new_v4);
            let request = DeployRequest {
                target_environment: environment,
                idempotency_key: key,
            };
            let flow = FlowRef::active(flow_id);
            let response = bounded(
                self.write_timeout,
                self.transport.deploy(&self.tenant, &flow, &request),
            )
            .await?;
            results.push(DeploymentResult {
                iflow_id: flow.id,
                version: flow.version,
                environment,
                deployment_id: response.deployment_id,
                runtime_id: response.runtime_id,
                status: response.status,
                idempotency_key: key,
            });
        }

        if let Some(failed) = results.iter().find(|r| !r.status.is_success()) {
            return Err(FerryError::rejected(
                "Deploy",
                failed.iflow_id.clone(),
                format!("deployment {} reported failure", failed.deployment_id),
            ));
        }

        info!("Deployed {} iFlow(s) to {}", results.len(), environment);
        self.session.complete_stage(
            Stage::Deploy,
            StageData {
                deployment_results: Some(results.clone()),
                ..Default::default()
            },
        )?;
        self.deploy_keys.retain(|(_, env), _| *env != environment);
        Ok(results)
    }

    /// Stage 8: flows without configured cases run the default case
    pub async fn run_tests(
        &mut self,
        test_cases: &BTreeMap<FlowId, Vec<String>>,
    ) -> Result<Vec<TestResult>> {
        self.session.check_prerequisites(Stage::Test)?;

        let default_cases = vec![DEFAULT_TEST_CASE.to_string()];
        let mut results = Vec::new();
        for flow_id in self.selected_flows() {
            let cases = test_cases
                .get(&flow_id)
                .filter(|cases| !cases.is_empty())
                .unwrap_or(&default_cases);

            for case in cases {
                let response = bounded(
                    self.write_timeout,
                    self.transport.test(&self.tenant, &flow_id, case),
                )
                .await?;
                results.push(TestResult {
                    iflow_id: flow_id.clone(),
                    test_case_id: case.clone(),
                    status: response.status,
                    execution_time_ms: response.execution_time_ms,
                    result: response.result,
                    error: response.error,
                });
            }
        }

        if let Some(failed) = results.iter().find(|r| !r.status.is_success()) {
            return Err(FerryError::rejected(
                "Test",
                failed.iflow_id.clone(),
                failed
                    .error
                    .clone()
                    .unwrap_or_else(|| format!("test case {} failed", failed.test_case_id)),
            ));
        }

        info!("Ran {} test case(s)", results.len());
        self.session.complete_stage(
            Stage::Test,
            StageData {
                test_results: Some(results.clone()),
                ..Default::default()
            },
        )?;
        Ok(results)
    }
}
