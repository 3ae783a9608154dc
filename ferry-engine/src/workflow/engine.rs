//! Workflow engine
//!
//! Runs workflow templates as background tasks, one tokio task per
//! execution. Steps run strictly in order; the first failure fails the
//! execution and leaves later steps pending. Cancellation is cooperative and
//! only observed between steps.

use ferry_client::{ArtifactDirectory, ArtifactTransport};
use ferry_core::domain::log::{LogEntry, LogLevel};
use ferry_core::domain::tenant::Tenant;
use ferry_core::domain::workflow::{
    StepStatus, WorkflowConfig, WorkflowExecution, WorkflowStatus, WorkflowTemplate,
};
use std::sync::Arc;
use tokio::sync::{Semaphore, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{FerryError, Result};
use crate::workflow::history::{HistorySink, TracingHistory};
use crate::workflow::steps::{ServiceSteps, StepContext, StepExecutor, StepScratch};
use crate::workflow::store::{ExecutionHandle, ExecutionStore};
use crate::workflow::templates;

/// Executes workflows and keeps track of every execution it started
pub struct WorkflowEngine {
    store: Arc<ExecutionStore>,
    steps: Arc<dyn StepExecutor>,
    history: Arc<dyn HistorySink>,
    permits: Arc<Semaphore>,
}

impl WorkflowEngine {
    /// Creates an engine running at most `max_parallel_workflows` executions at once
    pub fn new(steps: Arc<dyn StepExecutor>, config: &EngineConfig) -> Self {
        Self {
            store: Arc::new(ExecutionStore::new()),
            steps,
            history: Arc::new(TracingHistory),
            permits: Arc::new(Semaphore::new(config.max_parallel_workflows)),
        }
    }

    /// Engine whose steps call the given directory and transport services
    pub fn with_services(
        directory: Arc<dyn ArtifactDirectory>,
        transport: Arc<dyn ArtifactTransport>,
        config: &EngineConfig,
    ) -> Self {
        Self::new(
            Arc::new(ServiceSteps::new(directory, transport, config)),
            config,
        )
    }

    pub fn with_history(mut self, history: Arc<dyn HistorySink>) -> Self {
        self.history = history;
        self
    }

    pub fn list_templates(&self) -> Vec<WorkflowTemplate> {
        templates::catalog()
    }

    /// Creates a pending execution and starts it in the background
    ///
    /// Returns immediately with the initial snapshot.
    pub fn execute_workflow(
        &self,
        tenant: Tenant,
        config: WorkflowConfig,
    ) -> Result<WorkflowExecution> {
        self.start(tenant, config, None)
    }

    pub fn get_execution(&self, id: Uuid) -> Option<WorkflowExecution> {
        self.store.get(id)
    }

    /// Live view of an execution; every change publishes a new snapshot
    pub fn subscribe(&self, id: Uuid) -> Option<watch::Receiver<WorkflowExecution>> {
        self.store.subscribe(id)
    }

    pub fn list_executions(&self) -> Vec<WorkflowExecution> {
        self.store.list()
    }

    /// Requests cancellation at the next step boundary
    ///
    /// A no-op for finished executions.
    pub fn cancel_workflow(&self, id: Uuid) -> Result<()> {
        if self.store.request_cancel(id)? {
            info!("Cancellation requested for execution {}", id);
        } else {
            debug!("Execution {} already finished; cancel ignored", id);
        }
        Ok(())
    }

    /// Starts a fresh execution with the original's tenant and config
    pub fn retry_workflow(&self, id: Uuid) -> Result<WorkflowExecution> {
        let original = self
            .store
            .get(id)
            .ok_or_else(|| FerryError::not_found("Execution", id.to_string()))?;

        info!("Retrying execution {} ({})", id, original.workflow_type);
        self.start(original.tenant.clone(), original.config.clone(), Some(&original))
    }

    /// Waits until the execution reaches a terminal state
    pub async fn wait_for(&self, id: Uuid) -> Option<WorkflowExecution> {
        let mut rx = self.store.subscribe(id)?;
        let finished = rx.wait_for(|execution| execution.is_terminal()).await.ok()?;
        Some(finished.clone())
    }

    fn start(
        &self,
        tenant: Tenant,
        config: WorkflowConfig,
        original: Option<&WorkflowExecution>,
    ) -> Result<WorkflowExecution> {
        let template = templates::catalog()
            .into_iter()
            .find(|t| t.workflow_type == config.workflow_type)
            .ok_or_else(|| FerryError::UnknownWorkflow(config.workflow_type.to_string()))?;

        let mut execution = WorkflowExecution::new(tenant, config, &template);
        execution.logs.push(LogEntry::new(
            LogLevel::Info,
            format!("Queued {} on {}", template.name, execution.tenant),
        ));
        if let Some(original) = original {
            execution.retry_of = Some(original.id);
            execution.lineage = original.lineage;
            execution.logs.push(LogEntry::new(
                LogLevel::Info,
                format!("Retry of execution {}", original.id),
            ));
        }

        let handle = self.store.insert(execution);
        let snapshot = handle.snapshot();
        info!(
            "Created execution {} ({}, {} steps)",
            snapshot.id,
            snapshot.workflow_type,
            snapshot.steps.len()
        );

        let steps = Arc::clone(&self.steps);
        let history = Arc::clone(&self.history);
        let permits = Arc::clone(&self.permits);
        tokio::spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!("Execution {} could not be scheduled: {}", handle.id(), e);
                    return;
                }
            };
            let worker = tokio::spawn({
                let handle = handle.clone();
                async move { run_execution(&handle, steps.as_ref()).await }
            });
            if let Err(e) = worker.await {
                error!("Execution {} aborted: {}", handle.id(), e);
                abort(&handle, &e.to_string());
            }
            history.record(&handle.snapshot()).await;
        });

        Ok(snapshot)
    }
}

fn finish(handle: &ExecutionHandle, status: WorkflowStatus, entry: LogEntry) {
    handle.update(|execution| {
        execution.status = status;
        execution.completed_at = Some(chrono::Utc::now());
        execution.recompute_progress();
        execution.logs.push(entry);
    });
}

/// Fails an execution whose worker task died, including its running step
fn abort(handle: &ExecutionHandle, reason: &str) {
    let now = chrono::Utc::now();
    handle.update_if(|execution| {
        if execution.is_terminal() {
            return false;
        }
        for step in &mut execution.steps {
            if step.status == StepStatus::Running {
                step.status = StepStatus::Failed;
                step.end_time = Some(now);
                step.error_message = Some(reason.to_string());
            }
        }
        execution.status = WorkflowStatus::Failed;
        execution.completed_at = Some(now);
        execution.recompute_progress();
        execution.logs.push(LogEntry::new(
            LogLevel::Error,
            format!("Workflow aborted: {}", reason),
        ));
        true
    });
}

/// Drives one execution from pending to a terminal state
async fn run_execution(handle: &ExecutionHandle, steps: &dyn StepExecutor) {
    let id = handle.id();

    if handle.cancel_requested() {
        info!("Execution {} cancelled before it started", id);
        finish(
            handle,
            WorkflowStatus::Cancelled,
            LogEntry::new(LogLevel::Warning, "Workflow cancelled before start"),
        );
        return;
    }

    handle.update(|execution| {
        execution.status = WorkflowStatus::Running;
        execution.started_at = Some(chrono::Utc::now());
        execution
            .logs
            .push(LogEntry::new(LogLevel::Info, "Workflow started"));
    });
    info!("Execution {} started", id);

    let step_count = handle.snapshot().steps.len();
    let mut scratch = StepScratch::default();

    for index in 0..step_count {
        if handle.cancel_requested() {
            let name = handle.snapshot().steps[index].name.clone();
            info!("Execution {} cancelled before step {}", id, name);
            finish(
                handle,
                WorkflowStatus::Cancelled,
                LogEntry::new(
                    LogLevel::Warning,
                    format!("Workflow cancelled before step: {}", name),
                ),
            );
            return;
        }

        handle.update(|execution| {
            let step = &mut execution.steps[index];
            step.status = StepStatus::Running;
            step.start_time = Some(chrono::Utc::now());
            let entry = LogEntry::new(LogLevel::Info, format!("Starting step: {}", step.name))
                .for_step(step.id.clone());
            execution.logs.push(entry);
        });

        let snapshot = handle.snapshot();
        let step = snapshot.steps[index].clone();
        let progress = |value: u8| {
            handle.update(|execution| {
                let step = &mut execution.steps[index];
                step.progress = step.progress.max(value.min(99));
            });
        };
        let context = StepContext {
            execution: &snapshot,
            scratch: &mut scratch,
        };

        match steps.run(&step, context, &progress).await {
            Ok(outcome) => {
                debug!(
                    "Execution {} step {} produced {} artifact(s)",
                    id,
                    step.id,
                    outcome.artifacts.len()
                );
                handle.update(|execution| {
                    let current = &mut execution.steps[index];
                    current.status = StepStatus::Completed;
                    current.progress = 100;
                    current.end_time = Some(chrono::Utc::now());
                    execution.artifacts.extend(outcome.artifacts);
                    execution.logs.push(
                        LogEntry::new(
                            LogLevel::Info,
                            format!("Completed step: {} ({})", step.name, outcome.summary),
                        )
                        .for_step(step.id.clone()),
                    );
                    execution.recompute_progress();
                });
            }
            Err(e) => {
                warn!("Execution {} failed at step {}: {}", id, step.id, e);
                handle.update(|execution| {
                    let current = &mut execution.steps[index];
                    current.status = StepStatus::Failed;
                    current.end_time = Some(chrono::Utc::now());
                    current.error_message = Some(e.to_string());
                    execution.logs.push(
                        LogEntry::new(
                            LogLevel::Error,
                            format!("Step {} failed: {}", step.name, e),
                        )
                        .for_step(step.id.clone()),
                    );
                });
                finish(
                    handle,
                    WorkflowStatus::Failed,
                    LogEntry::new(LogLevel::Error, "Workflow failed"),
                );
                return;
            }
        }
    }

    info!("Execution {} completed", id);
    finish(
        handle,
        WorkflowStatus::Completed,
        LogEntry::new(LogLevel::Info, "Workflow completed"),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeService;
    use crate::workflow::history::InMemoryHistory;
    use crate::workflow::steps::{Progress, StepOutcome};
    use async_trait::async_trait;
    use ferry_core::domain::environment::Environment;
    use ferry_core::domain::workflow::{ArtifactKind, StepKind, WorkflowStep, WorkflowType};
    use std::time::Duration;

    fn config(max_parallel: usize) -> EngineConfig {
        let mut config = EngineConfig::default();
        config.max_parallel_workflows = max_parallel;
        config
    }

    fn engine(service: &Arc<FakeService>) -> WorkflowEngine {
        WorkflowEngine::with_services(service.clone(), service.clone(), &config(4))
    }

    fn deploy_invoice() -> WorkflowConfig {
        WorkflowConfig::new(WorkflowType::DeployArtifacts).with_flows(["Invoice_Outbound"])
    }

    async fn finished(engine: &WorkflowEngine, id: Uuid) -> WorkflowExecution {
        tokio::time::timeout(Duration::from_secs(5), engine.wait_for(id))
            .await
            .expect("execution did not finish")
            .expect("execution not found")
    }

    #[tokio::test]
    async fn test_execute_returns_pending_snapshot() {
        let service = FakeService::sample();
        service.stall("connection", Duration::from_millis(50));
        let engine = engine(&service);

        let execution = engine
            .execute_workflow(FakeService::tenant(), deploy_invoice())
            .unwrap();

        assert_eq!(execution.status, WorkflowStatus::Pending);
        assert!(execution.steps.iter().all(|s| s.status == StepStatus::Pending));
        assert_eq!(execution.total_progress, 0);
        assert!(engine.get_execution(execution.id).is_some());
    }

    #[tokio::test]
    async fn test_deploy_workflow_completes() {
        let service = FakeService::sample();
        let engine = engine(&service);

        let started = engine
            .execute_workflow(
                FakeService::tenant(),
                deploy_invoice().with_environment(Environment::Staging),
            )
            .unwrap();
        let execution = finished(&engine, started.id).await;

        assert_eq!(execution.status, WorkflowStatus::Completed);
        assert_eq!(execution.total_progress, 100);
        assert!(
            execution
                .steps
                .iter()
                .all(|s| s.status == StepStatus::Completed && s.progress == 100)
        );
        assert!(execution.started_at.is_some() && execution.completed_at.is_some());
        assert_eq!(service.deploy_requests().len(), 1);
        assert!(execution
            .artifacts
            .iter()
            .any(|a| a.name == "deployments-staging.json"));
    }

    #[tokio::test]
    async fn test_third_step_failure_fails_fast() {
        let service = FakeService::sample();
        service.fail("upload:Invoice_Outbound");
        let engine = engine(&service);

        let started = engine
            .execute_workflow(FakeService::tenant(), deploy_invoice())
            .unwrap();
        let execution = finished(&engine, started.id).await;

        assert_eq!(execution.status, WorkflowStatus::Failed);
        assert_eq!(execution.steps[0].status, StepStatus::Completed);
        assert_eq!(execution.steps[1].status, StepStatus::Completed);
        assert_eq!(execution.steps[2].status, StepStatus::Failed);
        assert!(!execution.steps[2].error_message.as_deref().unwrap_or("").is_empty());
        assert_eq!(execution.steps[3].status, StepStatus::Pending);
        assert!(execution.steps[3].start_time.is_none());
        assert_eq!(execution.total_progress, 50);
        assert_eq!(service.calls("deploy:Invoice_Outbound"), 0);
        assert!(execution.logs.iter().any(|l| l.level == LogLevel::Error));
    }

    #[tokio::test]
    async fn test_missing_mandatory_parameter_fails_validation_step() {
        let service = FakeService::sample();
        let engine = engine(&service);

        let started = engine
            .execute_workflow(
                FakeService::tenant(),
                WorkflowConfig::new(WorkflowType::ValidateConfig).with_packages(["Sales"]),
            )
            .unwrap();
        let execution = finished(&engine, started.id).await;

        assert_eq!(execution.status, WorkflowStatus::Failed);
        let failed = &execution.steps[2];
        assert_eq!(failed.status, StepStatus::Failed);
        assert!(failed.error_message.as_deref().unwrap().contains("Endpoint"));
    }

    #[tokio::test]
    async fn test_progress_never_decreases() {
        let service = FakeService::sample();
        service.stall("connection", Duration::from_millis(20));
        let engine = engine(&service);

        let started = engine
            .execute_workflow(
                FakeService::tenant(),
                WorkflowConfig::new(WorkflowType::BackupTenant),
            )
            .unwrap();
        let mut rx = engine.subscribe(started.id).unwrap();

        let mut seen = vec![rx.borrow_and_update().total_progress];
        loop {
            if rx.changed().await.is_err() {
                break;
            }
            let snapshot = rx.borrow_and_update().clone();
            seen.push(snapshot.total_progress);
            if snapshot.is_terminal() {
                break;
            }
        }

        assert!(seen.windows(2).all(|pair| pair[0] <= pair[1]), "{:?}", seen);
        assert_eq!(seen.last(), Some(&100));
    }

    #[tokio::test]
    async fn test_backup_archives_exports() {
        let service = FakeService::sample();
        let engine = engine(&service);

        let started = engine
            .execute_workflow(
                FakeService::tenant(),
                WorkflowConfig::new(WorkflowType::BackupTenant),
            )
            .unwrap();
        let execution = finished(&engine, started.id).await;

        assert_eq!(execution.status, WorkflowStatus::Completed);
        let count = |kind: ArtifactKind| execution.artifacts.iter().filter(|a| a.kind == kind).count();
        assert_eq!(count(ArtifactKind::PackageExport), 2);
        assert_eq!(count(ArtifactKind::FlowExport), 3);
        assert_eq!(count(ArtifactKind::ArchiveManifest), 1);

        let manifest = execution.artifacts.last().unwrap();
        assert_eq!(manifest.content["artifacts"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_full_pipeline_runs_every_step() {
        let service = FakeService::sample();
        let engine = engine(&service);

        let mut config = WorkflowConfig::new(WorkflowType::FullPipeline).with_packages(["Finance"]);
        config
            .test_cases
            .insert("Ledger_Sync".to_string(), vec!["smoke".to_string()]);
        let started = engine.execute_workflow(FakeService::tenant(), config).unwrap();
        let execution = finished(&engine, started.id).await;

        assert_eq!(execution.status, WorkflowStatus::Completed);
        assert_eq!(execution.steps.len(), 8);
        assert_eq!(service.calls("test:Ledger_Sync"), 1);
        assert!(execution
            .artifacts
            .iter()
            .any(|a| a.kind == ArtifactKind::TestReport));
    }

    #[tokio::test]
    async fn test_cancel_takes_effect_at_step_boundary() {
        let service = FakeService::sample();
        service.stall("connection", Duration::from_millis(150));
        let engine = engine(&service);

        let started = engine
            .execute_workflow(
                FakeService::tenant(),
                WorkflowConfig::new(WorkflowType::ExtractPackages),
            )
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        engine.cancel_workflow(started.id).unwrap();
        let execution = finished(&engine, started.id).await;

        assert_eq!(execution.status, WorkflowStatus::Cancelled);
        assert_eq!(execution.steps[0].status, StepStatus::Completed);
        assert!(execution.steps[1..].iter().all(|s| s.status == StepStatus::Pending));
        assert_eq!(service.calls("packages"), 0);
        assert_eq!(execution.total_progress, 25);
    }

    #[tokio::test]
    async fn test_cancel_finished_execution_is_noop() {
        let service = FakeService::sample();
        let engine = engine(&service);

        let started = engine
            .execute_workflow(FakeService::tenant(), deploy_invoice())
            .unwrap();
        let before = finished(&engine, started.id).await;

        engine.cancel_workflow(started.id).unwrap();
        assert_eq!(engine.get_execution(started.id), Some(before));
    }

    #[tokio::test]
    async fn test_unknown_ids() {
        let service = FakeService::sample();
        let engine = engine(&service);
        let id = Uuid::new_v4();

        assert!(engine.get_execution(id).is_none());
        assert!(engine.subscribe(id).is_none());
        assert!(matches!(
            engine.cancel_workflow(id),
            Err(FerryError::NotFound { .. })
        ));
        assert!(matches!(
            engine.retry_workflow(id),
            Err(FerryError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_retry_leaves_original_untouched() {
        let service = FakeService::sample();
        service.fail("upload:Invoice_Outbound");
        let engine = engine(&service);

        let started = engine
            .execute_workflow(FakeService::tenant(), deploy_invoice())
            .unwrap();
        let original = finished(&engine, started.id).await;
        assert_eq!(original.status, WorkflowStatus::Failed);

        service.heal("upload:Invoice_Outbound");
        let retried = engine.retry_workflow(original.id).unwrap();
        assert_ne!(retried.id, original.id);
        assert_eq!(retried.retry_of, Some(original.id));
        assert!(retried.steps.iter().all(|s| s.status == StepStatus::Pending));
        assert!(retried
            .logs
            .iter()
            .any(|l| l.message.contains(&original.id.to_string())));

        let retried = finished(&engine, retried.id).await;
        assert_eq!(retried.status, WorkflowStatus::Completed);

        let after = engine.get_execution(original.id).unwrap();
        assert_eq!(after.steps, original.steps);
        assert_eq!(after.logs, original.logs);
        assert_eq!(after.artifacts, original.artifacts);
        assert_eq!(engine.list_executions().len(), 2);
    }

    #[tokio::test]
    async fn test_parallel_limit_queues_executions() {
        let service = FakeService::sample();
        service.stall("connection", Duration::from_millis(150));
        let engine = WorkflowEngine::with_services(service.clone(), service.clone(), &config(1));

        let first = engine
            .execute_workflow(FakeService::tenant(), deploy_invoice())
            .unwrap();
        let second = engine
            .execute_workflow(FakeService::tenant(), deploy_invoice())
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(
            engine.get_execution(first.id).unwrap().status,
            WorkflowStatus::Running
        );
        assert_eq!(
            engine.get_execution(second.id).unwrap().status,
            WorkflowStatus::Pending
        );

        engine.cancel_workflow(second.id).unwrap();
        let second = finished(&engine, second.id).await;
        assert_eq!(second.status, WorkflowStatus::Cancelled);
        assert!(second.started_at.is_none());
        assert!(second.steps.iter().all(|s| s.status == StepStatus::Pending));
        assert_eq!(
            finished(&engine, first.id).await.status,
            WorkflowStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_history_receives_finished_executions() {
        let service = FakeService::sample();
        service.fail("connection");
        let history = InMemoryHistory::new();
        let engine = engine(&service).with_history(Arc::new(history.clone()));

        let started = engine
            .execute_workflow(FakeService::tenant(), deploy_invoice())
            .unwrap();
        finished(&engine, started.id).await;

        for _ in 0..50 {
            if !history.entries().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let entries = history.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, WorkflowStatus::Failed);
    }

    #[tokio::test]
    async fn test_extract_packages_exports_contained_flows() {
        let service = FakeService::sample();
        let engine = engine(&service);

        let started = engine
            .execute_workflow(
                FakeService::tenant(),
                WorkflowConfig::new(WorkflowType::ExtractPackages),
            )
            .unwrap();
        let execution = finished(&engine, started.id).await;

        assert_eq!(execution.status, WorkflowStatus::Completed);
        let sales = execution
            .artifacts
            .iter()
            .find(|a| a.name == "Sales.package.json")
            .unwrap();
        let flows = sales.content["iflows"].as_array().unwrap();
        assert_eq!(flows.len(), 2);
        let finance = execution
            .artifacts
            .iter()
            .find(|a| a.name == "Finance.package.json")
            .unwrap();
        assert_eq!(finance.content["iflows"][0]["id"], "Ledger_Sync");
    }

    #[tokio::test]
    async fn test_retried_deploy_reuses_idempotency_key() {
        let service = FakeService::sample();
        service.reject("deploy:Invoice_Outbound");
        let engine = engine(&service);

        let started = engine
            .execute_workflow(FakeService::tenant(), deploy_invoice())
            .unwrap();
        let original = finished(&engine, started.id).await;
        assert_eq!(original.status, WorkflowStatus::Failed);

        let retried = engine.retry_workflow(original.id).unwrap();
        assert_eq!(retried.lineage, original.id);
        let retried = finished(&engine, retried.id).await;
        let again = engine.retry_workflow(retried.id).unwrap();
        finished(&engine, again.id).await;

        let keys: Vec<Uuid> = service
            .deploy_requests()
            .iter()
            .map(|request| request.idempotency_key)
            .collect();
        assert_eq!(keys.len(), 3);
        assert!(keys.iter().all(|key| *key == keys[0]), "{:?}", keys);

        let other = engine
            .execute_workflow(FakeService::tenant(), deploy_invoice())
            .unwrap();
        finished(&engine, other.id).await;
        assert_ne!(service.deploy_requests()[3].idempotency_key, keys[0]);
    }

    /// Panics inside the second step
    struct PanickingSteps;

    #[async_trait]
    impl StepExecutor for PanickingSteps {
        async fn run(
            &self,
            step: &WorkflowStep,
            _context: StepContext<'_>,
            _progress: Progress<'_>,
        ) -> Result<StepOutcome> {
            if step.kind == StepKind::DiscoverPackages {
                panic!("directory listing blew up");
            }
            Ok(StepOutcome::summary("done"))
        }
    }

    #[tokio::test]
    async fn test_panicking_step_fails_execution() {
        let history = InMemoryHistory::new();
        let engine = WorkflowEngine::new(Arc::new(PanickingSteps), &config(2))
            .with_history(Arc::new(history.clone()));

        let started = engine
            .execute_workflow(
                FakeService::tenant(),
                WorkflowConfig::new(WorkflowType::ExtractPackages),
            )
            .unwrap();
        let execution = finished(&engine, started.id).await;

        assert_eq!(execution.status, WorkflowStatus::Failed);
        assert_eq!(execution.steps[0].status, StepStatus::Completed);
        assert_eq!(execution.steps[1].status, StepStatus::Failed);
        assert!(execution.steps[1].error_message.is_some());
        assert!(execution.steps[2..].iter().all(|s| s.status == StepStatus::Pending));
        assert_eq!(execution.total_progress, 25);

        for _ in 0..50 {
            if !history.entries().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(history.entries().len(), 1);
    }

    /// Reports progress in a few increments, then succeeds
    struct CountingSteps;

    #[async_trait]
    impl StepExecutor for CountingSteps {
        async fn run(
            &self,
            _step: &WorkflowStep,
            _context: StepContext<'_>,
            progress: Progress<'_>,
        ) -> Result<StepOutcome> {
            for value in [10, 60, 40, 100] {
                progress(value);
            }
            Ok(StepOutcome::summary("done"))
        }
    }

    #[tokio::test]
    async fn test_step_progress_is_capped_until_completion() {
        let engine = WorkflowEngine::new(Arc::new(CountingSteps), &config(2));
        let started = engine
            .execute_workflow(
                FakeService::tenant(),
                WorkflowConfig::new(WorkflowType::ExtractIflows),
            )
            .unwrap();
        let mut rx = engine.subscribe(started.id).unwrap();

        let mut step_progress = Vec::new();
        while rx.changed().await.is_ok() {
            let snapshot = rx.borrow_and_update().clone();
            step_progress.push(snapshot.steps[0].progress);
            if snapshot.is_terminal() {
                break;
            }
        }

        assert!(step_progress.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(step_progress.last(), Some(&100));
    }
}
