//! Workflow domain types
//!
//! Background workflows run outside the eight-stage pipeline. A workflow is
//! created from a template, executes its steps strictly in order and
//! accumulates artifacts and a structured log.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::catalog::{FlowId, PackageId};
use crate::domain::environment::Environment;
use crate::domain::log::LogEntry;
use crate::domain::tenant::Tenant;

/// Names of the workflow templates in the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkflowType {
    ExtractPackages,
    ExtractIflows,
    ValidateConfig,
    DeployArtifacts,
    FullPipeline,
    BackupTenant,
}

impl WorkflowType {
    pub const ALL: [WorkflowType; 6] = [
        WorkflowType::ExtractPackages,
        WorkflowType::ExtractIflows,
        WorkflowType::ValidateConfig,
        WorkflowType::DeployArtifacts,
        WorkflowType::FullPipeline,
        WorkflowType::BackupTenant,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowType::ExtractPackages => "extract-packages",
            WorkflowType::ExtractIflows => "extract-iflows",
            WorkflowType::ValidateConfig => "validate-config",
            WorkflowType::DeployArtifacts => "deploy-artifacts",
            WorkflowType::FullPipeline => "full-pipeline",
            WorkflowType::BackupTenant => "backup-tenant",
        }
    }
}

impl std::fmt::Display for WorkflowType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WorkflowType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WorkflowType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// Overall execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Cancelled
        )
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowStatus::Pending => write!(f, "Pending"),
            WorkflowStatus::Running => write!(f, "Running"),
            WorkflowStatus::Completed => write!(f, "Completed"),
            WorkflowStatus::Failed => write!(f, "Failed"),
            WorkflowStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Status of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// The unit of external work a step performs
///
/// Resolved once when a template is defined; the engine dispatches on the
/// variant, never on the step id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Verify the tenant is reachable and credentials are accepted
    Connect,
    /// List the tenant's packages
    DiscoverPackages,
    /// List the flows of the discovered or requested packages
    DiscoverFlows,
    /// Export package descriptors with their flows
    ExportPackages,
    /// Export flow descriptors with their configuration
    ExportFlows,
    /// Check mandatory parameters for the target environment
    ValidateConfiguration,
    /// Categorize resource dependencies and score risk
    AnalyzeDependencies,
    /// Upload flow versions to the transport service
    UploadArtifacts,
    /// Deploy uploaded flows to the target environment
    DeployArtifacts,
    /// Run test cases against deployed flows
    RunTests,
    /// Bundle the artifacts produced so far into a manifest
    Archive,
}

/// Static definition of one step in a template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepTemplate {
    pub id: String,
    pub name: String,
    pub kind: StepKind,
}

/// A named workflow with its ordered steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    pub workflow_type: WorkflowType,
    pub name: String,
    pub description: String,
    pub category: String,
    pub estimated_duration: String,
    pub steps: Vec<StepTemplate>,
}

/// Parameters a workflow is launched with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub workflow_type: WorkflowType,
    /// Packages to operate on; empty means every package on the tenant
    #[serde(default)]
    pub package_ids: Vec<PackageId>,
    /// Flows to operate on; empty means every flow of the selected packages
    #[serde(default)]
    pub iflow_ids: Vec<FlowId>,
    /// Target environment for validate/deploy steps
    #[serde(default)]
    pub environment: Option<Environment>,
    /// Test cases per flow; flows without an entry run the default case
    #[serde(default)]
    pub test_cases: BTreeMap<FlowId, Vec<String>>,
}

impl WorkflowConfig {
    pub fn new(workflow_type: WorkflowType) -> Self {
        Self {
            workflow_type,
            package_ids: Vec::new(),
            iflow_ids: Vec::new(),
            environment: None,
            test_cases: BTreeMap::new(),
        }
    }

    pub fn with_packages<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<PackageId>,
    {
        self.package_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_flows<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<FlowId>,
    {
        self.iflow_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }
}

/// Runtime state of one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: String,
    pub name: String,
    pub kind: StepKind,
    pub status: StepStatus,
    /// 0..=100
    pub progress: u8,
    pub start_time: Option<chrono::DateTime<chrono::Utc>>,
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
    pub error_message: Option<String>,
}

impl From<&StepTemplate> for WorkflowStep {
    fn from(template: &StepTemplate) -> Self {
        Self {
            id: template.id.clone(),
            name: template.name.clone(),
            kind: template.kind,
            status: StepStatus::Pending,
            progress: 0,
            start_time: None,
            end_time: None,
            error_message: None,
        }
    }
}

/// Kind of output a step produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    PackageExport,
    FlowExport,
    ValidationReport,
    DependencyReport,
    DeploymentRecord,
    TestReport,
    ArchiveManifest,
}

/// Something a step produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: Uuid,
    pub name: String,
    pub kind: ArtifactKind,
    pub step_id: String,
    pub size_bytes: u64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub content: serde_json::Value,
}

impl Artifact {
    /// Builds an artifact whose size is its serialized JSON length
    pub fn json(
        name: impl Into<String>,
        kind: ArtifactKind,
        step_id: impl Into<String>,
        content: serde_json::Value,
    ) -> Self {
        let size_bytes = serde_json::to_vec(&content)
            .map(|bytes| bytes.len() as u64)
            .unwrap_or_default();

        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            kind,
            step_id: step_id.into(),
            size_bytes,
            created_at: chrono::Utc::now(),
            content,
        }
    }
}

/// A single run of a workflow template against a tenant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: Uuid,
    pub tenant: Tenant,
    pub workflow_type: WorkflowType,
    pub config: WorkflowConfig,
    pub status: WorkflowStatus,
    pub steps: Vec<WorkflowStep>,
    pub artifacts: Vec<Artifact>,
    pub logs: Vec<LogEntry>,
    /// round(100 * completed steps / total steps)
    pub total_progress: u8,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Execution this one retries, if any
    pub retry_of: Option<Uuid>,
    /// First execution of the retry chain; equals `id` for a fresh run
    pub lineage: Uuid,
}

impl WorkflowExecution {
    /// Creates a pending execution with every step pending
    pub fn new(tenant: Tenant, config: WorkflowConfig, template: &WorkflowTemplate) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            tenant,
            workflow_type: template.workflow_type,
            config,
            status: WorkflowStatus::Pending,
            steps: template.steps.iter().map(WorkflowStep::from).collect(),
            artifacts: Vec::new(),
            logs: Vec::new(),
            total_progress: 0,
            created_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
            retry_of: None,
            lineage: id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn completed_step_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| step.status == StepStatus::Completed)
            .count()
    }

    /// Recomputes `total_progress` from fully completed steps only
    pub fn recompute_progress(&mut self) {
        let total = self.steps.len();
        self.total_progress = if total == 0 {
            100
        } else {
            ((100.0 * self.completed_step_count() as f64) / total as f64).round() as u8
        };
    }

    /// Currently running step, if any
    pub fn current_step(&self) -> Option<&WorkflowStep> {
        self.steps
            .iter()
            .find(|step| step.status == StepStatus::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(step_count: usize) -> WorkflowTemplate {
        WorkflowTemplate {
            workflow_type: WorkflowType::BackupTenant,
            name: "Backup".to_string(),
            description: String::new(),
            category: "backup".to_string(),
            estimated_duration: "1 min".to_string(),
            steps: (0..step_count)
                .map(|i| StepTemplate {
                    id: format!("step-{}", i),
                    name: format!("Step {}", i),
                    kind: StepKind::Connect,
                })
                .collect(),
        }
    }

    #[test]
    fn test_workflow_type_parse() {
        assert_eq!(
            "backup-tenant".parse::<WorkflowType>(),
            Ok(WorkflowType::BackupTenant)
        );
        assert!("restore-tenant".parse::<WorkflowType>().is_err());
    }

    #[test]
    fn test_progress_counts_completed_steps_only() {
        let tenant = Tenant::new("t1", "Sandbox", "https://tenant.example.com");
        let mut execution = WorkflowExecution::new(
            tenant,
            WorkflowConfig::new(WorkflowType::BackupTenant),
            &template(3),
        );

        execution.steps[0].status = StepStatus::Completed;
        execution.steps[1].status = StepStatus::Running;
        execution.steps[1].progress = 90;
        execution.recompute_progress();

        assert_eq!(execution.total_progress, 33);
        assert_eq!(execution.current_step().map(|s| s.id.as_str()), Some("step-1"));
    }

    #[test]
    fn test_new_execution_is_pending() {
        let tenant = Tenant::new("t1", "Sandbox", "https://tenant.example.com");
        let execution = WorkflowExecution::new(
            tenant,
            WorkflowConfig::new(WorkflowType::BackupTenant),
            &template(2),
        );

        assert_eq!(execution.status, WorkflowStatus::Pending);
        assert!(execution.steps.iter().all(|s| s.status == StepStatus::Pending));
        assert!(!execution.is_terminal());
    }

    #[test]
    fn test_json_artifact_size_matches_serialized_length() {
        let content = serde_json::json!({ "id": "A" });
        let artifact = Artifact::json("a.json", ArtifactKind::FlowExport, "export", content);
        assert_eq!(artifact.size_bytes, br#"{"id":"A"}"#.len() as u64);
    }
}
