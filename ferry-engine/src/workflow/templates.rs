//! Workflow template catalog
//!
//! Six fixed templates. Each step's kind is resolved here, once, so the
//! engine never dispatches on step ids.

use ferry_core::domain::workflow::{StepKind, StepTemplate, WorkflowTemplate, WorkflowType};

use crate::error::{FerryError, Result};

fn step(id: &str, name: &str, kind: StepKind) -> StepTemplate {
    StepTemplate {
        id: id.to_string(),
        name: name.to_string(),
        kind,
    }
}

/// Template for a workflow type
pub fn template(workflow_type: WorkflowType) -> WorkflowTemplate {
    let (name, description, category, estimated_duration, steps) = match workflow_type {
        WorkflowType::ExtractPackages => (
            "Extract Packages",
            "Export package descriptors with their iFlows",
            "extraction",
            "2-5 min",
            vec![
                step("connect", "Connect to tenant", StepKind::Connect),
                step("discover-packages", "Discover packages", StepKind::DiscoverPackages),
                step("export-packages", "Export packages", StepKind::ExportPackages),
                step("archive", "Create archive", StepKind::Archive),
            ],
        ),
        WorkflowType::ExtractIflows => (
            "Extract iFlows",
            "Export iFlow descriptors with their configuration",
            "extraction",
            "3-8 min",
            vec![
                step("connect", "Connect to tenant", StepKind::Connect),
                step("discover-iflows", "Discover iFlows", StepKind::DiscoverFlows),
                step("export-iflows", "Export iFlows", StepKind::ExportFlows),
                step("archive", "Create archive", StepKind::Archive),
            ],
        ),
        WorkflowType::ValidateConfig => (
            "Validate Configuration",
            "Check mandatory parameters and score dependency risk",
            "validation",
            "1-3 min",
            vec![
                step("connect", "Connect to tenant", StepKind::Connect),
                step("discover-iflows", "Discover iFlows", StepKind::DiscoverFlows),
                step(
                    "validate-configuration",
                    "Validate configuration",
                    StepKind::ValidateConfiguration,
                ),
                step(
                    "analyze-dependencies",
                    "Analyze dependencies",
                    StepKind::AnalyzeDependencies,
                ),
            ],
        ),
        WorkflowType::DeployArtifacts => (
            "Deploy Artifacts",
            "Validate, upload and deploy iFlows to the target environment",
            "deployment",
            "5-15 min",
            vec![
                step("connect", "Connect to tenant", StepKind::Connect),
                step(
                    "validate-configuration",
                    "Validate configuration",
                    StepKind::ValidateConfiguration,
                ),
                step("upload", "Upload artifacts", StepKind::UploadArtifacts),
                step("deploy", "Deploy artifacts", StepKind::DeployArtifacts),
            ],
        ),
        WorkflowType::FullPipeline => (
            "Full Pipeline",
            "Discovery through deployment and testing in one run",
            "deployment",
            "10-30 min",
            vec![
                step("connect", "Connect to tenant", StepKind::Connect),
                step("discover-packages", "Discover packages", StepKind::DiscoverPackages),
                step("discover-iflows", "Discover iFlows", StepKind::DiscoverFlows),
                step(
                    "validate-configuration",
                    "Validate configuration",
                    StepKind::ValidateConfiguration,
                ),
                step(
                    "analyze-dependencies",
                    "Analyze dependencies",
                    StepKind::AnalyzeDependencies,
                ),
                step("upload", "Upload artifacts", StepKind::UploadArtifacts),
                step("deploy", "Deploy artifacts", StepKind::DeployArtifacts),
                step("test", "Run tests", StepKind::RunTests),
            ],
        ),
        WorkflowType::BackupTenant => (
            "Backup Tenant",
            "Export every package and iFlow into one archive",
            "backup",
            "5-20 min",
            vec![
                step("connect", "Connect to tenant", StepKind::Connect),
                step("discover-packages", "Discover packages", StepKind::DiscoverPackages),
                step("discover-iflows", "Discover iFlows", StepKind::DiscoverFlows),
                step("export-packages", "Export packages", StepKind::ExportPackages),
                step("export-iflows", "Export iFlows", StepKind::ExportFlows),
                step("archive", "Create archive", StepKind::Archive),
            ],
        ),
    };

    WorkflowTemplate {
        workflow_type,
        name: name.to_string(),
        description: description.to_string(),
        category: category.to_string(),
        estimated_duration: estimated_duration.to_string(),
        steps,
    }
}

/// All templates, in catalog order
pub fn catalog() -> Vec<WorkflowTemplate> {
    WorkflowType::ALL.into_iter().map(template).collect()
}

/// Resolves a workflow name such as `backup-tenant`
pub fn parse_workflow_type(name: &str) -> Result<WorkflowType> {
    name.parse::<WorkflowType>()
        .map_err(FerryError::UnknownWorkflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_catalog_has_six_templates() {
        let templates = catalog();
        assert_eq!(templates.len(), 6);
        for template in &templates {
            assert!(!template.steps.is_empty(), "{}", template.name);
        }
    }

    #[test]
    fn test_step_ids_unique_within_template() {
        for template in catalog() {
            let ids: HashSet<&str> = template.steps.iter().map(|s| s.id.as_str()).collect();
            assert_eq!(ids.len(), template.steps.len(), "{}", template.name);
        }
    }

    #[test]
    fn test_full_pipeline_ends_with_tests() {
        let template = template(WorkflowType::FullPipeline);
        assert_eq!(template.steps.len(), 8);
        assert_eq!(template.steps[0].kind, StepKind::Connect);
        assert_eq!(template.steps[7].kind, StepKind::RunTests);
    }

    #[test]
    fn test_unknown_workflow_name() {
        assert_eq!(
            parse_workflow_type("validate-config").unwrap(),
            WorkflowType::ValidateConfig
        );
        let err = parse_workflow_type("restore-tenant").unwrap_err();
        assert!(matches!(err, FerryError::UnknownWorkflow(ref name) if name == "restore-tenant"));
        assert_eq!(err.category(), crate::error::ErrorCategory::Validation);
    }
}
