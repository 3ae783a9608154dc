//! Pipeline domain types
//!
//! The eight-stage deployment wizard: stage identities, the typed payload
//! each stage produces, and the snapshot handed to the presentation layer.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::domain::catalog::{FlowId, PackageId};
use crate::domain::dependency::DependencyAnalysis;
use crate::domain::environment::{Environment, EnvironmentConfig, ValidationReport};
use crate::domain::transport::{DeploymentResult, TestResult, UploadResult};

/// One stage of the linear pipeline, numbered 1 through 8
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Stage {
    PackageSelection = 1,
    FlowSelection = 2,
    Configuration = 3,
    Validation = 4,
    DependencyAnalysis = 5,
    Upload = 6,
    Deploy = 7,
    Test = 8,
}

impl Stage {
    /// All stages in pipeline order
    pub const ALL: [Stage; 8] = [
        Stage::PackageSelection,
        Stage::FlowSelection,
        Stage::Configuration,
        Stage::Validation,
        Stage::DependencyAnalysis,
        Stage::Upload,
        Stage::Deploy,
        Stage::Test,
    ];

    pub fn number(&self) -> u8 {
        *self as u8
    }

    pub fn name(&self) -> &'static str {
        match self {
            Stage::PackageSelection => "Package Selection",
            Stage::FlowSelection => "iFlow Selection",
            Stage::Configuration => "Configuration",
            Stage::Validation => "Validation",
            Stage::DependencyAnalysis => "Dependency Analysis",
            Stage::Upload => "Upload",
            Stage::Deploy => "Deploy",
            Stage::Test => "Test",
        }
    }

    /// The following stage, or `None` for the last one
    pub fn next(&self) -> Option<Stage> {
        Stage::try_from(self.number() + 1).ok()
    }

    /// Stages that come before this one
    pub fn upstream(&self) -> impl Iterator<Item = Stage> + '_ {
        Stage::ALL.into_iter().filter(move |stage| stage < self)
    }

    /// The single accumulated-data field this stage produces
    pub fn output_field(&self) -> StageField {
        match self {
            Stage::PackageSelection => StageField::SelectedPackages,
            Stage::FlowSelection => StageField::SelectedFlows,
            Stage::Configuration => StageField::Configurations,
            Stage::Validation => StageField::ValidationResults,
            Stage::DependencyAnalysis => StageField::DependencyResults,
            Stage::Upload => StageField::UploadResults,
            Stage::Deploy => StageField::DeploymentResults,
            Stage::Test => StageField::TestResults,
        }
    }
}

impl From<Stage> for u8 {
    fn from(stage: Stage) -> Self {
        stage.number()
    }
}

impl TryFrom<u8> for Stage {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.number() == value)
            .ok_or_else(|| format!("stage {} is outside 1..=8", value))
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}. {}", self.number(), self.name())
    }
}

/// Top-level keys of the accumulated stage data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StageField {
    SelectedPackages,
    SelectedFlows,
    Configurations,
    ValidationResults,
    DependencyResults,
    UploadResults,
    DeploymentResults,
    TestResults,
}

impl std::fmt::Display for StageField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StageField::SelectedPackages => "selectedPackages",
            StageField::SelectedFlows => "selectedFlows",
            StageField::Configurations => "configurations",
            StageField::ValidationResults => "validationResults",
            StageField::DependencyResults => "dependencyResults",
            StageField::UploadResults => "uploadResults",
            StageField::DeploymentResults => "deploymentResults",
            StageField::TestResults => "testResults",
        };
        f.write_str(name)
    }
}

/// Union of per-stage outputs
///
/// An absent field means the owning stage has not produced it yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_packages: Option<BTreeSet<PackageId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_flows: Option<BTreeSet<FlowId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configurations: Option<BTreeMap<Environment, EnvironmentConfig>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_results: Option<ValidationReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependency_results: Option<BTreeMap<FlowId, DependencyAnalysis>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_results: Option<Vec<UploadResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_results: Option<Vec<DeploymentResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_results: Option<Vec<TestResult>>,
}

impl StageData {
    pub fn with_selected_packages<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<PackageId>,
    {
        Self {
            selected_packages: Some(ids.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    pub fn with_selected_flows<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<FlowId>,
    {
        Self {
            selected_flows: Some(ids.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    /// Whether the given top-level key is present
    pub fn has(&self, field: StageField) -> bool {
        match field {
            StageField::SelectedPackages => self.selected_packages.is_some(),
            StageField::SelectedFlows => self.selected_flows.is_some(),
            StageField::Configurations => self.configurations.is_some(),
            StageField::ValidationResults => self.validation_results.is_some(),
            StageField::DependencyResults => self.dependency_results.is_some(),
            StageField::UploadResults => self.upload_results.is_some(),
            StageField::DeploymentResults => self.deployment_results.is_some(),
            StageField::TestResults => self.test_results.is_some(),
        }
    }

    /// Top-level keys currently present
    pub fn fields(&self) -> BTreeSet<StageField> {
        Stage::ALL
            .iter()
            .map(Stage::output_field)
            .filter(|field| self.has(*field))
            .collect()
    }

    /// Shallow merge by top-level key: present keys in `other` replace ours,
    /// absent keys leave ours untouched.
    pub fn merge(&mut self, other: StageData) {
        fn take<T>(slot: &mut Option<T>, incoming: Option<T>) {
            if incoming.is_some() {
                *slot = incoming;
            }
        }

        take(&mut self.selected_packages, other.selected_packages);
        take(&mut self.selected_flows, other.selected_flows);
        take(&mut self.configurations, other.configurations);
        take(&mut self.validation_results, other.validation_results);
        take(&mut self.dependency_results, other.dependency_results);
        take(&mut self.upload_results, other.upload_results);
        take(&mut self.deployment_results, other.deployment_results);
        take(&mut self.test_results, other.test_results);
    }
}

/// Read-only copy of a pipeline session for rendering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Furthest stage reached
    pub current_stage: Stage,
    /// Stage the user is looking at; never past `current_stage`
    pub active_stage: Stage,
    pub completed_stages: BTreeSet<Stage>,
    /// Completed stages whose output predates an upstream edit
    pub stale_stages: BTreeSet<Stage>,
    pub data: StageData,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_numbering_round_trips_through_u8() {
        for stage in Stage::ALL {
            assert_eq!(Stage::try_from(stage.number()), Ok(stage));
        }
        assert!(Stage::try_from(0).is_err());
        assert!(Stage::try_from(9).is_err());
    }

    #[test]
    fn test_stage_next_stops_after_test() {
        assert_eq!(Stage::PackageSelection.next(), Some(Stage::FlowSelection));
        assert_eq!(Stage::Test.next(), None);
    }

    #[test]
    fn test_merge_keeps_existing_keys() {
        let mut data = StageData::with_selected_packages(["A", "B"]);
        data.merge(StageData::with_selected_flows(["X"]));

        assert_eq!(
            data.fields(),
            BTreeSet::from([StageField::SelectedPackages, StageField::SelectedFlows])
        );

        data.merge(StageData::with_selected_flows(["Y"]));
        assert_eq!(data.selected_flows, Some(BTreeSet::from(["Y".to_string()])));
        assert!(data.selected_packages.is_some());
    }

    #[test]
    fn test_stage_data_serializes_camel_case_keys() {
        let data = StageData::with_selected_packages(["A"]);
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json, serde_json::json!({ "selectedPackages": ["A"] }));
    }
}
