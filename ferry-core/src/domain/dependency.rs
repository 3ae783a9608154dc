//! Dependency analysis domain types

use serde::{Deserialize, Serialize};

use crate::domain::catalog::FlowId;

/// A resource an integration flow declares a dependency on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    pub resource_type: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub size_bytes: Option<u64>,
}

/// The six fixed buckets resources are sorted into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceCategory {
    ValueMappings,
    GroovyScripts,
    MessageMappings,
    ExternalServices,
    ProcessDirect,
    Other,
}

impl ResourceCategory {
    /// Whether resources in this category count towards the risk score
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            ResourceCategory::ValueMappings
                | ResourceCategory::ExternalServices
                | ResourceCategory::ProcessDirect
        )
    }
}

/// Coarse classification of how many critical dependencies a flow has
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
        }
    }
}

/// Categorized dependencies of one flow version and the derived risk tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyAnalysis {
    pub iflow_id: FlowId,
    pub version: String,
    pub value_mappings: Vec<Resource>,
    pub groovy_scripts: Vec<Resource>,
    pub message_mappings: Vec<Resource>,
    pub external_services: Vec<Resource>,
    pub process_direct: Vec<Resource>,
    pub other: Vec<Resource>,
    pub critical_dependency_count: usize,
    pub risk_level: RiskLevel,
}

impl DependencyAnalysis {
    /// Resources in the given category
    pub fn category(&self, category: ResourceCategory) -> &[Resource] {
        match category {
            ResourceCategory::ValueMappings => &self.value_mappings,
            ResourceCategory::GroovyScripts => &self.groovy_scripts,
            ResourceCategory::MessageMappings => &self.message_mappings,
            ResourceCategory::ExternalServices => &self.external_services,
            ResourceCategory::ProcessDirect => &self.process_direct,
            ResourceCategory::Other => &self.other,
        }
    }

    pub fn total_resources(&self) -> usize {
        self.value_mappings.len()
            + self.groovy_scripts.len()
            + self.message_mappings.len()
            + self.external_services.len()
            + self.process_direct.len()
            + self.other.len()
    }
}
