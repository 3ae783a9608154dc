//! Catalog domain types
//!
//! Read-only views of what the artifact directory reports for a tenant:
//! packages, the integration flows inside them, and the configurable
//! parameters each flow declares.

use serde::{Deserialize, Serialize};

/// Identifier of an integration package
pub type PackageId = String;

/// Identifier of an integration flow (iFlow)
pub type FlowId = String;

/// Version marker the directory resolves to the currently active version
pub const ACTIVE_VERSION: &str = "active";

/// A named collection of integration flows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub id: PackageId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub last_modified: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub iflow_count: u32,
}

/// A deployable integration flow belonging to a package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IFlow {
    pub id: FlowId,
    pub name: String,
    pub package_id: PackageId,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub runtime: Option<String>,
    #[serde(default)]
    pub artifacts: Vec<String>,
}

impl IFlow {
    /// Reference to this exact flow version
    pub fn reference(&self) -> FlowRef {
        FlowRef::new(self.id.clone(), self.version.clone())
    }
}

/// A flow id pinned to a version
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FlowRef {
    pub id: FlowId,
    pub version: String,
}

impl FlowRef {
    pub fn new(id: impl Into<FlowId>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
        }
    }

    /// Reference to whatever version is currently active
    pub fn active(id: impl Into<FlowId>) -> Self {
        Self::new(id, ACTIVE_VERSION)
    }
}

impl std::fmt::Display for FlowRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.id, self.version)
    }
}

/// A configurable parameter declared by a flow, with its default value
///
/// Metadata is owned by the directory; the engine only stores override values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub key: String,
    /// Default value as declared by the flow
    #[serde(default)]
    pub value: String,
    #[serde(default = "default_data_type")]
    pub data_type: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub mandatory: bool,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

fn default_data_type() -> String {
    "xsd:string".to_string()
}
