//! Dependency risk scorer
//!
//! Sorts the resources a flow declares into six fixed categories and derives
//! a risk tier from the number of critical dependencies (value mappings,
//! external services and ProcessDirect calls).

use ferry_client::ArtifactDirectory;
use ferry_core::domain::catalog::FlowRef;
use ferry_core::domain::dependency::{
    DependencyAnalysis, Resource, ResourceCategory, RiskLevel,
};
use ferry_core::domain::tenant::Tenant;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::Result;
use crate::service::call::bounded;

/// Thresholds that map a critical dependency count onto a risk tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiskPolicy {
    /// Counts strictly above this are high risk
    pub high_above: usize,
    /// Counts strictly above this (and not high) are medium risk
    pub medium_above: usize,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            high_above: 5,
            medium_above: 2,
        }
    }
}

impl RiskPolicy {
    pub fn level(&self, critical_count: usize) -> RiskLevel {
        if critical_count > self.high_above {
            RiskLevel::High
        } else if critical_count > self.medium_above {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// Maps a reported resource type onto its category
///
/// Matching ignores case and punctuation, so `Value Mapping`,
/// `value_mapping` and `ValueMapping` are the same type.
pub fn classify(resource_type: &str) -> ResourceCategory {
    let normalized: String = resource_type
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect();

    match normalized.as_str() {
        "valuemapping" | "valuemappings" | "vm" => ResourceCategory::ValueMappings,
        "groovy" | "groovyscript" | "groovyscripts" | "script" | "scriptcollection" => {
            ResourceCategory::GroovyScripts
        }
        "messagemapping" | "messagemappings" | "mmap" | "operationmapping" => {
            ResourceCategory::MessageMappings
        }
        "processdirect" => ResourceCategory::ProcessDirect,
        "externalservice" | "externalservices" | "http" | "https" | "odata" | "soap" | "rest"
        | "sftp" | "ftp" | "jdbc" | "mail" | "amqp" | "as2" | "successfactors" | "ariba" => {
            ResourceCategory::ExternalServices
        }
        _ => ResourceCategory::Other,
    }
}

/// Pure scoring of a resource listing
pub fn categorize(
    flow: &FlowRef,
    resources: Vec<Resource>,
    policy: &RiskPolicy,
) -> DependencyAnalysis {
    let mut analysis = DependencyAnalysis {
        iflow_id: flow.id.clone(),
        version: flow.version.clone(),
        value_mappings: Vec::new(),
        groovy_scripts: Vec::new(),
        message_mappings: Vec::new(),
        external_services: Vec::new(),
        process_direct: Vec::new(),
        other: Vec::new(),
        critical_dependency_count: 0,
        risk_level: RiskLevel::Low,
    };

    for resource in resources {
        let bucket = match classify(&resource.resource_type) {
            ResourceCategory::ValueMappings => &mut analysis.value_mappings,
            ResourceCategory::GroovyScripts => &mut analysis.groovy_scripts,
            ResourceCategory::MessageMappings => &mut analysis.message_mappings,
            ResourceCategory::ExternalServices => &mut analysis.external_services,
            ResourceCategory::ProcessDirect => &mut analysis.process_direct,
            ResourceCategory::Other => &mut analysis.other,
        };
        bucket.push(resource);
    }

    analysis.critical_dependency_count = analysis.external_services.len()
        + analysis.process_direct.len()
        + analysis.value_mappings.len();
    analysis.risk_level = policy.level(analysis.critical_dependency_count);
    analysis
}

/// Fetches resource listings and scores them
#[derive(Clone)]
pub struct DependencyScorer {
    directory: Arc<dyn ArtifactDirectory>,
    policy: RiskPolicy,
    read_timeout: Duration,
}

impl DependencyScorer {
    pub fn new(directory: Arc<dyn ArtifactDirectory>, policy: RiskPolicy) -> Self {
        Self {
            directory,
            policy,
            read_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Analyzes one flow version
    pub async fn analyze(&self, tenant: &Tenant, flow: &FlowRef) -> Result<DependencyAnalysis> {
        let resources = bounded(self.read_timeout, self.directory.resources(tenant, flow)).await?;
        debug!("Flow {} declares {} resource(s)", flow, resources.len());

        Ok(categorize(flow, resources, &self.policy))
    }
}
