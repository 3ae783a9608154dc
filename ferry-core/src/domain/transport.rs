//! Transport outcome types
//!
//! Terminal per-artifact results reported by the artifact transport service
//! for upload, deploy and test requests.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::catalog::FlowId;
use crate::domain::environment::Environment;

/// Test case run for flows that have none configured
pub const DEFAULT_TEST_CASE: &str = "default";

/// Terminal status the transport service reports for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Success,
    Failure,
}

impl TransferStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, TransferStatus::Success)
    }
}

/// Result of uploading one flow version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResult {
    pub iflow_id: FlowId,
    pub version: String,
    pub status: TransferStatus,
    #[serde(default)]
    pub message: Option<String>,
}

/// Result of deploying one flow version to a runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentResult {
    pub iflow_id: FlowId,
    pub version: String,
    pub environment: Environment,
    pub deployment_id: String,
    #[serde(default)]
    pub runtime_id: Option<String>,
    pub status: TransferStatus,
    /// Token the request was sent with; replaying it must not redeploy
    pub idempotency_key: Uuid,
}

/// Result of running one test case against a deployed flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub iflow_id: FlowId,
    pub test_case_id: String,
    pub status: TransferStatus,
    pub execution_time_ms: u64,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}
