//! Transport DTOs
//!
//! Request and response bodies for upload, deploy and test calls.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::environment::Environment;
use crate::domain::transport::TransferStatus;

/// Response to an upload request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub status: TransferStatus,
    #[serde(default)]
    pub message: Option<String>,
}

/// Request to deploy a flow version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployRequest {
    pub target_environment: Environment,
    /// Client-supplied token so a retried request is not deployed twice
    pub idempotency_key: Uuid,
}

/// Response to a deploy request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployResponse {
    pub deployment_id: String,
    #[serde(default)]
    pub runtime_id: Option<String>,
    pub status: TransferStatus,
}

/// Response to a test run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResponse {
    pub status: TransferStatus,
    pub execution_time_ms: u64,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}
