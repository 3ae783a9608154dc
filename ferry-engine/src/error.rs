//! Error types for the Ferry engine
//!
//! Every failure the engine surfaces falls into one of four categories.
//! Errors coming from the artifact service are classified at the boundary
//! and never swallowed.

use ferry_client::ClientError;
use ferry_core::domain::pipeline::Stage;
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, FerryError>;

/// Coarse error taxonomy exposed to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// External service unreachable or too slow
    Connectivity,
    /// Local precondition or input rejected
    Validation,
    /// Unknown execution, tenant, package or flow
    NotFound,
    /// Navigation blocked or concurrent modification
    Conflict,
}

/// Errors raised by the engine
#[derive(Debug, Error)]
pub enum FerryError {
    /// External service unreachable, timed out, or failing
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// A stage was completed without its prerequisites or with foreign data
    #[error("Invalid stage {stage}: {reason}")]
    InvalidStage { stage: u8, reason: String },

    /// Workflow type not present in the template catalog
    #[error("Unknown workflow type: {0}")]
    UnknownWorkflow(String),

    /// Input or configuration rejected
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Requested entity does not exist
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Navigation to a stage that has not been reached yet
    #[error("Cannot navigate to {target}: current stage is {current}")]
    NavigationBlocked { target: Stage, current: Stage },

    /// Concurrent modification detected
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The transport service answered but reported a failed transfer
    #[error("{operation} of {iflow_id} failed: {message}")]
    Rejected {
        operation: &'static str,
        iflow_id: String,
        message: String,
    },
}

impl FerryError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn invalid_stage(stage: Stage, reason: impl Into<String>) -> Self {
        Self::InvalidStage {
            stage: stage.number(),
            reason: reason.into(),
        }
    }

    pub fn rejected(
        operation: &'static str,
        iflow_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Rejected {
            operation,
            iflow_id: iflow_id.into(),
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            FerryError::Connectivity(_) => ErrorCategory::Connectivity,
            FerryError::InvalidStage { .. }
            | FerryError::UnknownWorkflow(_)
            | FerryError::Validation(_)
            | FerryError::Rejected { .. } => ErrorCategory::Validation,
            FerryError::NotFound { .. } => ErrorCategory::NotFound,
            FerryError::NavigationBlocked { .. } | FerryError::Conflict(_) => {
                ErrorCategory::Conflict
            }
        }
    }
}

impl From<ClientError> for FerryError {
    fn from(err: ClientError) -> Self {
        if err.is_not_found() {
            return FerryError::not_found("Remote resource", err.to_string());
        }
        if err.is_connectivity() {
            return FerryError::Connectivity(err.to_string());
        }
        match err.status() {
            Some(409) => FerryError::Conflict(err.to_string()),
            _ if err.is_client_error() => FerryError::Validation(err.to_string()),
            _ => FerryError::Connectivity(err.to_string()),
        }
    }
}
