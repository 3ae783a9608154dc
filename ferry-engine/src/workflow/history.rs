//! Execution history sinks
//!
//! Finished executions are handed to a sink exactly once. Storage behind
//! the sink is opaque to the engine.

use async_trait::async_trait;
use ferry_core::domain::workflow::WorkflowExecution;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Append-only destination for terminal executions
#[async_trait]
pub trait HistorySink: Send + Sync {
    async fn record(&self, execution: &WorkflowExecution);
}

/// Keeps finished executions in memory
#[derive(Clone, Default)]
pub struct InMemoryHistory {
    entries: Arc<Mutex<Vec<WorkflowExecution>>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<WorkflowExecution> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl HistorySink for InMemoryHistory {
    async fn record(&self, execution: &WorkflowExecution) {
        self.entries.lock().unwrap().push(execution.clone());
    }
}

/// Emits one summary line per finished execution
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingHistory;

#[async_trait]
impl HistorySink for TracingHistory {
    async fn record(&self, execution: &WorkflowExecution) {
        let duration = execution
            .started_at
            .zip(execution.completed_at)
            .map(|(start, end)| (end - start).num_milliseconds())
            .unwrap_or_default();

        info!(
            execution_id = %execution.id,
            tenant = %execution.tenant.id,
            workflow = %execution.workflow_type,
            status = %execution.status,
            artifacts = execution.artifacts.len(),
            duration_ms = duration,
            "Workflow finished"
        );
    }
}
