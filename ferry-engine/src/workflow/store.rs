//! Execution store
//!
//! Owns every execution the engine has created. Each record lives in a
//! `watch` channel: the running task is the only writer of step state,
//! readers get clones.

use ferry_core::domain::log::{LogEntry, LogLevel};
use ferry_core::domain::workflow::WorkflowExecution;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::watch;
use uuid::Uuid;

use crate::error::{FerryError, Result};

/// Write side of one execution, held by its task
#[derive(Clone)]
pub struct ExecutionHandle {
    id: Uuid,
    state: Arc<watch::Sender<WorkflowExecution>>,
    cancel: Arc<AtomicBool>,
}

impl ExecutionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Applies a change and notifies subscribers
    pub fn update(&self, change: impl FnOnce(&mut WorkflowExecution)) {
        self.state.send_modify(change);
    }

    /// Applies a change that reports whether it modified anything; only
    /// modifications notify subscribers
    pub fn update_if(&self, change: impl FnOnce(&mut WorkflowExecution) -> bool) -> bool {
        self.state.send_if_modified(change)
    }

    pub fn snapshot(&self) -> WorkflowExecution {
        self.state.borrow().clone()
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

/// Explicit registry of executions, owned by the engine
#[derive(Default)]
pub struct ExecutionStore {
    entries: RwLock<HashMap<Uuid, ExecutionHandle>>,
}

impl ExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new execution and returns its write handle
    pub fn insert(&self, execution: WorkflowExecution) -> ExecutionHandle {
        let id = execution.id;
        let (state, _) = watch::channel(execution);
        let handle = ExecutionHandle {
            id,
            state: Arc::new(state),
            cancel: Arc::new(AtomicBool::new(false)),
        };
        self.entries.write().unwrap().insert(id, handle.clone());
        handle
    }

    pub fn get(&self, id: Uuid) -> Option<WorkflowExecution> {
        self.entries
            .read()
            .unwrap()
            .get(&id)
            .map(ExecutionHandle::snapshot)
    }

    pub fn subscribe(&self, id: Uuid) -> Option<watch::Receiver<WorkflowExecution>> {
        self.entries
            .read()
            .unwrap()
            .get(&id)
            .map(|handle| handle.state.subscribe())
    }

    /// Snapshots of all executions, oldest first
    pub fn list(&self) -> Vec<WorkflowExecution> {
        let mut executions: Vec<WorkflowExecution> = self
            .entries
            .read()
            .unwrap()
            .values()
            .map(ExecutionHandle::snapshot)
            .collect();
        executions.sort_by_key(|execution| execution.created_at);
        executions
    }

    /// Raises the cancel flag of a non-terminal execution
    ///
    /// Returns `false` when the execution already finished.
    pub fn request_cancel(&self, id: Uuid) -> Result<bool> {
        let handle = self
            .entries
            .read()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| FerryError::not_found("Execution", id.to_string()))?;

        let mut accepted = false;
        handle.update_if(|execution| {
            if execution.is_terminal() {
                return false;
            }
            accepted = true;
            if handle.cancel.swap(true, Ordering::SeqCst) {
                return false;
            }
            execution
                .logs
                .push(LogEntry::new(LogLevel::Warning, "Cancellation requested"));
            true
        });
        Ok(accepted)
    }
}
