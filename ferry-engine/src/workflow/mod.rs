//! Background workflows
//!
//! Templates, the execution store, step work and the engine that ties them
//! together. Workflows run independently of the eight-stage pipeline.

pub mod engine;
pub mod history;
pub mod steps;
pub mod store;
pub mod templates;

pub use engine::WorkflowEngine;
pub use history::{HistorySink, InMemoryHistory, TracingHistory};
pub use steps::{ServiceSteps, StepContext, StepExecutor, StepOutcome};
pub use store::ExecutionStore;
pub use templates::{catalog, parse_workflow_type, template};
