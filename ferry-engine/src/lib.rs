//! Ferry engine
//!
//! Pipeline session and driver, workflow engine, configuration store and
//! dependency risk scorer. External services are reached only through the
//! `ferry-client` traits.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod service;
pub mod workflow;

#[cfg(test)]
mod testing;

pub use config::EngineConfig;
pub use error::{ErrorCategory, FerryError, Result};
pub use pipeline::{PipelineDriver, PipelineSession};
pub use service::{ConfigurationStore, DependencyScorer, RiskPolicy, SwitchPolicy};
pub use workflow::WorkflowEngine;
