//! Service layer
//!
//! Stateful services that sit between the pipeline/workflow layers and the
//! external artifact service: the per-environment configuration store and
//! the dependency risk scorer. Every external call goes through
//! [`call::bounded`].

pub mod call;
pub mod configuration;
pub mod dependency;

pub use configuration::{
    AutosaveEvent, AutosaveHandle, ConfigurationStore, FlowParameters, SwitchOutcome,
    SwitchPolicy,
};
pub use dependency::{DependencyScorer, RiskPolicy};
