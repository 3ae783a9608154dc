//! Configuration DTOs

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::catalog::FlowId;
use crate::domain::environment::{Environment, Overrides};

/// Overrides for one flow inside a save request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowOverrides {
    pub iflow_id: FlowId,
    pub parameters: BTreeMap<String, String>,
}

/// Full override set for one environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveConfiguration {
    pub environment: Environment,
    pub entries: Vec<FlowOverrides>,
}

impl SaveConfiguration {
    pub fn from_overrides(environment: Environment, overrides: &Overrides) -> Self {
        Self {
            environment,
            entries: overrides
                .iter()
                .map(|(iflow_id, parameters)| FlowOverrides {
                    iflow_id: iflow_id.clone(),
                    parameters: parameters.clone(),
                })
                .collect(),
        }
    }
}
