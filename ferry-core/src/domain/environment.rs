//! Environment and configuration domain types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::catalog::FlowId;

/// Parameter overrides for one environment: flow id -> (parameter key -> value)
pub type Overrides = BTreeMap<FlowId, BTreeMap<String, String>>;

/// A named deployment target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Testing,
    Staging,
    Production,
}

impl Environment {
    /// All environments in promotion order
    pub const ALL: [Environment; 4] = [
        Environment::Development,
        Environment::Testing,
        Environment::Staging,
        Environment::Production,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Testing => "testing",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "testing" | "test" => Ok(Environment::Testing),
            "staging" | "stage" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!("unknown environment '{}'", other)),
        }
    }
}

/// Parameter overrides recorded for one environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub environment: Environment,
    #[serde(default)]
    pub parameters: Overrides,
}

impl EnvironmentConfig {
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            parameters: Overrides::new(),
        }
    }

    /// Number of individual parameter overrides
    pub fn override_count(&self) -> usize {
        self.parameters.values().map(BTreeMap::len).sum()
    }
}

/// Outcome of checking configured values against parameter metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// True when no issue has error severity
    pub fn passed(&self) -> bool {
        !self
            .issues
            .iter()
            .any(|issue| issue.severity == IssueSeverity::Error)
    }

    pub fn error_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|issue| issue.severity == IssueSeverity::Error)
            .count()
    }

    pub fn extend(&mut self, other: ValidationReport) {
        self.issues.extend(other.issues);
    }
}

/// A single configuration problem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub iflow_id: FlowId,
    pub environment: Environment,
    pub parameter_key: Option<String>,
    pub severity: IssueSeverity,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IssueSeverity {
    Warning,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_parse_aliases() {
        assert_eq!("prod".parse::<Environment>(), Ok(Environment::Production));
        assert_eq!("Testing".parse::<Environment>(), Ok(Environment::Testing));
        assert!("qa".parse::<Environment>().is_err());
    }

    #[test]
    fn test_environment_serializes_lowercase() {
        let json = serde_json::to_string(&Environment::Staging).unwrap();
        assert_eq!(json, "\"staging\"");
    }

    #[test]
    fn test_report_passes_with_only_warnings() {
        let report = ValidationReport {
            issues: vec![ValidationIssue {
                iflow_id: "A".to_string(),
                environment: Environment::Development,
                parameter_key: Some("timeout".to_string()),
                severity: IssueSeverity::Warning,
                message: "value looks unusual".to_string(),
            }],
        };

        assert!(report.passed());
        assert_eq!(report.error_count(), 0);
    }
}
