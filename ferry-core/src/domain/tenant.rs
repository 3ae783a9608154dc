//! Tenant domain model
//!
//! Identity of a managed tenant. Credentials are never part of this type;
//! they are resolved on demand by the connection provider.

use serde::{Deserialize, Serialize};

/// A registered tenant the artifact service operates on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    /// Unique identifier for the tenant
    pub id: String,

    /// Human-readable tenant name
    pub name: String,

    /// Base URL of the tenant's integration runtime
    pub base_url: String,
}

impl Tenant {
    pub fn new(id: impl Into<String>, name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            base_url: base_url.into(),
        }
    }
}

impl std::fmt::Display for Tenant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}
