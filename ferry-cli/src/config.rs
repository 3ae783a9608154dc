//! Configuration module
//!
//! Resolves the tenant, credentials and engine settings the commands run with.

use anyhow::{Context, Result};
use ferry_client::{OAuthCredentials, ServiceClient, StaticCredentials};
use ferry_core::domain::tenant::Tenant;
use ferry_engine::EngineConfig;
use std::sync::Arc;

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub engine: EngineConfig,
    pub tenant: Tenant,
    /// Present only when id, secret and token URL were all supplied
    pub credentials: Option<OAuthCredentials>,
}

impl Config {
    pub fn build(
        service_url: String,
        tenant_id: String,
        tenant_name: Option<String>,
        tenant_url: String,
        client_id: Option<String>,
        client_secret: Option<String>,
        token_url: Option<String>,
    ) -> Result<Self> {
        let engine = EngineConfig::new(service_url).with_env_overrides();
        engine.validate().context("Invalid engine configuration")?;

        let credentials = match (client_id, client_secret, token_url) {
            (Some(client_id), Some(client_secret), Some(token_url)) => Some(OAuthCredentials {
                client_id,
                client_secret,
                token_url,
            }),
            (None, None, None) => None,
            _ => anyhow::bail!(
                "FERRY_CLIENT_ID, FERRY_CLIENT_SECRET and FERRY_TOKEN_URL must be set together"
            ),
        };

        let name = tenant_name.unwrap_or_else(|| tenant_id.clone());
        Ok(Self {
            engine,
            tenant: Tenant::new(tenant_id, name, tenant_url),
            credentials,
        })
    }

    /// HTTP client for the artifact service, authenticated when credentials exist
    pub fn client(&self) -> Arc<ServiceClient> {
        let client = ServiceClient::new(self.engine.service_url.clone());
        let client = match &self.credentials {
            Some(credentials) => {
                client.with_credentials(Arc::new(StaticCredentials::new(credentials.clone())))
            }
            None => client,
        };
        Arc::new(client)
    }
}
