//! OAuth client-credentials support
//!
//! Credentials are resolved per tenant through a [`CredentialProvider`] and
//! never stored by the client; only the short-lived access tokens are cached
//! in memory, keyed by tenant id.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use ferry_core::domain::tenant::Tenant;
use ferry_core::dto::auth::TokenResponse;
use reqwest::Client;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{ClientError, Result};

/// Tokens are treated as expired this long before the server says they are
pub const REFRESH_BUFFER_SECS: i64 = 300;

/// Client credentials for one tenant
#[derive(Clone)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
}

impl std::fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("token_url", &self.token_url)
            .finish()
    }
}

/// Supplies credentials for a tenant on demand
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn credentials(&self, tenant: &Tenant) -> Result<OAuthCredentials>;
}

/// Provider that hands out the same credentials for every tenant
pub struct StaticCredentials {
    credentials: OAuthCredentials,
}

impl StaticCredentials {
    pub fn new(credentials: OAuthCredentials) -> Self {
        Self { credentials }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn credentials(&self, _tenant: &Tenant) -> Result<OAuthCredentials> {
        Ok(self.credentials.clone())
    }
}

/// A cached bearer token
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub value: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn from_response(response: TokenResponse, now: DateTime<Utc>) -> Self {
        Self {
            value: response.access_token,
            token_type: response.token_type,
            expires_at: now + Duration::seconds(response.expires_in as i64),
        }
    }

    /// Whether the token can still be used at `now`, honouring the refresh buffer
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at - Duration::seconds(REFRESH_BUFFER_SECS)
    }

    pub fn header_value(&self) -> String {
        format!("{} {}", self.token_type, self.value)
    }
}

/// Per-tenant token cache
#[derive(Default)]
pub(crate) struct TokenCache {
    tokens: Mutex<HashMap<String, AccessToken>>,
}

impl TokenCache {
    /// Returns a fresh token for the tenant, requesting one when needed
    pub(crate) async fn token(
        &self,
        http: &Client,
        provider: &dyn CredentialProvider,
        tenant: &Tenant,
        force_refresh: bool,
    ) -> Result<AccessToken> {
        // Held across the token request so concurrent callers share one refresh
        let mut tokens = self.tokens.lock().await;

        if !force_refresh {
            if let Some(token) = tokens.get(&tenant.id) {
                if token.is_fresh(Utc::now()) {
                    return Ok(token.clone());
                }
                debug!("Cached token for tenant {} is about to expire", tenant.id);
            }
        }

        let credentials = provider.credentials(tenant).await?;
        let token = request_token(http, &credentials).await?;
        info!("Obtained access token for tenant {}", tenant.id);

        tokens.insert(tenant.id.clone(), token.clone());
        Ok(token)
    }

    pub(crate) async fn invalidate(&self, tenant_id: &str) {
        self.tokens.lock().await.remove(tenant_id);
    }
}

async fn request_token(http: &Client, credentials: &OAuthCredentials) -> Result<AccessToken> {
    let response = http
        .post(&credentials.token_url)
        .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
        .form(&[("grant_type", "client_credentials")])
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ClientError::AuthenticationFailed(format!(
            "token request failed: {} - {}",
            status, body
        )));
    }

    let body: TokenResponse = response
        .json()
        .await
        .map_err(|e| ClientError::ParseError(format!("Failed to parse token response: {}", e)))?;

    Ok(AccessToken::from_response(body, Utc::now()))
}
