//! Ferry HTTP Client
//!
//! A type-safe HTTP client for the artifact directory and transport service.
//!
//! The [`ArtifactDirectory`] and [`ArtifactTransport`] traits describe the
//! service boundary the engine depends on; [`ServiceClient`] implements both
//! over JSON/HTTP and handles OAuth client-credentials tokens per tenant.
//!
//! # Example
//!
//! ```no_run
//! use ferry_client::{ArtifactDirectory, ServiceClient};
//! use ferry_core::domain::tenant::Tenant;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = ServiceClient::new("http://localhost:8000");
//!     let tenant = Tenant::new("sandbox", "Sandbox", "https://sandbox.example.com");
//!
//!     let packages = client.packages(&tenant).await?;
//!     println!("Found {} packages", packages.len());
//!     Ok(())
//! }
//! ```

pub mod auth;
mod directory;
pub mod error;
pub mod service;
mod transport;

// Re-export commonly used types
pub use auth::{CredentialProvider, OAuthCredentials, StaticCredentials};
pub use error::{ClientError, Result};
pub use service::{ArtifactDirectory, ArtifactTransport};

use ferry_core::domain::tenant::Tenant;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::auth::TokenCache;

/// Connect timeout applied by [`ServiceClient::new`]
///
/// No overall request timeout is set: callers bound each call with their own
/// read or write budget.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for the artifact service API
///
/// Endpoints are grouped per tenant under `/api/tenants/{tenant_id}`:
/// - Directory reads (packages, flows, configuration, resources)
/// - Transport writes (configuration, upload, deploy, test)
#[derive(Clone)]
pub struct ServiceClient {
    /// Base URL of the service (e.g., "http://localhost:8000")
    base_url: String,
    /// HTTP client instance
    client: Client,
    /// Optional credential source; without one requests are sent unauthenticated
    credentials: Option<Arc<dyn CredentialProvider>>,
    tokens: Arc<TokenCache>,
}

impl ServiceClient {
    /// Create a new service client with the default connect timeout
    ///
    /// # Example
    /// ```
    /// use ferry_client::ServiceClient;
    ///
    /// let client = ServiceClient::new("http://localhost:8000");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self::with_client(base_url, client)
    }

    /// Create a new service client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            credentials: None,
            tokens: Arc::new(TokenCache::default()),
        }
    }

    /// Authenticate requests with tokens obtained from `provider`
    pub fn with_credentials(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = Some(provider);
        self
    }

    /// Get the base URL of the service
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL of a tenant-scoped endpoint
    fn tenant_url(&self, tenant: &Tenant, path: &str) -> String {
        format!("{}/api/tenants/{}{}", self.base_url, tenant.id, path)
    }

    // =============================================================================
    // Request Dispatch
    // =============================================================================

    /// Sends a request built by `build`, attaching a bearer token when
    /// credentials are configured. A 401 forces one token refresh and retry.
    async fn send<F>(&self, tenant: &Tenant, build: F) -> Result<reqwest::Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let Some(provider) = &self.credentials else {
            return Ok(build(&self.client).send().await?);
        };

        let token = self
            .tokens
            .token(&self.client, provider.as_ref(), tenant, false)
            .await?;
        let response = build(&self.client)
            .header(reqwest::header::AUTHORIZATION, token.header_value())
            .send()
            .await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        warn!(
            "Received 401 for tenant {}, refreshing token and retrying",
            tenant.id
        );
        self.tokens.invalidate(&tenant.id).await;
        let token = self
            .tokens
            .token(&self.client, provider.as_ref(), tenant, true)
            .await?;

        Ok(build(&self.client)
            .header(reqwest::header::AUTHORIZATION, token.header_value())
            .send()
            .await?)
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Handle an API response and deserialize JSON
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Handle an API response that returns no content
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        Ok(())
    }
}

impl std::fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceClient")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.credentials.is_some())
            .finish()
    }
}
