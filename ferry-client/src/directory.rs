//! Directory (read) endpoints

use async_trait::async_trait;
use ferry_core::domain::catalog::{FlowRef, IFlow, Package, PackageId, Parameter};
use ferry_core::domain::dependency::Resource;
use ferry_core::domain::tenant::Tenant;
use ferry_core::dto::auth::ConnectionCheck;
use tracing::debug;

use crate::ServiceClient;
use crate::error::Result;
use crate::service::ArtifactDirectory;

#[async_trait]
impl ArtifactDirectory for ServiceClient {
    async fn check_connection(&self, tenant: &Tenant) -> Result<ConnectionCheck> {
        let url = self.tenant_url(tenant, "/connection");
        let response = self.send(tenant, |client| client.get(&url)).await?;

        self.handle_response(response).await
    }

    async fn packages(&self, tenant: &Tenant) -> Result<Vec<Package>> {
        let url = self.tenant_url(tenant, "/packages");
        debug!("Fetching packages from {}", url);
        let response = self.send(tenant, |client| client.get(&url)).await?;

        self.handle_response(response).await
    }

    async fn iflows(&self, tenant: &Tenant, package_ids: &[PackageId]) -> Result<Vec<IFlow>> {
        let url = self.tenant_url(tenant, "/iflows");
        let query: Vec<(&str, &str)> = package_ids
            .iter()
            .map(|id| ("package_id", id.as_str()))
            .collect();
        let response = self
            .send(tenant, |client| client.get(&url).query(&query))
            .await?;

        self.handle_response(response).await
    }

    async fn configuration(&self, tenant: &Tenant, flow: &FlowRef) -> Result<Vec<Parameter>> {
        let url = self.tenant_url(
            tenant,
            &format!("/iflows/{}/versions/{}/configuration", flow.id, flow.version),
        );
        let response = self.send(tenant, |client| client.get(&url)).await?;

        self.handle_response(response).await
    }

    async fn resources(&self, tenant: &Tenant, flow: &FlowRef) -> Result<Vec<Resource>> {
        let url = self.tenant_url(
            tenant,
            &format!("/iflows/{}/versions/{}/resources", flow.id, flow.version),
        );
        let response = self.send(tenant, |client| client.get(&url)).await?;

        self.handle_response(response).await
    }
}
