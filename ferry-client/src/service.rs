//! Service traits
//!
//! The engine talks to the outside world only through these traits. The
//! HTTP [`ServiceClient`](crate::ServiceClient) implements both; tests plug in
//! in-memory fakes.

use async_trait::async_trait;
use ferry_core::domain::catalog::{FlowRef, IFlow, Package, PackageId, Parameter};
use ferry_core::domain::dependency::Resource;
use ferry_core::domain::tenant::Tenant;
use ferry_core::dto::auth::ConnectionCheck;
use ferry_core::dto::configuration::SaveConfiguration;
use ferry_core::dto::transport::{DeployRequest, DeployResponse, TestResponse, UploadResponse};

use crate::error::Result;

/// Read API: what exists on a tenant
#[async_trait]
pub trait ArtifactDirectory: Send + Sync {
    /// Verifies the tenant is reachable with the configured credentials
    async fn check_connection(&self, tenant: &Tenant) -> Result<ConnectionCheck>;

    /// Lists all integration packages
    async fn packages(&self, tenant: &Tenant) -> Result<Vec<Package>>;

    /// Lists the flows contained in the given packages
    async fn iflows(&self, tenant: &Tenant, package_ids: &[PackageId]) -> Result<Vec<IFlow>>;

    /// Parameter metadata and defaults of a flow version
    async fn configuration(&self, tenant: &Tenant, flow: &FlowRef) -> Result<Vec<Parameter>>;

    /// Flat list of resources a flow version depends on
    async fn resources(&self, tenant: &Tenant, flow: &FlowRef) -> Result<Vec<Resource>>;
}

/// Write API: moving artifacts and configuration onto a tenant
#[async_trait]
pub trait ArtifactTransport: Send + Sync {
    /// Stores the full override set for one environment
    async fn save_configuration(&self, tenant: &Tenant, request: &SaveConfiguration)
    -> Result<()>;

    /// Uploads a flow version
    async fn upload(&self, tenant: &Tenant, flow: &FlowRef) -> Result<UploadResponse>;

    /// Deploys a flow version; `request.idempotency_key` guards against double deploys
    async fn deploy(
        &self,
        tenant: &Tenant,
        flow: &FlowRef,
        request: &DeployRequest,
    ) -> Result<DeployResponse>;

    /// Runs one test case against a deployed flow
    async fn test(&self, tenant: &Tenant, iflow_id: &str, test_case_id: &str)
    -> Result<TestResponse>;
}
