//! Transport (write) endpoints

use async_trait::async_trait;
use ferry_core::domain::catalog::FlowRef;
use ferry_core::domain::tenant::Tenant;
use ferry_core::dto::configuration::SaveConfiguration;
use ferry_core::dto::transport::{DeployRequest, DeployResponse, TestResponse, UploadResponse};

use crate::ServiceClient;
use crate::error::Result;
use crate::service::ArtifactTransport;

/// Header carrying the deploy idempotency token
const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

#[async_trait]
impl ArtifactTransport for ServiceClient {
    async fn save_configuration(
        &self,
        tenant: &Tenant,
        request: &SaveConfiguration,
    ) -> Result<()> {
        let url = self.tenant_url(
            tenant,
            &format!("/configurations/{}", request.environment),
        );
        let response = self
            .send(tenant, |client| client.post(&url).json(request))
            .await?;

        self.handle_empty_response(response).await
    }

    async fn upload(&self, tenant: &Tenant, flow: &FlowRef) -> Result<UploadResponse> {
        let url = self.tenant_url(
            tenant,
            &format!("/iflows/{}/versions/{}/upload", flow.id, flow.version),
        );
        let response = self.send(tenant, |client| client.post(&url)).await?;

        self.handle_response(response).await
    }

    async fn deploy(
        &self,
        tenant: &Tenant,
        flow: &FlowRef,
        request: &DeployRequest,
    ) -> Result<DeployResponse> {
        let url = self.tenant_url(
            tenant,
            &format!("/iflows/{}/versions/{}/deploy", flow.id, flow.version),
        );
        let key = request.idempotency_key.to_string();
        let response = self
            .send(tenant, |client| {
                client
                    .post(&url)
                    .header(IDEMPOTENCY_HEADER, key.as_str())
                    .json(request)
            })
            .await?;

        self.handle_response(response).await
    }

    async fn test(
        &self,
        tenant: &Tenant,
        iflow_id: &str,
        test_case_id: &str,
    ) -> Result<TestResponse> {
        let url = self.tenant_url(tenant, &format!("/iflows/{}/tests/{}", iflow_id, test_case_id));
        let response = self.send(tenant, |client| client.post(&url)).await?;

        self.handle_response(response).await
    }
}
