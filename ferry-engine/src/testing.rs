//! In-memory artifact service used by the engine's tests
//!
//! Operations are addressed by a key such as `packages`, `configuration:<flow>`
//! or `deploy:<flow>`; tests can make any of them fail, reject, or stall.

use async_trait::async_trait;
use ferry_client::{ArtifactDirectory, ArtifactTransport, ClientError, Result};
use ferry_core::domain::catalog::{FlowRef, IFlow, Package, PackageId, Parameter};
use ferry_core::domain::dependency::Resource;
use ferry_core::domain::tenant::Tenant;
use ferry_core::domain::transport::TransferStatus;
use ferry_core::dto::auth::ConnectionCheck;
use ferry_core::dto::configuration::SaveConfiguration;
use ferry_core::dto::transport::{DeployRequest, DeployResponse, TestResponse, UploadResponse};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
pub struct FakeService {
    packages: Vec<Package>,
    iflows: Vec<IFlow>,
    parameters: HashMap<String, Vec<Parameter>>,
    resources: HashMap<String, Vec<Resource>>,
    failures: Mutex<HashSet<String>>,
    rejections: Mutex<HashSet<String>>,
    delays: Mutex<HashMap<String, Duration>>,
    calls: Mutex<Vec<String>>,
    saved: Mutex<Vec<SaveConfiguration>>,
    deploys: Mutex<Vec<DeployRequest>>,
}

impl FakeService {
    pub fn tenant() -> Tenant {
        Tenant::new("sandbox", "Sandbox", "https://sandbox.example.com")
    }

    /// Two packages, three flows, a handful of parameters and resources
    pub fn sample() -> Arc<Self> {
        let package = |id: &str, count: u32| Package {
            id: id.to_string(),
            name: format!("{} Package", id),
            description: None,
            version: "1.0.0".to_string(),
            vendor: Some("Acme".to_string()),
            status: Some("Active".to_string()),
            last_modified: None,
            iflow_count: count,
        };
        let flow = |id: &str, package_id: &str| IFlow {
            id: id.to_string(),
            name: id.replace('_', " "),
            package_id: package_id.to_string(),
            version: "1.0.3".to_string(),
            status: Some("Active".to_string()),
            runtime: Some("cloud".to_string()),
            artifacts: Vec::new(),
        };
        let parameter = |key: &str, value: &str, data_type: &str, mandatory: bool| Parameter {
            key: key.to_string(),
            value: value.to_string(),
            data_type: data_type.to_string(),
            description: None,
            mandatory,
        };
        let resource = |name: &str, resource_type: &str| Resource {
            name: name.to_string(),
            resource_type: resource_type.to_string(),
            description: None,
            size_bytes: Some(512),
        };

        Arc::new(Self {
            packages: vec![package("Sales", 2), package("Finance", 1)],
            iflows: vec![
                flow("Orders_Inbound", "Sales"),
                flow("Invoice_Outbound", "Sales"),
                flow("Ledger_Sync", "Finance"),
            ],
            parameters: HashMap::from([
                (
                    "Orders_Inbound".to_string(),
                    vec![
                        parameter("Timeout", "30", "xsd:integer", true),
                        parameter("Endpoint", "", "xsd:string", true),
                        parameter("Debug", "false", "xsd:boolean", false),
                    ],
                ),
                (
                    "Invoice_Outbound".to_string(),
                    vec![parameter("Receiver", "ERP", "xsd:string", true)],
                ),
                ("Ledger_Sync".to_string(), Vec::new()),
            ]),
            resources: HashMap::from([
                (
                    "Orders_Inbound".to_string(),
                    vec![
                        resource("S4 OData", "ExternalService"),
                        resource("Pricing", "ProcessDirect"),
                        resource("Country Codes", "ValueMapping"),
                        resource("enrich.groovy", "GroovyScript"),
                    ],
                ),
                (
                    "Invoice_Outbound".to_string(),
                    vec![resource("Invoice to IDoc", "MessageMapping")],
                ),
            ]),
            ..Default::default()
        })
    }

    /// Makes the operation fail with a server error
    pub fn fail(&self, op: &str) {
        self.failures.lock().unwrap().insert(op.to_string());
    }

    pub fn heal(&self, op: &str) {
        self.failures.lock().unwrap().remove(op);
    }

    /// Makes a transport operation answer with a failure status
    pub fn reject(&self, op: &str) {
        self.rejections.lock().unwrap().insert(op.to_string());
    }

    /// Makes the operation sleep before answering
    pub fn stall(&self, op: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(op.to_string(), delay);
    }

    pub fn calls(&self, op: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == op).count()
    }

    pub fn saved(&self) -> Vec<SaveConfiguration> {
        self.saved.lock().unwrap().clone()
    }

    pub fn deploy_requests(&self) -> Vec<DeployRequest> {
        self.deploys.lock().unwrap().clone()
    }

    async fn enter(&self, op: &str) -> Result<()> {
        self.calls.lock().unwrap().push(op.to_string());

        let delay = self.delays.lock().unwrap().get(op).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failures.lock().unwrap().contains(op) {
            return Err(ClientError::api_error(503, format!("{} unavailable", op)));
        }
        Ok(())
    }

    fn status(&self, op: &str) -> TransferStatus {
        if self.rejections.lock().unwrap().contains(op) {
            TransferStatus::Failure
        } else {
            TransferStatus::Success
        }
    }
}

#[async_trait]
impl ArtifactDirectory for FakeService {
    async fn check_connection(&self, tenant: &Tenant) -> Result<ConnectionCheck> {
        self.enter("connection").await?;
        Ok(ConnectionCheck {
            success: true,
            message: format!("Connected to {}", tenant.name),
            details: None,
        })
    }

    async fn packages(&self, _tenant: &Tenant) -> Result<Vec<Package>> {
        self.enter("packages").await?;
        Ok(self.packages.clone())
    }

    async fn iflows(&self, _tenant: &Tenant, package_ids: &[PackageId]) -> Result<Vec<IFlow>> {
        self.enter("iflows").await?;
        Ok(self
            .iflows
            .iter()
            .filter(|flow| package_ids.contains(&flow.package_id))
            .cloned()
            .collect())
    }

    async fn configuration(&self, _tenant: &Tenant, flow: &FlowRef) -> Result<Vec<Parameter>> {
        self.enter(&format!("configuration:{}", flow.id)).await?;
        self.parameters
            .get(&flow.id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(flow.id.clone()))
    }

    async fn resources(&self, _tenant: &Tenant, flow: &FlowRef) -> Result<Vec<Resource>> {
        self.enter(&format!("resources:{}", flow.id)).await?;
        Ok(self.resources.get(&flow.id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl ArtifactTransport for FakeService {
    async fn save_configuration(
        &self,
        _tenant: &Tenant,
        request: &SaveConfiguration,
    ) -> Result<()> {
        self.enter(&format!("save:{}", request.environment)).await?;
        self.saved.lock().unwrap().push(request.clone());
        Ok(())
    }

    async fn upload(&self, _tenant: &Tenant, flow: &FlowRef) -> Result<UploadResponse> {
        let op = format!("upload:{}", flow.id);
        self.enter(&op).await?;
        Ok(UploadResponse {
            status: self.status(&op),
            message: Some(format!("{} uploaded", flow)),
        })
    }

    async fn deploy(
        &self,
        _tenant: &Tenant,
        flow: &FlowRef,
        request: &DeployRequest,
    ) -> Result<DeployResponse> {
        let op = format!("deploy:{}", flow.id);
        self.enter(&op).await?;
        self.deploys.lock().unwrap().push(request.clone());
        Ok(DeployResponse {
            deployment_id: format!("dep-{}", flow.id),
            runtime_id: Some("rt-1".to_string()),
            status: self.status(&op),
        })
    }

    async fn test(
        &self,
        _tenant: &Tenant,
        iflow_id: &str,
        test_case_id: &str,
    ) -> Result<TestResponse> {
        let op = format!("test:{}", iflow_id);
        self.enter(&op).await?;
        let status = self.status(&op);
        Ok(TestResponse {
            status,
            execution_time_ms: 42,
            result: status
                .is_success()
                .then(|| format!("{} passed", test_case_id)),
            error: (!status.is_success()).then(|| format!("{} failed", test_case_id)),
        })
    }
}
