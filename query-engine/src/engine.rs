use std::sync::Arc;

use tracing::info;

use crate::admission::AdmissionPipeline;
use crate::bigquery::BigQueryGateway;
use crate::catalog::Catalog;
use crate::config::WarehouseSettings;
use crate::domain::{Dataset, QueryRequest, QueryResult, Table, TableDetails};
use crate::error::QueryEngineError;
use crate::gateway::WarehouseGateway;
use crate::policy::Policy;

pub const HEALTH_OK: &str = "ok";

/// Entry point for every tool operation. Holds the read-only policy and the
/// shared gateway; cloning is cheap.
#[derive(Clone)]
pub struct WarehouseEngine {
    policy: Arc<Policy>,
    catalog: Arc<Catalog>,
    admission: Arc<AdmissionPipeline>,
}

impl WarehouseEngine {
    pub fn new(policy: Policy, gateway: Arc<dyn WarehouseGateway>) -> Self {
        let policy = Arc::new(policy);

        Self {
            catalog: Arc::new(Catalog::new(policy.clone(), gateway.clone())),
            admission: Arc::new(AdmissionPipeline::new(policy.clone(), gateway)),
            policy,
        }
    }

    /// Connects to BigQuery with ambient credentials and builds the policy.
    pub async fn connect(settings: WarehouseSettings) -> Result<Self, QueryEngineError> {
        info!("Initializing warehouse engine");

        let gateway = BigQueryGateway::connect(&settings).await?;
        let policy = settings.into_policy(gateway.project_id());

        info!(
            "Policy loaded: project '{}', datasets {:?}, max bytes billed {}",
            policy.project_id(),
            policy.allowed_datasets(),
            policy.max_bytes_billed()
        );

        Ok(Self::new(policy, Arc::new(gateway)))
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub async fn list_datasets(&self) -> Result<Vec<Dataset>, QueryEngineError> {
        self.catalog.list_datasets().await
    }

    pub fn get_allowed_datasets(&self) -> Vec<Dataset> {
        self.catalog.get_allowed_datasets()
    }

    pub async fn list_tables(
        &self,
        dataset_id: Option<&str>,
    ) -> Result<Vec<Table>, QueryEngineError> {
        self.catalog.list_tables(dataset_id).await
    }

    pub async fn describe_table(
        &self,
        dataset_id: &str,
        table_id: &str,
    ) -> Result<TableDetails, QueryEngineError> {
        self.catalog.describe_table(dataset_id, table_id).await
    }

    pub async fn execute_query(
        &self,
        query: &str,
        dry_run: bool,
    ) -> Result<QueryResult, QueryEngineError> {
        info!(
            "Executing query (dry_run: {}): {}",
            dry_run,
            query.split_whitespace().collect::<Vec<_>>().join(" ")
        );
        self.admission.run_query(query, dry_run).await
    }

    pub async fn execute_request(
        &self,
        request: &QueryRequest,
    ) -> Result<QueryResult, QueryEngineError> {
        self.execute_query(&request.query, request.dry_run).await
    }

    /// Liveness only; does not contact the warehouse.
    pub fn health_check(&self) -> &'static str {
        HEALTH_OK
    }
}
