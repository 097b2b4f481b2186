use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{ColumnDetails, Dataset, DryRunResult, ExecutionResult, Table, TableStats};

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Billing limit exceeded: {message}")]
    BytesBilledLimitExceeded { message: String },

    #[error("Warehouse API error ({status} {reason}): {message}")]
    Api {
        status: u16,
        reason: String,
        message: String,
    },

    #[error("Job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },

    #[error("HTTP client error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Authentication error: {0}")]
    Auth(#[from] gcp_auth::Error),

    #[error("Failed to decode warehouse response: {message}")]
    Decode { message: String },
}

/// Access to the remote warehouse. Implementations must be safe to share
/// across concurrent tool calls.
#[async_trait]
pub trait WarehouseGateway: Send + Sync {
    async fn list_datasets(&self) -> Result<Vec<Dataset>, GatewayError>;

    /// Fails with [`GatewayError::NotFound`] when the dataset does not exist.
    async fn list_tables(&self, dataset_id: &str) -> Result<Vec<Table>, GatewayError>;

    /// `None` when the information catalog has no record for the table.
    async fn query_table_metadata(
        &self,
        dataset_id: &str,
        table_id: &str,
    ) -> Result<Option<TableStats>, GatewayError>;

    async fn query_column_metadata(
        &self,
        dataset_id: &str,
        table_id: &str,
    ) -> Result<Vec<ColumnDetails>, GatewayError>;

    /// Validates `sql` without billing or side effects.
    async fn dry_run(&self, sql: &str, max_bytes_billed: u64)
        -> Result<DryRunResult, GatewayError>;

    /// Runs `sql` to completion. The warehouse aborts the job once it would
    /// bill more than `max_bytes_billed`.
    async fn execute(&self, sql: &str, max_bytes_billed: u64)
        -> Result<ExecutionResult, GatewayError>;
}
