#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, Once};

use async_trait::async_trait;
use bigquery_query_engine::domain::{
    ColumnDetails, Dataset, DryRunResult, ExecutionResult, Table, TableReference, TableSchema,
    TableStats,
};
use bigquery_query_engine::{GatewayError, WarehouseGateway};
use serde_json::Value;

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .init();
    });
}

pub const PROJECT: &str = "proj";

/// Gateway calls in the order they were made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListDatasets,
    ListTables(String),
    TableMetadata(String, String),
    ColumnMetadata(String, String),
    DryRun(String),
    Execute { sql: String, max_bytes_billed: u64 },
}

#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    Rows(ExecutionResult),
    QuotaExceeded,
}

/// In-memory warehouse seeded per test.
#[derive(Default)]
pub struct FakeGateway {
    catalog: BTreeMap<String, Vec<String>>,
    stats: HashMap<(String, String), TableStats>,
    columns: HashMap<(String, String), Vec<ColumnDetails>>,
    dry_runs: HashMap<String, DryRunResult>,
    executions: HashMap<String, ExecutionOutcome>,
    calls: Mutex<Vec<Call>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dataset(mut self, dataset_id: &str, tables: &[&str]) -> Self {
        self.catalog.insert(
            dataset_id.to_string(),
            tables.iter().map(|t| t.to_string()).collect(),
        );
        self
    }

    pub fn with_table_stats(mut self, dataset_id: &str, table_id: &str, stats: TableStats) -> Self {
        self.stats
            .insert((dataset_id.to_string(), table_id.to_string()), stats);
        self
    }

    pub fn with_columns(
        mut self,
        dataset_id: &str,
        table_id: &str,
        columns: Vec<ColumnDetails>,
    ) -> Self {
        self.columns
            .insert((dataset_id.to_string(), table_id.to_string()), columns);
        self
    }

    /// Seeds the dry-run answer for `sql`; unseeded SQL fails validation.
    pub fn with_dry_run(
        mut self,
        sql: &str,
        statement_type: &str,
        referenced: &[(&str, &str, &str)],
        bytes_processed: u64,
    ) -> Self {
        self.dry_runs.insert(
            sql.to_string(),
            DryRunResult {
                statement_type: Some(statement_type.to_string()),
                referenced_tables: referenced
                    .iter()
                    .map(|(p, d, t)| TableReference::new(*p, *d, *t))
                    .collect(),
                bytes_processed,
                job_id: Some("dry_run_job".to_string()),
            },
        );
        self
    }

    pub fn with_execution(mut self, sql: &str, execution: ExecutionResult) -> Self {
        self.executions
            .insert(sql.to_string(), ExecutionOutcome::Rows(execution));
        self
    }

    pub fn with_quota_exceeded(mut self, sql: &str) -> Self {
        self.executions
            .insert(sql.to_string(), ExecutionOutcome::QuotaExceeded);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn execute_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, Call::Execute { .. }))
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl WarehouseGateway for FakeGateway {
    async fn list_datasets(&self) -> Result<Vec<Dataset>, GatewayError> {
        self.record(Call::ListDatasets);
        Ok(self.catalog.keys().map(|id| Dataset::new(id.as_str())).collect())
    }

    async fn list_tables(&self, dataset_id: &str) -> Result<Vec<Table>, GatewayError> {
        self.record(Call::ListTables(dataset_id.to_string()));
        match self.catalog.get(dataset_id) {
            Some(tables) => Ok(tables
                .iter()
                .map(|table_id| Table::new(dataset_id, table_id.as_str()))
                .collect()),
            None => Err(GatewayError::NotFound {
                message: format!("Dataset {}:{}", PROJECT, dataset_id),
            }),
        }
    }

    async fn query_table_metadata(
        &self,
        dataset_id: &str,
        table_id: &str,
    ) -> Result<Option<TableStats>, GatewayError> {
        self.record(Call::TableMetadata(
            dataset_id.to_string(),
            table_id.to_string(),
        ));
        Ok(self
            .stats
            .get(&(dataset_id.to_string(), table_id.to_string()))
            .cloned())
    }

    async fn query_column_metadata(
        &self,
        dataset_id: &str,
        table_id: &str,
    ) -> Result<Vec<ColumnDetails>, GatewayError> {
        self.record(Call::ColumnMetadata(
            dataset_id.to_string(),
            table_id.to_string(),
        ));
        Ok(self
            .columns
            .get(&(dataset_id.to_string(), table_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn dry_run(&self, sql: &str, _max_bytes_billed: u64) -> Result<DryRunResult, GatewayError> {
        self.record(Call::DryRun(sql.to_string()));
        self.dry_runs
            .get(sql)
            .cloned()
            .ok_or_else(|| GatewayError::Api {
                status: 400,
                reason: "invalidQuery".to_string(),
                message: format!("Syntax error in: {}", sql),
            })
    }

    async fn execute(
        &self,
        sql: &str,
        max_bytes_billed: u64,
    ) -> Result<ExecutionResult, GatewayError> {
        self.record(Call::Execute {
            sql: sql.to_string(),
            max_bytes_billed,
        });
        match self.executions.get(sql) {
            Some(ExecutionOutcome::Rows(execution)) => Ok(execution.clone()),
            Some(ExecutionOutcome::QuotaExceeded) => Err(GatewayError::BytesBilledLimitExceeded {
                message: format!("Query exceeded limit for bytes billed: {}.", max_bytes_billed),
            }),
            None => Ok(ExecutionResult {
                schema: Vec::new(),
                rows: Vec::new(),
                bytes_processed: 0,
                job_id: Some("execute_job".to_string()),
            }),
        }
    }
}

/// A decoded execution over nullable `(name, type)` columns. Rows are JSON
/// objects; anything else is dropped.
pub fn execution(columns: &[(&str, &str)], rows: Vec<Value>, bytes_processed: u64) -> ExecutionResult {
    ExecutionResult {
        schema: columns
            .iter()
            .map(|(name, field_type)| TableSchema {
                name: name.to_string(),
                field_type: field_type.to_string(),
                mode: Some("NULLABLE".to_string()),
                description: None,
            })
            .collect(),
        rows: rows
            .into_iter()
            .filter_map(|row| match row {
                Value::Object(row) => Some(row),
                _ => None,
            })
            .collect(),
        bytes_processed,
        job_id: Some("execute_job".to_string()),
    }
}

pub fn column(name: &str, data_type: &str) -> ColumnDetails {
    ColumnDetails {
        column_name: name.to_string(),
        is_nullable: "YES".to_string(),
        data_type: data_type.to_string(),
        is_partitioning_column: "NO".to_string(),
    }
}
