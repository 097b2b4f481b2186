use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One result row, keyed by column name in schema order.
pub type Row = Map<String, Value>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Dataset {
    pub dataset_id: String,
}

impl Dataset {
    pub fn new(dataset_id: impl Into<String>) -> Self {
        Self {
            dataset_id: dataset_id.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Table {
    pub table_id: String,
    pub dataset_id: String,
}

impl Table {
    pub fn new(dataset_id: impl Into<String>, table_id: impl Into<String>) -> Self {
        Self {
            table_id: table_id.into(),
            dataset_id: dataset_id.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnDetails {
    pub column_name: String,
    pub is_nullable: String,
    pub data_type: String,
    pub is_partitioning_column: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableDetails {
    pub table_id: String,
    pub dataset_id: String,
    pub columns: Vec<ColumnDetails>,
    pub row_count: Option<i64>,
    pub size_bytes: Option<u64>,
    pub size_gbytes: Option<f64>,
    pub created: Option<String>,
    pub last_modified: Option<String>,
}

/// Table-level statistics from the warehouse's information catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableStats {
    pub row_count: Option<i64>,
    pub size_bytes: Option<u64>,
    pub created: Option<String>,
    pub last_modified: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub mode: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,
}

fn default_dry_run() -> bool {
    true
}

impl QueryRequest {
    /// Validation-only request.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            dry_run: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryResult {
    pub rows: Vec<Row>,
    pub total_rows: u64,
    pub schemas: Vec<TableSchema>,
    pub bytes_processed: u64,
    pub gbytes_processed: f64,
    pub job_id: Option<String>,
    pub statement_type: Option<String>,
    pub referenced_tables: Option<Vec<String>>,
}

/// Fully-qualified `project.dataset.table` reference reported by a dry run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct TableReference {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
}

impl TableReference {
    pub fn new(
        project_id: impl Into<String>,
        dataset_id: impl Into<String>,
        table_id: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            dataset_id: dataset_id.into(),
            table_id: table_id.into(),
        }
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}.{}", self.project_id, self.dataset_id, self.table_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DryRunResult {
    pub statement_type: Option<String>,
    pub referenced_tables: Vec<TableReference>,
    pub bytes_processed: u64,
    pub job_id: Option<String>,
}

/// Decoded output of a completed query job. Rows are already keyed by
/// column name in schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub schema: Vec<TableSchema>,
    pub rows: Vec<Row>,
    pub bytes_processed: u64,
    pub job_id: Option<String>,
}
