//! Maps warehouse-native results onto the stable [`QueryResult`] shape.

use crate::domain::{DryRunResult, ExecutionResult, QueryResult, TableReference};

const BYTES_PER_GIB: f64 = (1u64 << 30) as f64;

/// The only place gigabytes are derived from bytes.
pub fn gbytes(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_GIB
}

pub fn qualified_names(tables: &[TableReference]) -> Vec<String> {
    tables.iter().map(TableReference::qualified_name).collect()
}

/// Validation-only result: no rows, no schema, dry-run accounting.
pub fn project_dry_run(dry_run: &DryRunResult) -> QueryResult {
    QueryResult {
        rows: Vec::new(),
        total_rows: 0,
        schemas: Vec::new(),
        bytes_processed: dry_run.bytes_processed,
        gbytes_processed: gbytes(dry_run.bytes_processed),
        job_id: dry_run.job_id.clone(),
        statement_type: dry_run.statement_type.clone(),
        referenced_tables: Some(qualified_names(&dry_run.referenced_tables)),
    }
}

/// Rows and schema come from the execution; byte accounting comes from the
/// execution job as well, never from the preceding dry run.
pub fn project_execution(dry_run: &DryRunResult, execution: ExecutionResult) -> QueryResult {
    QueryResult {
        total_rows: execution.rows.len() as u64,
        rows: execution.rows,
        schemas: execution.schema,
        bytes_processed: execution.bytes_processed,
        gbytes_processed: gbytes(execution.bytes_processed),
        job_id: execution.job_id,
        statement_type: dry_run.statement_type.clone(),
        referenced_tables: Some(qualified_names(&dry_run.referenced_tables)),
    }
}
