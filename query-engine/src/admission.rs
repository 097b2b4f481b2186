//! Query admission: every query is dry-run, classified and authorized before
//! anything is billed.
//!
//! ```text
//! Received -> DryRunValidated -> StatementAuthorized -> TablesAuthorized -> {DryRunOnly | Executing} -> Completed
//!     \_____________\___________________\____________________\__________________________\-> Rejected
//! ```
//!
//! Real execution is only reachable through an [`AdmittedQuery`], which can
//! only be produced by [`AdmissionPipeline::admit`] for the same SQL text.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::domain::{DryRunResult, QueryResult};
use crate::error::{Operation, PolicyViolation, QueryEngineError};
use crate::gateway::WarehouseGateway;
use crate::policy::Policy;
use crate::projection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionStage {
    Received,
    DryRunValidated,
    StatementAuthorized,
    TablesAuthorized,
    DryRunOnly,
    Executing,
    Completed,
    Rejected,
}

impl fmt::Display for AdmissionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AdmissionStage::Received => "received",
            AdmissionStage::DryRunValidated => "dry_run_validated",
            AdmissionStage::StatementAuthorized => "statement_authorized",
            AdmissionStage::TablesAuthorized => "tables_authorized",
            AdmissionStage::DryRunOnly => "dry_run_only",
            AdmissionStage::Executing => "executing",
            AdmissionStage::Completed => "completed",
            AdmissionStage::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// A query that passed dry-run validation and every policy check.
#[derive(Debug)]
pub struct AdmittedQuery<'q> {
    sql: &'q str,
    dry_run: DryRunResult,
}

impl AdmittedQuery<'_> {
    pub fn sql(&self) -> &str {
        self.sql
    }

    pub fn dry_run(&self) -> &DryRunResult {
        &self.dry_run
    }

    pub fn statement_type(&self) -> Option<&str> {
        self.dry_run.statement_type.as_deref()
    }
}

pub struct AdmissionPipeline {
    policy: Arc<Policy>,
    gateway: Arc<dyn WarehouseGateway>,
}

impl AdmissionPipeline {
    pub fn new(policy: Arc<Policy>, gateway: Arc<dyn WarehouseGateway>) -> Self {
        Self { policy, gateway }
    }

    /// Dry-runs `sql` and checks statement type and referenced datasets.
    pub async fn admit<'q>(&self, sql: &'q str) -> Result<AdmittedQuery<'q>, QueryEngineError> {
        debug!("Admission stage {}", AdmissionStage::Received);

        let dry_run = self
            .gateway
            .dry_run(sql, self.policy.max_bytes_billed())
            .await
            .map_err(|e| {
                warn!("Admission stage {}: dry run failed: {}", AdmissionStage::Rejected, e);
                QueryEngineError::from_gateway(Operation::DryRun, self.policy.max_bytes_billed(), e)
            })?;
        debug!(
            "Admission stage {}: {} bytes estimated",
            AdmissionStage::DryRunValidated,
            dry_run.bytes_processed
        );

        self.authorize_statement(&dry_run)?;
        debug!(
            "Admission stage {}: {:?}",
            AdmissionStage::StatementAuthorized,
            dry_run.statement_type
        );

        self.authorize_tables(&dry_run)?;
        debug!(
            "Admission stage {}: {} referenced tables",
            AdmissionStage::TablesAuthorized,
            dry_run.referenced_tables.len()
        );

        Ok(AdmittedQuery { sql, dry_run })
    }

    fn authorize_statement(&self, dry_run: &DryRunResult) -> Result<(), QueryEngineError> {
        let kind = dry_run.statement_type.as_deref().unwrap_or_default();
        if self.policy.is_statement_allowed(kind) {
            return Ok(());
        }

        let kind = if kind.is_empty() { "UNKNOWN" } else { kind };
        warn!(
            "Admission stage {}: statement type '{}' is not allowed",
            AdmissionStage::Rejected,
            kind
        );
        Err(PolicyViolation::StatementNotAllowed {
            kind: kind.to_string(),
            allowed: self.policy.allowed_statements_display(),
        }
        .into())
    }

    /// Rejects on the first referenced table, in dry-run order, whose dataset
    /// is outside the allow-list.
    fn authorize_tables(&self, dry_run: &DryRunResult) -> Result<(), QueryEngineError> {
        for table in &dry_run.referenced_tables {
            if let Err(dataset) = self.policy.check_table_reference(table) {
                warn!(
                    "Admission stage {}: referenced table {} is in dataset '{}' which is not allowed",
                    AdmissionStage::Rejected,
                    table.qualified_name(),
                    dataset
                );
                return Err(QueryEngineError::dataset_not_allowed(dataset));
            }
        }
        Ok(())
    }

    /// Bills the warehouse for a previously admitted query.
    pub async fn execute(&self, admitted: AdmittedQuery<'_>) -> Result<QueryResult, QueryEngineError> {
        debug!("Admission stage {}", AdmissionStage::Executing);

        let execution = self
            .gateway
            .execute(admitted.sql, self.policy.max_bytes_billed())
            .await
            .map_err(|e| {
                warn!("Admission stage {}: execution failed: {}", AdmissionStage::Rejected, e);
                QueryEngineError::from_gateway(
                    Operation::ExecuteQuery,
                    self.policy.max_bytes_billed(),
                    e,
                )
            })?;

        let result = projection::project_execution(&admitted.dry_run, execution);
        info!(
            "Admission stage {}: job {:?} returned {} rows, {} bytes processed",
            AdmissionStage::Completed,
            result.job_id,
            result.total_rows,
            result.bytes_processed
        );
        Ok(result)
    }

    /// Full pipeline for one query. `dry_run_requested` stops after admission.
    pub async fn run_query(
        &self,
        sql: &str,
        dry_run_requested: bool,
    ) -> Result<QueryResult, QueryEngineError> {
        let admitted = self.admit(sql).await?;

        if dry_run_requested {
            let result = projection::project_dry_run(admitted.dry_run());
            info!(
                "Admission stage {}: validated {:?}, {} bytes estimated",
                AdmissionStage::DryRunOnly,
                result.statement_type,
                result.bytes_processed
            );
            return Ok(result);
        }

        self.execute(admitted).await
    }
}
