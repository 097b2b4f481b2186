use std::fmt;

use thiserror::Error;

use crate::gateway::GatewayError;

#[derive(Error, Debug)]
pub enum QueryEngineError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Error {operation}: {message}")]
    Gateway { operation: Operation, message: String },

    #[error("{resource} not found: {id}")]
    NotFound { resource: ResourceKind, id: String },

    #[error(transparent)]
    PolicyViolation(#[from] PolicyViolation),

    #[error("Error {operation}: query exceeded the billing ceiling of {max_bytes_billed} bytes: {message}")]
    QuotaExceeded {
        operation: Operation,
        max_bytes_billed: u64,
        message: String,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyViolation {
    #[error("Statement type '{kind}' is not allowed. Allowed types are: {allowed}")]
    StatementNotAllowed { kind: String, allowed: String },

    #[error("Dataset {dataset} is not allowed.")]
    DatasetNotAllowed { dataset: String },
}

/// Catalog or query operation a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ListDatasets,
    ListTables,
    DescribeTable,
    DryRun,
    ExecuteQuery,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::ListDatasets => "list_datasets",
            Operation::ListTables => "list_tables",
            Operation::DescribeTable => "describe_table",
            Operation::DryRun => "dry_run",
            Operation::ExecuteQuery => "execute_query",
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Operation::ListDatasets => "listing datasets",
            Operation::ListTables => "listing tables",
            Operation::DescribeTable => "describing table",
            Operation::DryRun => "validating query",
            Operation::ExecuteQuery => "executing query",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceKind {
    Dataset,
    Table,
    /// A dataset, table or job named only by the warehouse's error message.
    Warehouse,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Dataset => "dataset",
            ResourceKind::Table => "table",
            ResourceKind::Warehouse => "resource",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Dataset => f.write_str("Dataset"),
            ResourceKind::Table => f.write_str("Table"),
            ResourceKind::Warehouse => f.write_str("Warehouse resource"),
        }
    }
}

impl QueryEngineError {
    pub fn configuration(message: impl Into<String>) -> Self {
        QueryEngineError::Configuration {
            message: message.into(),
        }
    }

    pub fn dataset_not_allowed(dataset: impl Into<String>) -> Self {
        PolicyViolation::DatasetNotAllowed {
            dataset: dataset.into(),
        }
        .into()
    }

    /// Normalises a gateway failure into the caller-facing taxonomy.
    pub fn from_gateway(operation: Operation, max_bytes_billed: u64, err: GatewayError) -> Self {
        match err {
            GatewayError::NotFound { message } => QueryEngineError::NotFound {
                resource: ResourceKind::Warehouse,
                id: message,
            },
            GatewayError::BytesBilledLimitExceeded { message } => {
                QueryEngineError::QuotaExceeded {
                    operation,
                    max_bytes_billed,
                    message,
                }
            }
            other => QueryEngineError::Gateway {
                operation,
                message: other.to_string(),
            },
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            QueryEngineError::Configuration { .. } => "configuration_error",
            QueryEngineError::Gateway { .. } => "gateway_error",
            QueryEngineError::NotFound { .. } => "not_found",
            QueryEngineError::PolicyViolation(PolicyViolation::StatementNotAllowed { .. }) => {
                "statement_not_allowed"
            }
            QueryEngineError::PolicyViolation(PolicyViolation::DatasetNotAllowed { .. }) => {
                "dataset_not_allowed"
            }
            QueryEngineError::QuotaExceeded { .. } => "quota_exceeded",
        }
    }
}

pub type Result<T> = std::result::Result<T, QueryEngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_failures_keep_the_operation_name() {
        let err = QueryEngineError::from_gateway(
            Operation::DryRun,
            1024,
            GatewayError::Api {
                status: 400,
                reason: "invalidQuery".to_string(),
                message: "Syntax error: Unexpected end of script".to_string(),
            },
        );

        assert_eq!(err.kind(), "gateway_error");
        let message = err.to_string();
        assert!(message.starts_with("Error validating query:"), "{message}");
        assert!(message.contains("Unexpected end of script"), "{message}");
    }

    #[test]
    fn billing_limit_becomes_quota_exceeded() {
        let err = QueryEngineError::from_gateway(
            Operation::ExecuteQuery,
            1024,
            GatewayError::BytesBilledLimitExceeded {
                message: "Query exceeded limit for bytes billed: 1024.".to_string(),
            },
        );

        match err {
            QueryEngineError::QuotaExceeded {
                operation,
                max_bytes_billed,
                ..
            } => {
                assert_eq!(operation, Operation::ExecuteQuery);
                assert_eq!(max_bytes_billed, 1024);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn policy_violations_name_the_offender() {
        let err = QueryEngineError::dataset_not_allowed("hr");
        assert_eq!(err.kind(), "dataset_not_allowed");
        assert_eq!(err.to_string(), "Dataset hr is not allowed.");
    }
}
