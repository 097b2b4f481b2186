use bigquery_query_engine::{PolicyViolation, QueryEngineError};
use rmcp::model::ErrorData;
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error(transparent)]
    Engine(#[from] QueryEngineError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<ServerError> for ErrorData {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::Engine(engine) => engine_error(&engine),
            other => ErrorData::internal_error(other.to_string(), None),
        }
    }
}

/// JSON-RPC error for a failed tool call. The `data` object names the kind
/// and the offending statement, dataset or resource.
pub fn engine_error(err: &QueryEngineError) -> ErrorData {
    let message = err.to_string();
    let data = error_data(err);

    match err {
        QueryEngineError::PolicyViolation(_) => ErrorData::invalid_params(message, Some(data)),
        QueryEngineError::NotFound { .. } => ErrorData::resource_not_found(message, Some(data)),
        _ => ErrorData::internal_error(message, Some(data)),
    }
}

fn error_data(err: &QueryEngineError) -> Value {
    let kind = err.kind();
    match err {
        QueryEngineError::Configuration { .. } => json!({ "kind": kind }),
        QueryEngineError::Gateway { operation, .. } => json!({
            "kind": kind,
            "operation": operation.as_str(),
        }),
        QueryEngineError::NotFound { resource, id } => json!({
            "kind": kind,
            "resource": resource.as_str(),
            "id": id,
        }),
        QueryEngineError::PolicyViolation(PolicyViolation::StatementNotAllowed { kind: statement, allowed }) => json!({
            "kind": kind,
            "statement_type": statement,
            "allowed": allowed,
        }),
        QueryEngineError::PolicyViolation(PolicyViolation::DatasetNotAllowed { dataset }) => json!({
            "kind": kind,
            "dataset": dataset,
        }),
        QueryEngineError::QuotaExceeded {
            operation,
            max_bytes_billed,
            ..
        } => json!({
            "kind": kind,
            "operation": operation.as_str(),
            "max_bytes_billed": max_bytes_billed,
        }),
    }
}
