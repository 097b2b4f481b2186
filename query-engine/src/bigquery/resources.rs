//! BigQuery REST v2 resources, limited to the fields this crate reads or sends.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::domain::TableReference;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetList {
    #[serde(default)]
    pub datasets: Vec<DatasetListEntry>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetListEntry {
    pub dataset_reference: DatasetReference,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetReference {
    pub dataset_id: String,
    pub project_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableList {
    #[serde(default)]
    pub tables: Vec<TableListEntry>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableListEntry {
    pub table_reference: TableReference,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReference {
    pub project_id: String,
    pub job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInsert<'a> {
    pub job_reference: JobReference,
    pub configuration: JobConfiguration<'a>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfiguration<'a> {
    pub dry_run: bool,
    pub query: JobConfigurationQuery<'a>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfigurationQuery<'a> {
    pub query: &'a str,
    pub use_legacy_sql: bool,
    pub use_query_cache: bool,
    /// int64 values travel as JSON strings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum_bytes_billed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter_mode: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub query_parameters: Vec<QueryParameter>,
}

impl<'a> JobConfigurationQuery<'a> {
    pub fn new(query: &'a str) -> Self {
        Self {
            query,
            use_legacy_sql: false,
            use_query_cache: true,
            maximum_bytes_billed: None,
            parameter_mode: None,
            query_parameters: Vec::new(),
        }
    }

    pub fn with_max_bytes_billed(mut self, max_bytes_billed: u64) -> Self {
        self.maximum_bytes_billed = Some(max_bytes_billed.to_string());
        self
    }

    pub fn with_parameters(mut self, parameters: Vec<QueryParameter>) -> Self {
        if !parameters.is_empty() {
            self.parameter_mode = Some("NAMED");
        }
        self.query_parameters = parameters;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryParameter {
    pub name: String,
    pub parameter_type: QueryParameterType,
    pub parameter_value: QueryParameterValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryParameterType {
    #[serde(rename = "type")]
    pub param_type: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryParameterValue {
    pub value: String,
}

impl QueryParameter {
    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameter_type: QueryParameterType {
                param_type: "STRING",
            },
            parameter_value: QueryParameterValue {
                value: value.into(),
            },
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub job_reference: Option<JobReference>,
    pub statistics: Option<JobStatistics>,
    pub status: Option<JobStatus>,
}

impl Job {
    pub fn total_bytes_processed(&self) -> Option<i64> {
        let statistics = self.statistics.as_ref()?;
        statistics
            .query
            .as_ref()
            .and_then(|query| query.total_bytes_processed)
            .or(statistics.total_bytes_processed)
    }

    pub fn error_result(&self) -> Option<&ErrorProto> {
        self.status.as_ref()?.error_result.as_ref()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatistics {
    #[serde(default, deserialize_with = "opt_int64")]
    pub total_bytes_processed: Option<i64>,
    pub query: Option<JobStatisticsQuery>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatisticsQuery {
    #[serde(default, deserialize_with = "opt_int64")]
    pub total_bytes_processed: Option<i64>,
    pub statement_type: Option<String>,
    #[serde(default)]
    pub referenced_tables: Vec<TableReference>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub state: Option<String>,
    pub error_result: Option<ErrorProto>,
    #[serde(default)]
    pub errors: Vec<ErrorProto>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorProto {
    pub reason: Option<String>,
    pub location: Option<String>,
    pub message: Option<String>,
}

/// `{"error": {...}}` body returned with non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub code: Option<u16>,
    pub message: Option<String>,
    #[serde(default)]
    pub errors: Vec<ErrorProto>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetQueryResultsResponse {
    pub job_reference: Option<JobReference>,
    #[serde(default)]
    pub job_complete: bool,
    pub schema: Option<TableSchemaResource>,
    #[serde(default)]
    pub rows: Vec<TableRow>,
    pub page_token: Option<String>,
    #[serde(default, deserialize_with = "opt_int64")]
    pub total_rows: Option<i64>,
    #[serde(default, deserialize_with = "opt_int64")]
    pub total_bytes_processed: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TableSchemaResource {
    #[serde(default)]
    pub fields: Vec<TableFieldSchema>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableFieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub mode: Option<String>,
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<TableFieldSchema>,
}

impl TableFieldSchema {
    pub fn new(name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
            mode: None,
            description: None,
            fields: Vec::new(),
        }
    }

    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    pub fn with_fields(mut self, fields: Vec<TableFieldSchema>) -> Self {
        self.fields = fields;
        self
    }

    pub fn is_repeated(&self) -> bool {
        self.mode
            .as_deref()
            .is_some_and(|mode| mode.eq_ignore_ascii_case("REPEATED"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    #[serde(default)]
    pub f: Vec<TableCell>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableCell {
    #[serde(default)]
    pub v: Value,
}

impl TableRow {
    pub fn new(values: impl IntoIterator<Item = Value>) -> Self {
        Self {
            f: values.into_iter().map(|v| TableCell { v }).collect(),
        }
    }

    pub fn string_at(&self, index: usize) -> Option<String> {
        match self.f.get(index).map(|cell| &cell.v) {
            Some(Value::String(value)) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn int64_at(&self, index: usize) -> Option<i64> {
        match self.f.get(index).map(|cell| &cell.v) {
            Some(Value::String(value)) => value.parse().ok(),
            Some(Value::Number(value)) => value.as_i64(),
            _ => None,
        }
    }
}

/// int64 fields arrive as JSON strings, but accept plain numbers too.
fn opt_int64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Int64 {
        Number(i64),
        Text(String),
    }

    match Option::<Int64>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Int64::Number(value)) => Ok(Some(value)),
        Some(Int64::Text(text)) => text.parse().map(Some).map_err(serde::de::Error::custom),
    }
}
