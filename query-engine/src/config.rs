//! Warehouse configuration loaded from environment variables.

use crate::error::QueryEngineError;
use crate::policy::{
    is_valid_dataset_id, DatasetAllowList, Policy, ALL_DATASETS, DEFAULT_MAX_BYTES_BILLED,
};

pub const DEFAULT_API_ENDPOINT: &str = "https://bigquery.googleapis.com/bigquery/v2";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarehouseSettings {
    /// Empty means "resolve from the ambient credentials".
    pub project_id: Option<String>,
    pub allowed_datasets: DatasetAllowList,
    pub max_bytes_billed: u64,
    pub location: Option<String>,
    pub api_endpoint: String,
}

impl Default for WarehouseSettings {
    fn default() -> Self {
        Self {
            project_id: None,
            allowed_datasets: DatasetAllowList::Unrestricted,
            max_bytes_billed: DEFAULT_MAX_BYTES_BILLED,
            location: None,
            api_endpoint: DEFAULT_API_ENDPOINT.to_string(),
        }
    }
}

impl WarehouseSettings {
    pub fn from_lookup<F>(lookup: F) -> Result<Self, QueryEngineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let allowed_datasets = parse_allowed_datasets(lookup("BQ_ALLOWED_DATASETS").as_deref())?;

        let max_bytes_billed = match non_empty("BQ_MAX_BYTES_BILLED") {
            Some(raw) => parse_max_bytes_billed(&raw)?,
            None => DEFAULT_MAX_BYTES_BILLED,
        };

        let api_endpoint = match non_empty("BQ_API_ENDPOINT") {
            Some(raw) => {
                url::Url::parse(&raw).map_err(|e| {
                    QueryEngineError::configuration(format!(
                        "Invalid BQ_API_ENDPOINT '{}': {}",
                        raw, e
                    ))
                })?;
                raw.trim_end_matches('/').to_string()
            }
            None => DEFAULT_API_ENDPOINT.to_string(),
        };

        Ok(Self {
            project_id: non_empty("BQ_PROJECT_ID"),
            allowed_datasets,
            max_bytes_billed,
            location: non_empty("BQ_LOCATION"),
            api_endpoint,
        })
    }

    pub fn into_policy(self, project_id: impl Into<String>) -> Policy {
        Policy::new(project_id, self.allowed_datasets, self.max_bytes_billed)
    }
}

/// Empty, unset or `*` means unrestricted. Entries are bare dataset ids and
/// match that dataset in any project.
pub fn parse_allowed_datasets(raw: Option<&str>) -> Result<DatasetAllowList, QueryEngineError> {
    let raw = raw.map(str::trim).unwrap_or_default();
    if raw.is_empty() || raw == ALL_DATASETS {
        return Ok(DatasetAllowList::Unrestricted);
    }

    let datasets: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|dataset| !dataset.is_empty())
        .collect();

    if datasets.is_empty() {
        return Err(QueryEngineError::configuration(format!(
            "BQ_ALLOWED_DATASETS '{}' does not name any dataset",
            raw
        )));
    }

    if datasets.contains(&ALL_DATASETS) {
        return Err(QueryEngineError::configuration(format!(
            "BQ_ALLOWED_DATASETS '{}' mixes '*' with dataset names",
            raw
        )));
    }

    if let Some(invalid) = datasets.iter().find(|dataset| !is_valid_dataset_id(dataset)) {
        return Err(QueryEngineError::configuration(format!(
            "BQ_ALLOWED_DATASETS entry '{}' is not a dataset id; use bare dataset names such as 'sales'",
            invalid
        )));
    }

    Ok(DatasetAllowList::restricted(datasets))
}

fn parse_max_bytes_billed(raw: &str) -> Result<u64, QueryEngineError> {
    match raw.parse::<u64>() {
        Ok(0) => Err(QueryEngineError::configuration(
            "BQ_MAX_BYTES_BILLED must be greater than zero",
        )),
        Ok(value) => Ok(value),
        Err(e) => Err(QueryEngineError::configuration(format!(
            "Invalid BQ_MAX_BYTES_BILLED '{}': {}",
            raw, e
        ))),
    }
}
