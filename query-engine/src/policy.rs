use std::collections::BTreeSet;
use std::fmt;

use crate::domain::TableReference;

pub const DEFAULT_MAX_BYTES_BILLED: u64 = 1024 * 1024 * 1024;

/// Sentinel returned by `get_allowed_datasets` when every dataset is allowed.
pub const ALL_DATASETS: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetAllowList {
    Unrestricted,
    Restricted(BTreeSet<String>),
}

impl DatasetAllowList {
    pub fn restricted<I, S>(datasets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        DatasetAllowList::Restricted(datasets.into_iter().map(Into::into).collect())
    }
}

/// Statement category reported by a dry run, e.g. `SELECT` or `INSERT`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StatementKind(String);

impl StatementKind {
    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }

    pub fn select() -> Self {
        Self::new("SELECT")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Process-wide admission policy. Built once at startup and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    project_id: String,
    allowed_datasets: DatasetAllowList,
    max_bytes_billed: u64,
    allowed_statements: Vec<StatementKind>,
}

impl Policy {
    pub fn new(
        project_id: impl Into<String>,
        allowed_datasets: DatasetAllowList,
        max_bytes_billed: u64,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            allowed_datasets,
            max_bytes_billed,
            allowed_statements: vec![StatementKind::select()],
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn allowed_datasets(&self) -> &DatasetAllowList {
        &self.allowed_datasets
    }

    pub fn max_bytes_billed(&self) -> u64 {
        self.max_bytes_billed
    }

    pub fn is_dataset_allowed(&self, dataset_id: &str) -> bool {
        match &self.allowed_datasets {
            DatasetAllowList::Unrestricted => true,
            DatasetAllowList::Restricted(datasets) => datasets.contains(dataset_id),
        }
    }

    /// Checks a dry-run table reference by its dataset id, whatever project
    /// the table lives in. Returns the dataset to report on rejection.
    pub fn check_table_reference(&self, table: &TableReference) -> Result<(), String> {
        if self.is_dataset_allowed(&table.dataset_id) {
            Ok(())
        } else {
            Err(table.dataset_id.clone())
        }
    }

    pub fn is_statement_allowed(&self, kind: &str) -> bool {
        self.allowed_statements.iter().any(|k| k.as_str() == kind)
    }

    pub fn allowed_statements_display(&self) -> String {
        self.allowed_statements
            .iter()
            .map(StatementKind::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Dataset ids are letters, digits and underscores, up to 1024 characters.
pub fn is_valid_dataset_id(dataset_id: &str) -> bool {
    !dataset_id.is_empty()
        && dataset_id.len() <= 1024
        && dataset_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}
