use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, warn};

use crate::domain::{Dataset, Table, TableDetails};
use crate::error::{Operation, QueryEngineError, ResourceKind};
use crate::gateway::{GatewayError, WarehouseGateway};
use crate::policy::{DatasetAllowList, Policy, ALL_DATASETS};
use crate::projection;

/// Dataset and table discovery, filtered through the allow-list on every call.
pub struct Catalog {
    policy: Arc<Policy>,
    gateway: Arc<dyn WarehouseGateway>,
}

impl Catalog {
    pub fn new(policy: Arc<Policy>, gateway: Arc<dyn WarehouseGateway>) -> Self {
        Self { policy, gateway }
    }

    fn gateway_error(&self, operation: Operation, err: GatewayError) -> QueryEngineError {
        QueryEngineError::from_gateway(operation, self.policy.max_bytes_billed(), err)
    }

    pub async fn list_datasets(&self) -> Result<Vec<Dataset>, QueryEngineError> {
        let datasets = self
            .gateway
            .list_datasets()
            .await
            .map_err(|e| self.gateway_error(Operation::ListDatasets, e))?;

        let total = datasets.len();
        let allowed: Vec<Dataset> = datasets
            .into_iter()
            .filter(|dataset| self.policy.is_dataset_allowed(&dataset.dataset_id))
            .collect();

        info!("Returning {} of {} datasets", allowed.len(), total);
        Ok(allowed)
    }

    /// Never touches the warehouse.
    pub fn get_allowed_datasets(&self) -> Vec<Dataset> {
        match self.policy.allowed_datasets() {
            DatasetAllowList::Unrestricted => vec![Dataset::new(ALL_DATASETS)],
            DatasetAllowList::Restricted(datasets) => {
                datasets.iter().map(|id| Dataset::new(id.as_str())).collect()
            }
        }
    }

    pub async fn list_tables(
        &self,
        dataset_id: Option<&str>,
    ) -> Result<Vec<Table>, QueryEngineError> {
        match dataset_id {
            Some(dataset_id) => self.list_tables_in(dataset_id).await,
            None => self.list_all_tables().await,
        }
    }

    async fn list_tables_in(&self, dataset_id: &str) -> Result<Vec<Table>, QueryEngineError> {
        if !self.policy.is_dataset_allowed(dataset_id) {
            return Err(QueryEngineError::dataset_not_allowed(dataset_id));
        }

        let tables = self
            .gateway
            .list_tables(dataset_id)
            .await
            .map_err(|e| match e {
                GatewayError::NotFound { .. } => QueryEngineError::NotFound {
                    resource: ResourceKind::Dataset,
                    id: dataset_id.to_string(),
                },
                other => self.gateway_error(Operation::ListTables, other),
            })?;

        info!("Found {} tables in dataset '{}'", tables.len(), dataset_id);
        Ok(tables)
    }

    /// Union of the tables of every accessible dataset: the allow-list when
    /// restricted, the live catalog otherwise.
    async fn list_all_tables(&self) -> Result<Vec<Table>, QueryEngineError> {
        let dataset_ids: Vec<String> = match self.policy.allowed_datasets() {
            DatasetAllowList::Restricted(datasets) => datasets.iter().cloned().collect(),
            DatasetAllowList::Unrestricted => self
                .gateway
                .list_datasets()
                .await
                .map_err(|e| self.gateway_error(Operation::ListTables, e))?
                .into_iter()
                .map(|dataset| dataset.dataset_id)
                .collect(),
        };

        let listings = join_all(
            dataset_ids
                .iter()
                .map(|dataset_id| self.gateway.list_tables(dataset_id)),
        )
        .await;

        let mut seen = HashSet::new();
        let mut tables = Vec::new();
        for (dataset_id, listing) in dataset_ids.iter().zip(listings) {
            match listing {
                Ok(listed) => {
                    for table in listed {
                        if !self.policy.is_dataset_allowed(&table.dataset_id) {
                            continue;
                        }
                        if seen.insert((table.dataset_id.clone(), table.table_id.clone())) {
                            tables.push(table);
                        }
                    }
                }
                Err(GatewayError::NotFound { .. }) => {
                    warn!("Allowed dataset '{}' does not exist, skipping", dataset_id);
                }
                Err(e) => return Err(self.gateway_error(Operation::ListTables, e)),
            }
        }

        info!(
            "Found {} tables across {} datasets",
            tables.len(),
            dataset_ids.len()
        );
        Ok(tables)
    }

    pub async fn describe_table(
        &self,
        dataset_id: &str,
        table_id: &str,
    ) -> Result<TableDetails, QueryEngineError> {
        if !self.policy.is_dataset_allowed(dataset_id) {
            return Err(QueryEngineError::dataset_not_allowed(dataset_id));
        }

        let (stats, columns) = tokio::join!(
            self.gateway.query_table_metadata(dataset_id, table_id),
            self.gateway.query_column_metadata(dataset_id, table_id),
        );

        let table_not_found = || QueryEngineError::NotFound {
            resource: ResourceKind::Table,
            id: format!("{}.{}", dataset_id, table_id),
        };

        let stats = match stats {
            Ok(Some(stats)) => stats,
            Ok(None) | Err(GatewayError::NotFound { .. }) => return Err(table_not_found()),
            Err(e) => return Err(self.gateway_error(Operation::DescribeTable, e)),
        };
        let columns = columns.map_err(|e| match e {
            GatewayError::NotFound { .. } => table_not_found(),
            other => self.gateway_error(Operation::DescribeTable, other),
        })?;

        info!(
            "Described table '{}.{}' with {} columns",
            dataset_id,
            table_id,
            columns.len()
        );

        Ok(TableDetails {
            table_id: table_id.to_string(),
            dataset_id: dataset_id.to_string(),
            columns,
            row_count: stats.row_count,
            size_gbytes: stats.size_bytes.map(projection::gbytes),
            size_bytes: stats.size_bytes,
            created: stats.created,
            last_modified: stats.last_modified,
        })
    }
}
