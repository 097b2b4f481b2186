//! [`WarehouseGateway`] backed by the BigQuery REST API.

mod client;
pub mod decode;
pub mod resources;

use std::sync::Arc;

use async_trait::async_trait;
use gcp_auth::TokenProvider;
use tracing::{debug, info};
use uuid::Uuid;

use self::client::{error_from_job, RestClient};
use self::resources::{
    DatasetList, GetQueryResultsResponse, Job, JobConfiguration, JobConfigurationQuery,
    JobInsert, JobReference, QueryParameter, TableFieldSchema, TableList, TableRow,
};
use crate::config::WarehouseSettings;
use crate::domain::{ColumnDetails, Dataset, DryRunResult, ExecutionResult, Table, TableStats};
use crate::error::QueryEngineError;
use crate::gateway::{GatewayError, WarehouseGateway};
use crate::policy::is_valid_dataset_id;

/// Server-side wait per `getQueryResults` call.
const RESULTS_TIMEOUT_MS: &str = "10000";

/// A finished job's rows as they came off the wire.
struct CompletedQuery {
    schema: Vec<TableFieldSchema>,
    rows: Vec<TableRow>,
    bytes_processed: u64,
    job_id: Option<String>,
}

pub struct BigQueryGateway {
    client: RestClient,
    project_id: String,
    location: Option<String>,
}

impl BigQueryGateway {
    /// Builds the gateway from ambient Google credentials. When no project is
    /// configured it is taken from the credentials.
    pub async fn connect(settings: &WarehouseSettings) -> Result<Self, QueryEngineError> {
        let auth = gcp_auth::provider().await.map_err(|e| {
            QueryEngineError::configuration(format!("Failed to load Google credentials: {}", e))
        })?;

        let project_id = match &settings.project_id {
            Some(project_id) => project_id.clone(),
            None => auth
                .project_id()
                .await
                .map_err(|e| {
                    QueryEngineError::configuration(format!(
                        "BQ_PROJECT_ID is not set and no project could be resolved from credentials: {}",
                        e
                    ))
                })?
                .to_string(),
        };

        Self::from_parts(settings, project_id, auth)
    }

    pub fn from_parts(
        settings: &WarehouseSettings,
        project_id: String,
        auth: Arc<dyn TokenProvider>,
    ) -> Result<Self, QueryEngineError> {
        let client = RestClient::new(&settings.api_endpoint, &project_id, auth)?;

        info!(
            "BigQuery gateway ready for project '{}' at {}",
            project_id, settings.api_endpoint
        );

        Ok(Self {
            client,
            project_id,
            location: settings.location.clone(),
        })
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    fn new_job_reference(&self) -> JobReference {
        JobReference {
            project_id: self.project_id.clone(),
            job_id: Some(format!("mcp_{}", Uuid::new_v4().simple())),
            location: self.location.clone(),
        }
    }

    async fn insert_job(&self, insert: &JobInsert<'_>) -> Result<Job, GatewayError> {
        let job: Job = self.client.post(self.client.url(["jobs"]), insert).await?;

        if let Some(error) = job.error_result() {
            let job_id = insert.job_reference.job_id.as_deref().unwrap_or_default();
            return Err(error_from_job(job_id, error));
        }

        Ok(job)
    }

    async fn get_job(&self, job_ref: &JobReference) -> Result<Job, GatewayError> {
        let job_id = job_ref.job_id.as_deref().unwrap_or_default();
        let mut url = self.client.url(["jobs", job_id]);
        if let Some(location) = &job_ref.location {
            url.query_pairs_mut().append_pair("location", location);
        }
        self.client.get(url).await
    }

    async fn get_query_results(
        &self,
        job_ref: &JobReference,
        page_token: Option<&str>,
    ) -> Result<GetQueryResultsResponse, GatewayError> {
        let job_id = job_ref.job_id.as_deref().unwrap_or_default();
        let mut url = self.client.url(["queries", job_id]);
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("timeoutMs", RESULTS_TIMEOUT_MS)
                .append_pair("formatOptions.useInt64Timestamp", "true");
            if let Some(location) = &job_ref.location {
                query.append_pair("location", location);
            }
            if let Some(token) = page_token {
                query.append_pair("pageToken", token);
            }
        }
        self.client.get(url).await
    }

    /// Starts a query job and blocks until every result page is collected.
    async fn run_query(
        &self,
        query: JobConfigurationQuery<'_>,
    ) -> Result<CompletedQuery, GatewayError> {
        let insert = JobInsert {
            job_reference: self.new_job_reference(),
            configuration: JobConfiguration {
                dry_run: false,
                query,
            },
        };

        let job = self.insert_job(&insert).await?;
        let job_ref = job
            .job_reference
            .filter(|job_ref| job_ref.job_id.is_some())
            .unwrap_or(insert.job_reference);
        let job_id = job_ref.job_id.clone();

        let mut page = self.get_query_results(&job_ref, None).await?;
        while !page.job_complete {
            debug!("Waiting for job {:?} to complete", job_id);
            page = self.get_query_results(&job_ref, None).await?;
        }

        let schema = page.schema.take().map(|s| s.fields).unwrap_or_default();
        let mut total_bytes = page.total_bytes_processed;
        let mut rows = std::mem::take(&mut page.rows);
        let mut page_token = page.page_token.take();

        while let Some(token) = page_token {
            let next = self.get_query_results(&job_ref, Some(&token)).await?;
            debug!(
                "Fetched {} more rows for job {:?}",
                next.rows.len(),
                job_id
            );
            rows.extend(next.rows);
            total_bytes = total_bytes.or(next.total_bytes_processed);
            page_token = next.page_token;
        }

        let total_bytes = match total_bytes {
            Some(bytes) => bytes,
            None => self.get_job(&job_ref).await?.total_bytes_processed().unwrap_or(0),
        };

        Ok(CompletedQuery {
            schema,
            rows,
            bytes_processed: non_negative(total_bytes),
            job_id,
        })
    }

    fn metadata_path(&self, dataset_id: &str) -> Result<String, GatewayError> {
        if !is_valid_dataset_id(dataset_id) {
            return Err(GatewayError::NotFound {
                message: format!("Dataset {}:{}", self.project_id, dataset_id),
            });
        }
        Ok(format!("{}.{}", self.project_id, dataset_id))
    }
}

#[async_trait]
impl WarehouseGateway for BigQueryGateway {
    async fn list_datasets(&self) -> Result<Vec<Dataset>, GatewayError> {
        let mut datasets = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self.client.url(["datasets"]);
            if let Some(token) = &page_token {
                url.query_pairs_mut().append_pair("pageToken", token);
            }

            let page: DatasetList = self.client.get(url).await?;
            datasets.extend(
                page.datasets
                    .into_iter()
                    .map(|entry| Dataset::new(entry.dataset_reference.dataset_id)),
            );

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!("Listed {} datasets in project '{}'", datasets.len(), self.project_id);
        Ok(datasets)
    }

    async fn list_tables(&self, dataset_id: &str) -> Result<Vec<Table>, GatewayError> {
        self.metadata_path(dataset_id)?;

        let mut tables = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self.client.url(["datasets", dataset_id, "tables"]);
            if let Some(token) = &page_token {
                url.query_pairs_mut().append_pair("pageToken", token);
            }

            let page: TableList = self.client.get(url).await?;
            tables.extend(page.tables.into_iter().map(|entry| {
                Table::new(dataset_id, entry.table_reference.table_id)
            }));

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!("Listed {} tables in dataset '{}'", tables.len(), dataset_id);
        Ok(tables)
    }

    async fn query_table_metadata(
        &self,
        dataset_id: &str,
        table_id: &str,
    ) -> Result<Option<TableStats>, GatewayError> {
        let sql = format!(
            "SELECT
              CAST(DATE(TIMESTAMP_MILLIS(creation_time)) AS STRING) AS creation_date,
              CAST(DATE(TIMESTAMP_MILLIS(last_modified_time)) AS STRING) AS last_modified_date,
              row_count,
              size_bytes
            FROM `{}.__TABLES__`
            WHERE table_id = @table_id",
            self.metadata_path(dataset_id)?
        );

        let query = JobConfigurationQuery::new(&sql)
            .with_parameters(vec![QueryParameter::string("table_id", table_id)]);
        let result = self.run_query(query).await?;

        Ok(result.rows.first().map(|row| TableStats {
            created: row.string_at(0),
            last_modified: row.string_at(1),
            row_count: row.int64_at(2),
            size_bytes: row.int64_at(3).map(non_negative),
        }))
    }

    async fn query_column_metadata(
        &self,
        dataset_id: &str,
        table_id: &str,
    ) -> Result<Vec<ColumnDetails>, GatewayError> {
        let sql = format!(
            "SELECT
              column_name,
              is_nullable,
              data_type,
              is_partitioning_column
            FROM `{}`.INFORMATION_SCHEMA.COLUMNS
            WHERE table_name = @table_name
            ORDER BY ordinal_position",
            self.metadata_path(dataset_id)?
        );

        let query = JobConfigurationQuery::new(&sql)
            .with_parameters(vec![QueryParameter::string("table_name", table_id)]);
        let result = self.run_query(query).await?;

        Ok(result
            .rows
            .iter()
            .map(|row| ColumnDetails {
                column_name: row.string_at(0).unwrap_or_default(),
                is_nullable: row.string_at(1).unwrap_or_default(),
                data_type: row.string_at(2).unwrap_or_default(),
                is_partitioning_column: row.string_at(3).unwrap_or_default(),
            })
            .collect())
    }

    async fn dry_run(
        &self,
        sql: &str,
        max_bytes_billed: u64,
    ) -> Result<DryRunResult, GatewayError> {
        let mut query = JobConfigurationQuery::new(sql).with_max_bytes_billed(max_bytes_billed);
        query.use_query_cache = false;

        let insert = JobInsert {
            job_reference: self.new_job_reference(),
            configuration: JobConfiguration {
                dry_run: true,
                query,
            },
        };

        let job = self.insert_job(&insert).await?;
        let bytes_processed = non_negative(job.total_bytes_processed().unwrap_or(0));
        let job_id = job
            .job_reference
            .and_then(|job_ref| job_ref.job_id)
            .or(insert.job_reference.job_id);
        let statistics = job.statistics.and_then(|s| s.query).unwrap_or_default();

        Ok(DryRunResult {
            statement_type: statistics.statement_type,
            referenced_tables: statistics.referenced_tables,
            bytes_processed,
            job_id,
        })
    }

    async fn execute(
        &self,
        sql: &str,
        max_bytes_billed: u64,
    ) -> Result<ExecutionResult, GatewayError> {
        let query = JobConfigurationQuery::new(sql).with_max_bytes_billed(max_bytes_billed);
        let completed = self.run_query(query).await?;

        Ok(ExecutionResult {
            rows: completed
                .rows
                .iter()
                .map(|row| decode::decode_row(&completed.schema, row))
                .collect(),
            schema: decode::decode_schema(&completed.schema),
            bytes_processed: completed.bytes_processed,
            job_id: completed.job_id,
        })
    }
}

fn non_negative(bytes: i64) -> u64 {
    u64::try_from(bytes).unwrap_or(0)
}
