use bigquery_query_engine::WarehouseEngine;
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        AnnotateAble, CallToolResult, Content, ErrorData, Implementation, ListResourceTemplatesResult,
        ListResourcesResult, PaginatedRequestParam, RawResource, RawResourceTemplate,
        ReadResourceRequestParam, ReadResourceResult, Resource, ResourceContents,
        ResourceTemplate, ServerCapabilities, ServerInfo,
    },
    service::RequestContext,
    tool, tool_handler, tool_router, RoleServer, ServerHandler,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::error::{engine_error, ServerError};

const INSTRUCTIONS: &str = "Read-only access to a BigQuery project. \
Use get_allowed_datasets and list_tables to discover data, describe_table for columns and size, \
then execute_query with dry_run: true to validate a query and see the bytes it would process \
before running it with dry_run: false. Only SELECT statements over allowed datasets are accepted.";

#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct ListTablesParams {
    /// Dataset to list. When omitted, tables of every accessible dataset are returned.
    #[serde(default)]
    pub dataset_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct DescribeTableParams {
    pub dataset_id: String,
    pub table_id: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ExecuteQueryParams {
    /// GoogleSQL query text.
    pub query: String,
    /// Validate and estimate only; nothing is billed and no rows are returned.
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Clone)]
pub struct WarehouseService {
    engine: WarehouseEngine,
    tool_router: ToolRouter<Self>,
}

impl WarehouseService {
    pub fn engine(&self) -> &WarehouseEngine {
        &self.engine
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String, ErrorData> {
    Ok(serde_json::to_string_pretty(value).map_err(ServerError::from)?)
}

fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, ErrorData> {
    Ok(CallToolResult::success(vec![Content::text(to_json(value)?)]))
}

const URI_SCHEME: &str = "bigquery://";
const JSON_MIME: &str = "application/json";

/// Read-only resources mirroring the catalog tools.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ResourceUri {
    Datasets,
    AllowedDatasets,
    Tables(String),
    TableDetails(String, String),
}

impl ResourceUri {
    fn parse(uri: &str) -> Option<Self> {
        let path = uri.strip_prefix(URI_SCHEME)?;
        let segments: Vec<&str> = path.split('/').collect();

        match segments.as_slice() {
            ["datasets"] => Some(Self::Datasets),
            ["allowed_datasets"] => Some(Self::AllowedDatasets),
            [dataset_id, "tables"] if !dataset_id.is_empty() => {
                Some(Self::Tables(dataset_id.to_string()))
            }
            [dataset_id, table_id, "details"] if !dataset_id.is_empty() && !table_id.is_empty() => {
                Some(Self::TableDetails(dataset_id.to_string(), table_id.to_string()))
            }
            _ => None,
        }
    }
}

fn json_resource(uri: &str, name: &str, description: &str) -> Resource {
    let mut raw = RawResource::new(uri, name);
    raw.description = Some(description.to_string());
    raw.mime_type = Some(JSON_MIME.to_string());
    raw.no_annotation()
}

fn json_resource_template(uri_template: &str, name: &str, description: &str) -> ResourceTemplate {
    RawResourceTemplate {
        uri_template: uri_template.to_string(),
        name: name.to_string(),
        title: None,
        description: Some(description.to_string()),
        mime_type: Some(JSON_MIME.to_string()),
    }
    .no_annotation()
}

impl WarehouseService {
    fn resources(&self) -> Vec<Resource> {
        vec![
            json_resource(
                "bigquery://datasets",
                "datasets",
                "Datasets in the project that this server is allowed to read",
            ),
            json_resource(
                "bigquery://allowed_datasets",
                "allowed_datasets",
                "The configured dataset allow-list",
            ),
        ]
    }

    fn resource_templates(&self) -> Vec<ResourceTemplate> {
        vec![
            json_resource_template(
                "bigquery://{dataset_id}/tables",
                "tables",
                "Tables in an allowed dataset",
            ),
            json_resource_template(
                "bigquery://{dataset_id}/{table_id}/details",
                "table_details",
                "Columns, row count, size and timestamps of a table",
            ),
        ]
    }

    async fn read_uri(&self, uri: &str) -> Result<ReadResourceResult, ErrorData> {
        let resource = ResourceUri::parse(uri).ok_or_else(|| {
            ErrorData::resource_not_found(
                format!("Unknown resource: {}", uri),
                Some(json!({ "uri": uri })),
            )
        })?;
        info!("Resource read: {}", uri);

        let text = match resource {
            ResourceUri::Datasets => {
                to_json(&self.engine.list_datasets().await.map_err(|e| engine_error(&e))?)?
            }
            ResourceUri::AllowedDatasets => to_json(&self.engine.get_allowed_datasets())?,
            ResourceUri::Tables(dataset_id) => to_json(
                &self
                    .engine
                    .list_tables(Some(dataset_id.as_str()))
                    .await
                    .map_err(|e| engine_error(&e))?,
            )?,
            ResourceUri::TableDetails(dataset_id, table_id) => to_json(
                &self
                    .engine
                    .describe_table(&dataset_id, &table_id)
                    .await
                    .map_err(|e| engine_error(&e))?,
            )?,
        };

        Ok(ReadResourceResult {
            contents: vec![ResourceContents::text(text, uri)],
        })
    }
}

#[tool_router]
impl WarehouseService {
    pub fn new(engine: WarehouseEngine) -> Self {
        Self {
            engine,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(description = "List the datasets in the project that this server is allowed to read")]
    async fn list_datasets(&self) -> Result<CallToolResult, ErrorData> {
        info!("Tool call: list_datasets");
        let datasets = self
            .engine
            .list_datasets()
            .await
            .map_err(|e| engine_error(&e))?;
        json_result(&datasets)
    }

    #[tool(description = "Show the configured dataset allow-list; [\"*\"] means every dataset is allowed")]
    async fn get_allowed_datasets(&self) -> Result<CallToolResult, ErrorData> {
        info!("Tool call: get_allowed_datasets");
        json_result(&self.engine.get_allowed_datasets())
    }

    #[tool(description = "List tables in a dataset, or in every accessible dataset when dataset_id is omitted")]
    async fn list_tables(
        &self,
        Parameters(params): Parameters<ListTablesParams>,
    ) -> Result<CallToolResult, ErrorData> {
        info!("Tool call: list_tables {:?}", params.dataset_id);
        let tables = self
            .engine
            .list_tables(params.dataset_id.as_deref())
            .await
            .map_err(|e| engine_error(&e))?;
        json_result(&tables)
    }

    #[tool(description = "Describe a table: columns, row count, size and timestamps")]
    async fn describe_table(
        &self,
        Parameters(params): Parameters<DescribeTableParams>,
    ) -> Result<CallToolResult, ErrorData> {
        info!(
            "Tool call: describe_table {}.{}",
            params.dataset_id, params.table_id
        );
        let details = self
            .engine
            .describe_table(&params.dataset_id, &params.table_id)
            .await
            .map_err(|e| engine_error(&e))?;
        json_result(&details)
    }

    #[tool(description = "Run a read-only SELECT query. Every query is dry-run and checked against the allow-list first; set dry_run to true to only validate and estimate bytes processed")]
    async fn execute_query(
        &self,
        Parameters(params): Parameters<ExecuteQueryParams>,
    ) -> Result<CallToolResult, ErrorData> {
        info!("Tool call: execute_query (dry_run: {})", params.dry_run);
        let result = self
            .engine
            .execute_query(&params.query, params.dry_run)
            .await
            .map_err(|e| {
                warn!("execute_query failed: {}", e);
                engine_error(&e)
            })?;
        json_result(&result)
    }

    #[tool(description = "Liveness check; does not contact BigQuery")]
    async fn health_check(&self) -> Result<CallToolResult, ErrorData> {
        Ok(CallToolResult::success(vec![Content::text(
            self.engine.health_check(),
        )]))
    }
}

#[tool_handler]
impl ServerHandler for WarehouseService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .build(),
            server_info: Implementation {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Implementation::from_build_env()
            },
            instructions: Some(INSTRUCTIONS.to_string()),
            ..Default::default()
        }
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, ErrorData> {
        Ok(ListResourcesResult::with_all_items(self.resources()))
    }

    async fn list_resource_templates(
        &self,
        _request: Option<PaginatedRequestParam>,
        _: RequestContext<RoleServer>,
    ) -> Result<ListResourceTemplatesResult, ErrorData> {
        Ok(ListResourceTemplatesResult::with_all_items(
            self.resource_templates(),
        ))
    }

    async fn read_resource(
        &self,
        ReadResourceRequestParam { uri }: ReadResourceRequestParam,
        _: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, ErrorData> {
        self.read_uri(&uri).await
    }
}
