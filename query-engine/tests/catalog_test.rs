mod common;

use std::collections::HashSet;
use std::sync::Arc;

use bigquery_query_engine::domain::{Dataset, Table, TableStats};
use bigquery_query_engine::policy::DEFAULT_MAX_BYTES_BILLED;
use bigquery_query_engine::{DatasetAllowList, Policy, QueryEngineError, ResourceKind, WarehouseEngine};
use common::{column, init_test_logging, Call, FakeGateway, PROJECT};
use pretty_assertions::assert_eq;

fn engine_with(gateway: &Arc<FakeGateway>, allowed: DatasetAllowList) -> WarehouseEngine {
    WarehouseEngine::new(
        Policy::new(PROJECT, allowed, DEFAULT_MAX_BYTES_BILLED),
        gateway.clone(),
    )
}

fn two_datasets() -> FakeGateway {
    FakeGateway::new()
        .with_dataset("sales", &["orders", "customers", "refunds"])
        .with_dataset("marketing", &["campaigns", "clicks", "spend"])
        .with_dataset("hr", &["salaries"])
}

#[tokio::test]
async fn test_get_allowed_datasets_never_calls_the_warehouse() {
    // Given
    let gateway = Arc::new(two_datasets());
    let unrestricted = engine_with(&gateway, DatasetAllowList::Unrestricted);
    let restricted = engine_with(&gateway, DatasetAllowList::restricted(["sales", "marketing"]));

    // When
    let everything = unrestricted.get_allowed_datasets();
    let some = restricted.get_allowed_datasets();

    // Then
    assert_eq!(everything, vec![Dataset::new("*")]);
    assert_eq!(some, vec![Dataset::new("marketing"), Dataset::new("sales")]);
    assert!(gateway.calls().is_empty());
}

#[tokio::test]
async fn test_list_datasets_is_filtered_by_the_allow_list() {
    init_test_logging();

    // Given
    let gateway = Arc::new(two_datasets());
    let engine = engine_with(&gateway, DatasetAllowList::restricted(["sales", "missing"]));

    // When
    let datasets = engine.list_datasets().await.unwrap();

    // Then: configured datasets that do not exist are not invented
    assert_eq!(datasets, vec![Dataset::new("sales")]);
}

#[tokio::test]
async fn test_list_datasets_on_an_empty_warehouse() {
    let gateway = Arc::new(FakeGateway::new());
    let engine = engine_with(&gateway, DatasetAllowList::Unrestricted);

    let datasets = engine.list_datasets().await.unwrap();

    assert!(datasets.is_empty());
    assert_eq!(gateway.calls(), vec![Call::ListDatasets]);
}

#[tokio::test]
async fn test_list_tables_without_dataset_is_the_union_of_allowed_datasets() {
    init_test_logging();

    // Given: two allowed datasets with three tables each
    let gateway = Arc::new(two_datasets());
    let engine = engine_with(&gateway, DatasetAllowList::restricted(["sales", "marketing"]));

    // When
    let tables = engine.list_tables(None).await.unwrap();

    // Then: six distinct tables, none from hr
    assert_eq!(tables.len(), 6);
    let distinct: HashSet<(String, String)> = tables
        .iter()
        .map(|t| (t.dataset_id.clone(), t.table_id.clone()))
        .collect();
    assert_eq!(distinct.len(), 6);
    assert!(tables.iter().all(|t| t.dataset_id != "hr"));
    assert!(tables.contains(&Table::new("marketing", "clicks")));

    // And: the live catalog was not consulted for the restricted case
    assert!(!gateway.calls().contains(&Call::ListDatasets));
}

#[tokio::test]
async fn test_list_tables_without_dataset_covers_the_whole_catalog_when_unrestricted() {
    // Given
    let gateway = Arc::new(two_datasets());
    let engine = engine_with(&gateway, DatasetAllowList::Unrestricted);

    // When
    let tables = engine.list_tables(None).await.unwrap();

    // Then
    assert_eq!(tables.len(), 7);
    assert_eq!(gateway.calls()[0], Call::ListDatasets);
}

#[tokio::test]
async fn test_list_tables_skips_allowed_datasets_that_do_not_exist() {
    // Given: the allow-list names a dataset the warehouse does not have
    let gateway = Arc::new(two_datasets());
    let engine = engine_with(&gateway, DatasetAllowList::restricted(["sales", "archive"]));

    // When
    let tables = engine.list_tables(None).await.unwrap();

    // Then
    assert_eq!(tables.len(), 3);
    assert!(tables.iter().all(|t| t.dataset_id == "sales"));
}

#[tokio::test]
async fn test_list_tables_for_a_single_dataset() {
    // Given
    let gateway = Arc::new(two_datasets());
    let engine = engine_with(&gateway, DatasetAllowList::restricted(["sales"]));

    // When
    let tables = engine.list_tables(Some("sales")).await.unwrap();

    // Then
    assert_eq!(
        tables,
        vec![
            Table::new("sales", "orders"),
            Table::new("sales", "customers"),
            Table::new("sales", "refunds"),
        ]
    );
}

#[tokio::test]
async fn test_list_tables_for_a_disallowed_dataset_is_rejected_before_the_warehouse() {
    // Given
    let gateway = Arc::new(two_datasets());
    let engine = engine_with(&gateway, DatasetAllowList::restricted(["sales"]));

    // When
    let err = tokio_test::assert_err!(engine.list_tables(Some("hr")).await);

    // Then
    assert_eq!(err.kind(), "dataset_not_allowed");
    assert_eq!(err.to_string(), "Dataset hr is not allowed.");
    assert!(gateway.calls().is_empty());
}

#[tokio::test]
async fn test_list_tables_for_a_missing_dataset_is_not_found() {
    // Given
    let gateway = Arc::new(two_datasets());
    let engine = engine_with(&gateway, DatasetAllowList::Unrestricted);

    // When
    let err = engine.list_tables(Some("archive")).await.unwrap_err();

    // Then
    match err {
        QueryEngineError::NotFound { resource, id } => {
            assert_eq!(resource, ResourceKind::Dataset);
            assert_eq!(id, "archive");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_describe_table_combines_stats_and_columns() {
    init_test_logging();

    // Given
    let size_bytes = 3 * (1u64 << 30) / 2;
    let gateway = Arc::new(
        two_datasets()
            .with_table_stats(
                "sales",
                "orders",
                TableStats {
                    row_count: Some(1200),
                    size_bytes: Some(size_bytes),
                    created: Some("2024-01-02T03:04:05Z".to_string()),
                    last_modified: Some("2024-02-03T04:05:06Z".to_string()),
                },
            )
            .with_columns(
                "sales",
                "orders",
                vec![column("id", "INT64"), column("amount", "NUMERIC")],
            ),
    );
    let engine = engine_with(&gateway, DatasetAllowList::restricted(["sales"]));

    // When
    let details = engine.describe_table("sales", "orders").await.unwrap();

    // Then
    assert_eq!(details.dataset_id, "sales");
    assert_eq!(details.table_id, "orders");
    assert_eq!(details.row_count, Some(1200));
    assert_eq!(details.size_bytes, Some(size_bytes));
    assert_eq!(details.size_gbytes, Some(1.5));
    assert_eq!(
        details
            .columns
            .iter()
            .map(|c| c.column_name.as_str())
            .collect::<Vec<_>>(),
        vec!["id", "amount"]
    );
    assert_eq!(details.created.as_deref(), Some("2024-01-02T03:04:05Z"));
}

#[tokio::test]
async fn test_describe_table_without_size_has_no_gbytes() {
    // Given: stats exist but size is unknown
    let gateway = Arc::new(two_datasets().with_table_stats(
        "sales",
        "orders",
        TableStats {
            row_count: Some(0),
            ..TableStats::default()
        },
    ));
    let engine = engine_with(&gateway, DatasetAllowList::Unrestricted);

    // When
    let details = engine.describe_table("sales", "orders").await.unwrap();

    // Then
    assert_eq!(details.size_bytes, None);
    assert_eq!(details.size_gbytes, None);
    assert!(details.columns.is_empty());
}

#[tokio::test]
async fn test_describe_missing_table_is_not_found() {
    // Given: no stats for the table
    let gateway = Arc::new(two_datasets());
    let engine = engine_with(&gateway, DatasetAllowList::Unrestricted);

    // When
    let err = engine.describe_table("sales", "ghost").await.unwrap_err();

    // Then
    match err {
        QueryEngineError::NotFound { resource, id } => {
            assert_eq!(resource, ResourceKind::Table);
            assert_eq!(id, "sales.ghost");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_describe_table_in_a_disallowed_dataset() {
    // Given
    let gateway = Arc::new(two_datasets());
    let engine = engine_with(&gateway, DatasetAllowList::restricted(["sales"]));

    // When
    let err = engine.describe_table("hr", "salaries").await.unwrap_err();

    // Then
    assert_eq!(err.kind(), "dataset_not_allowed");
    assert!(gateway.calls().is_empty());
}

#[test]
fn test_health_check_is_local() {
    let gateway = Arc::new(FakeGateway::new());
    let engine = engine_with(&gateway, DatasetAllowList::Unrestricted);

    assert_eq!(engine.health_check(), "ok");
    assert!(gateway.calls().is_empty());
}
