use axum::{extract::State, response::Json, routing::get, Router};
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
};
use rmcp::ServiceExt;
use tokio::io::{stdin, stdout};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod error;
mod mcp_server;
mod state;

use config::{Settings, Transport};
use mcp_server::WarehouseService;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "bigquery_mcp_server=debug,bigquery_query_engine=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting BigQuery MCP Server v{}", env!("CARGO_PKG_VERSION"));

    let settings = Settings::from_env()?;

    info!("Configuration loaded:");
    info!("  Transport: {}", settings.server.transport);
    info!("  Allowed datasets: {:?}", settings.warehouse.allowed_datasets);
    info!("  Max bytes billed: {}", settings.warehouse.max_bytes_billed);

    let state = AppState::initialize(&settings).await?;
    let service = WarehouseService::new(state.engine().clone());

    info!("MCP server initialized successfully");

    match settings.server.transport {
        Transport::Stdio => serve_stdio(service).await?,
        Transport::Http => serve_http(service, &settings.server.bind_address()).await?,
    }

    state.shutdown();
    info!("MCP Server shutdown complete");
    Ok(())
}

async fn serve_stdio(service: WarehouseService) -> anyhow::Result<()> {
    let server = service.serve((stdin(), stdout())).await?;

    info!("MCP server listening on stdio");

    server.waiting().await?;
    Ok(())
}

async fn serve_http(service: WarehouseService, addr: &str) -> anyhow::Result<()> {
    let health_service = service.clone();
    let mcp_service = StreamableHttpService::new(
        move || Ok(service.clone()),
        LocalSessionManager::default().into(),
        StreamableHttpServerConfig::default(),
    );

    let app = Router::new()
        .route("/health", get(health_check))
        .with_state(health_service)
        .nest_service("/mcp", mcp_service);

    let listener = TcpListener::bind(addr).await?;
    info!("MCP server listening on http://{}/mcp", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn health_check(State(service): State<WarehouseService>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": service.engine().health_check(),
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
