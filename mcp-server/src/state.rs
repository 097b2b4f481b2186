use std::time::Instant;

use bigquery_query_engine::WarehouseEngine;
use tracing::info;

use crate::config::Settings;
use crate::error::ServerError;

/// Process-lifetime resources, built once before any transport starts.
pub struct AppState {
    engine: WarehouseEngine,
    started_at: Instant,
}

impl AppState {
    pub async fn initialize(settings: &Settings) -> Result<Self, ServerError> {
        let engine = WarehouseEngine::connect(settings.warehouse.clone()).await?;
        Ok(Self::from_engine(engine))
    }

    pub fn from_engine(engine: WarehouseEngine) -> Self {
        Self {
            engine,
            started_at: Instant::now(),
        }
    }

    pub fn engine(&self) -> &WarehouseEngine {
        &self.engine
    }

    pub fn shutdown(self) {
        info!(
            "Releasing warehouse client for project '{}' after {:?}",
            self.engine.policy().project_id(),
            self.started_at.elapsed()
        );
        drop(self.engine);
    }
}
