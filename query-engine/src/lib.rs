pub mod admission;
pub mod bigquery;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod policy;
pub mod projection;

pub use config::WarehouseSettings;
pub use engine::WarehouseEngine;
pub use error::{Operation, PolicyViolation, QueryEngineError, ResourceKind};
pub use gateway::{GatewayError, WarehouseGateway};
pub use policy::{DatasetAllowList, Policy};
