use std::fmt;
use std::str::FromStr;

use bigquery_query_engine::WarehouseSettings;

use crate::error::ServerError;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 8001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transport {
    #[default]
    Http,
    Stdio,
}

impl FromStr for Transport {
    type Err = ServerError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Transport::Http),
            "stdio" => Ok(Transport::Stdio),
            _ => Err(ServerError::Config {
                message: format!("Invalid MCP_TRANSPORT '{}': expected 'http' or 'stdio'", raw),
            }),
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Http => f.write_str("http"),
            Transport::Stdio => f.write_str("stdio"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub transport: Transport,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            transport: Transport::default(),
        }
    }
}

impl ServerSettings {
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ServerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let port = match non_empty("APP_PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|e| ServerError::Config {
                message: format!("Invalid APP_PORT '{}': {}", raw, e),
            })?,
            None => DEFAULT_PORT,
        };

        let transport = match non_empty("MCP_TRANSPORT") {
            Some(raw) => raw.parse()?,
            None => Transport::default(),
        };

        Ok(Self {
            host: non_empty("APP_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            transport,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Everything the process reads at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub warehouse: WarehouseSettings,
}

impl Settings {
    pub fn from_env() -> Result<Self, ServerError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded environment from {}", path.display());
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ServerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            server: ServerSettings::from_lookup(&lookup)?,
            warehouse: WarehouseSettings::from_lookup(&lookup)?,
        })
    }
}
