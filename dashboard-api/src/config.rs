//! Server configuration read from the environment
//!
//! * `DASHBOARD_HOST` - interface to bind. Default: `127.0.0.1`.
//! * `DASHBOARD_PORT` - port to bind. Default: `3210`.
//! * `DASHBOARD_DEV_ERRORS` - `1`/`true` renders error causes.
//! * `DASHBOARD_DEMO_API_KEY` - when set, a demo user reachable with this key
//!   is created at startup.

use std::net::SocketAddr;
use thiserror::Error;
use typed_rpc::RpcConfig;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3210;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be a port number, got '{value}'")]
    InvalidPort { name: &'static str, value: String },

    #[error("'{0}' is not a valid listen address")]
    InvalidAddress(String),

    #[error("invalid router configuration: {0}")]
    Rpc(#[from] typed_rpc::ConfigValidationError),
}

/// Configuration for the dashboard server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub rpc: RpcConfig,
    pub demo_api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            rpc: RpcConfig::default(),
            demo_api_key: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(host) = lookup("DASHBOARD_HOST").filter(|h| !h.trim().is_empty()) {
            config.host = host.trim().to_string();
        }
        if let Some(port) = lookup("DASHBOARD_PORT") {
            config.port = port.trim().parse().map_err(|_| ConfigError::InvalidPort {
                name: "DASHBOARD_PORT",
                value: port.clone(),
            })?;
        }
        let dev_errors = lookup("DASHBOARD_DEV_ERRORS")
            .is_some_and(|v| matches!(v.trim(), "1" | "true" | "yes"));
        config.rpc = config.rpc.with_development_errors(dev_errors);
        config.demo_api_key = lookup("DASHBOARD_DEMO_API_KEY").filter(|k| !k.trim().is_empty());

        config.rpc.validate()?;
        Ok(config)
    }

    pub fn addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(format!("{}:{}", self.host, self.port)))
    }
}
