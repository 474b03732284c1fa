//! Configuration loading.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub listen: ListenConfig,
    pub auth: AuthConfig,
    pub database: Option<DatabaseConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Human-readable instance name, used only in logs.
    pub name: String,
    /// Port for the HTTP surface (metrics, health, message retrieval).
    /// Defaults to 9090; 0 disables it.
    pub http_port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    /// Address for the WebSocket listener.
    pub ws: SocketAddr,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret that issued tokens are verified against.
    pub jwt_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database path, or ":memory:".
    pub path: String,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// True for secrets no production instance should run with.
pub fn is_default_secret(secret: &str) -> bool {
    secret.is_empty() || secret == "change-me"
}
