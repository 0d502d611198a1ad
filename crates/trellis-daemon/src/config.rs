//! Configuration for the Trellis daemon.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Main daemon configuration: defaults, then an optional file, then
/// `TRELLIS_`-prefixed environment variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,

    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".parse().unwrap(),
            enable_cors: true,
        }
    }
}

/// Storage backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (development/testing).
    Memory,

    /// PostgreSQL storage (requires the `postgres` feature).
    Postgres {
        url: String,

        #[serde(default = "default_pool_size")]
        max_connections: u32,

        #[serde(default = "default_connect_timeout")]
        connect_timeout_secs: u64,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Memory
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_pool_size() -> u32 {
    10
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Load configuration: defaults, optional file, `TRELLIS_` environment.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // Double-underscore separates nested keys so snake_case field
        // names stay addressable (TRELLIS_SERVER__LISTEN_ADDR).
        builder = builder.add_source(
            config::Environment::with_prefix("TRELLIS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_memory_storage() {
        let config = DaemonConfig::default();
        assert!(matches!(config.storage, StorageConfig::Memory));
        assert_eq!(config.server.listen_addr.port(), 8080);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn env_overrides_nested_snake_case_keys() {
        std::env::set_var("TRELLIS_SERVER__LISTEN_ADDR", "0.0.0.0:9000");
        let config = DaemonConfig::load(None).unwrap();
        std::env::remove_var("TRELLIS_SERVER__LISTEN_ADDR");

        assert_eq!(config.server.listen_addr.port(), 9000);
        assert!(config.server.listen_addr.ip().is_unspecified());
    }

    #[test]
    fn storage_config_is_tagged() {
        let parsed: StorageConfig = serde_json::from_value(serde_json::json!({
            "type": "postgres",
            "url": "postgres://localhost/trellis",
        }))
        .unwrap();
        match parsed {
            StorageConfig::Postgres {
                url,
                max_connections,
                connect_timeout_secs,
            } => {
                assert_eq!(url, "postgres://localhost/trellis");
                assert_eq!(max_connections, 10);
                assert_eq!(connect_timeout_secs, 5);
            }
            StorageConfig::Memory => panic!("expected postgres config"),
        }
    }
}
