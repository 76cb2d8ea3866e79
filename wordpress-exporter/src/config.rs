//! Configuration for the WordPress exporter.
//!
//! Settings come from an optional JSON5 file and are then overridden by
//! command-line flags (see [`crate::args::Args`]). Validation runs once both
//! sources are merged, so a file may leave out credentials supplied on the
//! command line.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::registry::DEFAULT_NAMESPACE;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete exporter configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Database connection and query settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Prometheus exporter settings.
    #[serde(default)]
    pub prometheus: PrometheusConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// WordPress database settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database server host (default: "127.0.0.1").
    #[serde(default = "default_host")]
    pub host: String,

    /// Database server port (default: 3306).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Database (schema) name. Required.
    #[serde(default)]
    pub name: String,

    /// Database user. Required.
    #[serde(default)]
    pub user: String,

    /// Database password (default: empty).
    #[serde(default)]
    pub password: String,

    /// WordPress table prefix (default: "wp_").
    ///
    /// Substituted verbatim into SQL; must come from a trusted operator.
    #[serde(default = "default_table_prefix")]
    pub table_prefix: String,

    /// Skip the WooCommerce session count.
    #[serde(default)]
    pub skip_woocommerce: bool,

    /// Maximum pooled connections (default: 2).
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a scrape waits for a pooled connection (seconds).
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3306
}

fn default_table_prefix() -> String {
    "wp_".to_string()
}

fn default_max_connections() -> u32 {
    2
}

fn default_acquire_timeout() -> u64 {
    30
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            name: String::new(),
            user: String::new(),
            password: String::new(),
            table_prefix: default_table_prefix(),
            skip_woocommerce: false,
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout(),
        }
    }
}

// Keeps the password out of logs.
impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &"***")
            .field("table_prefix", &self.table_prefix)
            .field("skip_woocommerce", &self.skip_woocommerce)
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout_secs", &self.acquire_timeout_secs)
            .finish()
    }
}

/// Prometheus HTTP endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusConfig {
    /// Address to listen on (default: "0.0.0.0:9850").
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Path for metrics endpoint (default: "/metrics").
    #[serde(default = "default_path")]
    pub path: String,

    /// Metric name namespace (default: "wordpress").
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

fn default_listen() -> String {
    "0.0.0.0:9850".to_string()
}

fn default_path() -> String {
    "/metrics".to_string()
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
            namespace: default_namespace(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl ExporterConfig {
    /// Load configuration from a JSON5 file.
    ///
    /// The result is not validated; call [`validate`](Self::validate) after
    /// applying command-line overrides.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(json5::from_str(content)?)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.name.is_empty() {
            return Err(ConfigError::Validation(
                "database name is required (--db)".to_string(),
            ));
        }

        if self.database.user.is_empty() {
            return Err(ConfigError::Validation(
                "database user is required (--user)".to_string(),
            ));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Validation(
                "max_connections must be > 0".to_string(),
            ));
        }

        if self.database.acquire_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "acquire_timeout_secs must be > 0".to_string(),
            ));
        }

        if self
            .prometheus
            .listen
            .parse::<std::net::SocketAddr>()
            .is_err()
        {
            return Err(ConfigError::Validation(format!(
                "Invalid listen address: {}",
                self.prometheus.listen
            )));
        }

        if !self.prometheus.path.starts_with('/') {
            return Err(ConfigError::Validation(
                "Metrics path must start with /".to_string(),
            ));
        }

        Ok(())
    }
}
