//! Prometheus metrics exporter for WordPress.
//!
//! This crate queries the MySQL/MariaDB database behind a WordPress (and
//! optionally WooCommerce) site on every scrape and exposes the results via
//! an HTTP `/metrics` endpoint.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │  MySQL/MariaDB  │<────│    Collector    │<────│   HTTP Server   │
//! │  (wp_* tables)  │     │ (per scrape SQL)│     │   (/metrics)    │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```
//!
//! Nothing is cached: each scrape runs the full query sequence against the
//! database and either returns every metric or fails as a whole.
//!
//! # Usage
//!
//! ```bash
//! wordpress-exporter --db wordpress --user exporter --pass secret
//! ```
//!
//! # Configuration
//!
//! See [`config::ExporterConfig`] for configuration options and
//! [`args::Args`] for command-line flags.

pub mod args;
pub mod collector;
pub mod config;
pub mod error;
pub mod exposition;
pub mod http;
pub mod registry;
pub mod source;

pub use args::Args;
pub use collector::{Collector, Sample, SharedCollector};
pub use config::{ConfigError, ExporterConfig};
pub use error::{CollectError, SourceError};
pub use http::HttpServer;
pub use registry::{MetricDesc, MetricId, MetricRegistry};
pub use source::{MetricSource, MySqlSource, StaticSource};

use config::{LogFormat, LoggingConfig};

/// Initialize tracing with the given configuration.
///
/// `RUST_LOG` takes precedence over the configured level. Supports two
/// output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
pub fn init_tracing(config: &LoggingConfig) -> anyhow::Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "wordpress_exporter={},sqlx=warn",
            config.level
        ))
    });

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;
        }
    }

    Ok(())
}
