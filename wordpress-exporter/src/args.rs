//! CLI argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::config::ExporterConfig;

/// Prometheus exporter for WordPress.
///
/// Flags given on the command line override values from the config file.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "wordpress-exporter")]
#[command(about = "Export WordPress database statistics as Prometheus metrics")]
#[command(version)]
pub struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Hostname or address of the database server [default: 127.0.0.1].
    #[arg(long)]
    pub host: Option<String>,

    /// Database server port [default: 3306].
    #[arg(long)]
    pub port: Option<u16>,

    /// Database name (required).
    #[arg(long)]
    pub db: Option<String>,

    /// Database user (required).
    #[arg(long)]
    pub user: Option<String>,

    /// Database password.
    #[arg(long)]
    pub pass: Option<String>,

    /// Table prefix for WordPress tables [default: wp_].
    #[arg(long)]
    pub tableprefix: Option<String>,

    /// Skip WooCommerce metrics.
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub skipwoocommerce: Option<bool>,

    /// HTTP listen address (overrides config).
    #[arg(long)]
    pub listen: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Args {
    /// Apply the flags that were given on top of `config`.
    pub fn apply(&self, config: &mut ExporterConfig) {
        let db = &mut config.database;

        if let Some(host) = &self.host {
            db.host = host.clone();
        }
        if let Some(port) = self.port {
            db.port = port;
        }
        if let Some(name) = &self.db {
            db.name = name.clone();
        }
        if let Some(user) = &self.user {
            db.user = user.clone();
        }
        if let Some(pass) = &self.pass {
            db.password = pass.clone();
        }
        if let Some(prefix) = &self.tableprefix {
            db.table_prefix = prefix.clone();
        }
        if let Some(skip) = self.skipwoocommerce {
            db.skip_woocommerce = skip;
        }
        if let Some(listen) = &self.listen {
            config.prometheus.listen = listen.clone();
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
    }
}
