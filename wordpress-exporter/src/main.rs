//! Prometheus exporter for WordPress.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

use wordpress_exporter::{
    Args, Collector, ExporterConfig, HttpServer, MetricRegistry, MySqlSource, init_tracing,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration, then let CLI flags override it
    let mut config = if let Some(config_path) = &args.config {
        ExporterConfig::load_from_file(config_path)?
    } else {
        ExporterConfig::default()
    };
    args.apply(&mut config);

    // Missing credentials are fatal before anything binds
    config.validate()?;

    init_tracing(&config.logging)?;

    info!("Starting WordPress Prometheus Exporter");

    let listen_addr: SocketAddr = config
        .prometheus
        .listen
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let source = Arc::new(MySqlSource::new(&config.database));
    let registry = MetricRegistry::with_namespace(&config.prometheus.namespace);
    let collector = Arc::new(Collector::new(
        registry,
        config.database.clone(),
        source.clone(),
    ));

    info!(
        host = %config.database.host,
        port = config.database.port,
        database = %config.database.name,
        table_prefix = %config.database.table_prefix,
        skip_woocommerce = config.database.skip_woocommerce,
        metrics = collector.describe().len(),
        "Collector ready"
    );

    let http_server = HttpServer::new(
        collector.clone(),
        listen_addr,
        config.prometheus.path.clone(),
    );

    let http_shutdown = shutdown_rx.clone();
    let http_task = tokio::spawn(async move {
        if let Err(e) = http_server.run(http_shutdown).await {
            error!("HTTP server error: {}", e);
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate_signal() => {
            info!("Received SIGTERM, shutting down...");
        }
    }

    shutdown_tx.send(true)?;

    if tokio::time::timeout(Duration::from_secs(5), http_task)
        .await
        .is_err()
    {
        warn!("HTTP server did not stop within 5s");
    }

    source.close().await;

    let stats = collector.stats();
    info!(
        scrapes_total = stats.scrapes_total,
        scrape_errors_total = stats.scrape_errors_total,
        "Final statistics"
    );

    info!("Exporter stopped");
    Ok(())
}

#[cfg(unix)]
async fn terminate_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate_signal() {
    std::future::pending::<()>().await;
}
