//! Integration tests for the WordPress exporter.
//!
//! These tests drive full collection cycles against an in-memory database
//! and check what the HTTP /metrics endpoint exposes.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use wordpress_exporter::config::DatabaseConfig;
use wordpress_exporter::registry::QueryShape;
use wordpress_exporter::{
    Collector, ExporterConfig, HttpServer, MetricId, MetricRegistry, SharedCollector, StaticSource,
};

/// A small WooCommerce shop using the `shop_` table prefix.
fn seeded_shop(skip_woocommerce: bool) -> (SharedCollector, StaticSource) {
    let mut config = ExporterConfig::parse(
        r#"{ database: { name: "shop", user: "exporter", table_prefix: "shop_" } }"#,
    )
    .unwrap();
    config.database.skip_woocommerce = skip_woocommerce;
    config.validate().unwrap();

    let db: &DatabaseConfig = &config.database;
    let q = |id: MetricId| id.query(&db.table_prefix, &db.name);

    let source = StaticSource::new();
    source.set_scalar(q(MetricId::Users), 25.0);
    source.set_scalar(q(MetricId::Customers), 18.0);
    source.set_scalar(q(MetricId::UserSessions), 6.0);
    source.set_scalar(q(MetricId::OptionAutoload), 312.0);
    source.set_scalar(q(MetricId::OptionAutoloadBytes), 845_112.0);
    source.set_scalar(q(MetricId::DatabaseSize), 52_428_800.0);
    source.set_grouped(q(MetricId::Comments), [("", 40.0), ("order_note", 12.0)]);
    source.set_grouped(q(MetricId::Posts), [("publish", 2.0), ("draft", 1.0)]);
    source.set_grouped(q(MetricId::Webhooks), [("complete", 90.0), ("pending", 4.0)]);
    source.set_grouped(
        q(MetricId::PostsType),
        [("post", 3.0), ("page", 5.0), ("shop_order", 20.0)],
    );
    source.set_grouped(
        q(MetricId::OrderType),
        [("wc-completed", 15.0), ("wc-processing", 5.0)],
    );

    let collector = Collector::new(
        MetricRegistry::new(),
        config.database.clone(),
        Arc::new(source.clone()),
    );
    (Arc::new(collector), source)
}

/// Sample lines (no comments) for one metric name.
fn sample_lines<'a>(output: &'a str, name: &str) -> Vec<&'a str> {
    output
        .lines()
        .filter(|l| !l.starts_with('#'))
        .filter(|l| l.split(['{', ' ']).next() == Some(name))
        .collect()
}

#[tokio::test]
async fn test_full_scrape_renders_every_metric() {
    let (collector, _source) = seeded_shop(false);

    let output = collector.scrape().await.unwrap();

    assert_eq!(
        sample_lines(&output, "wordpress_users_total"),
        vec!["wordpress_users_total 25"]
    );
    assert_eq!(
        sample_lines(&output, "wordpress_posts_total"),
        vec![
            "wordpress_posts_total{type=\"draft\"} 1",
            "wordpress_posts_total{type=\"publish\"} 2",
        ]
    );
    assert_eq!(
        sample_lines(&output, "wordpress_order_type_total"),
        vec![
            "wordpress_order_type_total{type=\"completed\"} 15",
            "wordpress_order_type_total{type=\"processing\"} 5",
        ]
    );
    assert!(output.contains("wordpress_comments_total{type=\"comment\"} 40"));
    assert!(output.contains("wordpress_webhooks_total{status=\"pending\"} 4"));
    assert!(output.contains("wordpress_user_sessions_total 6"));
    assert!(output.contains("wordpress_database_size_bytes 52428800"));
    assert!(output.contains("wordpress_option_autoload_bytes 845112"));
}

#[tokio::test]
async fn test_skip_woocommerce_keeps_declaration() {
    let (collector, _source) = seeded_shop(true);

    let output = collector.scrape().await.unwrap();

    assert!(output.contains("# TYPE wordpress_user_sessions_total gauge"));
    assert!(sample_lines(&output, "wordpress_user_sessions_total").is_empty());
    assert!(!sample_lines(&output, "wordpress_users_total").is_empty());
}

#[tokio::test]
async fn test_removed_statuses_disappear_on_next_scrape() {
    let (collector, source) = seeded_shop(false);

    let first = collector.scrape().await.unwrap();
    assert_eq!(sample_lines(&first, "wordpress_order_type_total").len(), 2);

    source.set_grouped(
        collector.query_for(MetricId::OrderType),
        [("wc-refunded", 1.0)],
    );
    let second = collector.scrape().await.unwrap();
    assert_eq!(
        sample_lines(&second, "wordpress_order_type_total"),
        vec!["wordpress_order_type_total{type=\"refunded\"} 1"]
    );
}

#[tokio::test]
async fn test_failed_scrape_recovers() {
    let (collector, source) = seeded_shop(false);

    source.fail_query(collector.query_for(MetricId::DatabaseSize));
    let err = collector.scrape().await.unwrap_err();
    assert_eq!(err.metric(), Some("wordpress_database_size_bytes"));

    source.clear_failures();
    let output = collector.scrape().await.unwrap();
    assert!(output.contains("wordpress_exporter_scrapes_total 2"));
    assert!(output.contains("wordpress_exporter_scrape_errors_total 1"));
}

#[tokio::test]
async fn test_every_emitted_metric_is_described() {
    let (collector, _source) = seeded_shop(false);

    let samples = collector.collect().await.unwrap();
    for sample in &samples {
        assert!(
            collector.describe().iter().any(|d| d.id == sample.metric),
            "{:?} was not described",
            sample.metric
        );
    }

    let grouped = MetricId::ALL
        .iter()
        .filter(|id| id.shape() == QueryShape::Grouped)
        .count();
    assert!(samples.len() > grouped);
}

#[tokio::test]
async fn test_concurrent_scrapes() {
    let (collector, _source) = seeded_shop(false);
    let expected = collector.collect().await.unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let collector = collector.clone();
            tokio::spawn(async move { collector.collect().await.unwrap() })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap(), expected);
    }
}

#[tokio::test]
async fn test_http_server_metrics_endpoint() {
    let (collector, _source) = seeded_shop(false);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0".parse::<SocketAddr>().unwrap())
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let server = HttpServer::new(collector, addr, "/metrics".to_string());
    let server_handle = tokio::spawn(async move {
        let _ = server.serve(listener, shutdown_rx).await;
    });

    let client = reqwest::Client::new();
    let response = client
        .get(format!("http://{}/metrics", addr))
        .send()
        .await
        .unwrap();

    assert!(response.status().is_success());
    let body = response.text().await.unwrap();
    assert!(body.contains("wordpress_posts_total{type=\"publish\"} 2"));

    let _ = shutdown_tx.send(true);
    let _ = tokio::time::timeout(Duration::from_secs(1), server_handle).await;
}
