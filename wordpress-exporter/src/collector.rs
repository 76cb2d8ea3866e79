//! Collection cycle: run the catalog's queries and turn results into samples.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{debug, error, trace};

use crate::config::DatabaseConfig;
use crate::error::{CollectError, Result};
use crate::exposition;
use crate::registry::{MetricDesc, MetricId, MetricRegistry, QueryShape};
use crate::source::{MetricSession, MetricSource};

/// One observation produced during a scrape.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub metric: MetricId,
    /// Label value for grouped metrics.
    pub label: Option<String>,
    pub value: f64,
}

impl Sample {
    pub fn scalar(metric: MetricId, value: f64) -> Self {
        Self {
            metric,
            label: None,
            value,
        }
    }

    pub fn labelled(metric: MetricId, label: impl Into<String>, value: f64) -> Self {
        Self {
            metric,
            label: Some(label.into()),
            value,
        }
    }
}

/// Scrape statistics.
#[derive(Debug, Clone, Default)]
pub struct ScrapeStats {
    /// Total scrapes attempted.
    pub scrapes_total: u64,
    /// Scrapes aborted by an error.
    pub scrape_errors_total: u64,
    /// Duration of the most recent scrape.
    pub last_duration: Duration,
}

/// Runs collection cycles against a [`MetricSource`].
///
/// Holds only immutable configuration and the metric catalog; every cycle
/// opens its own session and builds its own sample buffer, so concurrent
/// scrapes need no coordination.
pub struct Collector {
    registry: MetricRegistry,
    config: DatabaseConfig,
    source: Arc<dyn MetricSource>,
    stats: RwLock<ScrapeStats>,
}

/// Create a shareable collector handle.
pub type SharedCollector = Arc<Collector>;

impl Collector {
    /// Create a new collector.
    pub fn new(
        registry: MetricRegistry,
        config: DatabaseConfig,
        source: Arc<dyn MetricSource>,
    ) -> Self {
        Self {
            registry,
            config,
            source,
            stats: RwLock::new(ScrapeStats::default()),
        }
    }

    pub fn registry(&self) -> &MetricRegistry {
        &self.registry
    }

    /// Every metric the collector can emit.
    pub fn describe(&self) -> &[MetricDesc] {
        self.registry.describe()
    }

    /// SQL executed for `id` with the configured prefix and schema.
    pub fn query_for(&self, id: MetricId) -> String {
        id.query(&self.config.table_prefix, &self.config.name)
    }

    /// Run one collection cycle.
    ///
    /// Either every sample of the cycle is returned or the first error is;
    /// partial results are discarded.
    pub async fn collect(&self) -> Result<Vec<Sample>> {
        let mut session = self.source.session().await.map_err(CollectError::Connect)?;
        let mut samples = Vec::with_capacity(self.registry.describe().len());

        for desc in self.registry.describe() {
            if desc.id.is_optional() && self.config.skip_woocommerce {
                trace!(metric = %desc.name, "Skipping optional metric");
                continue;
            }

            let sql = self.query_for(desc.id);
            match desc.id.shape() {
                QueryShape::Scalar => {
                    samples.push(query_scalar(session.as_mut(), desc, &sql).await?);
                }
                QueryShape::Grouped => {
                    samples.extend(query_grouped(session.as_mut(), desc, &sql).await?);
                }
            }
        }

        Ok(samples)
    }

    /// Run a cycle and render it in Prometheus exposition format.
    pub async fn scrape(&self) -> Result<String> {
        let started = Instant::now();
        let result = self.collect().await;
        let elapsed = started.elapsed();

        let stats = {
            let mut stats = self.stats.write();
            stats.scrapes_total += 1;
            stats.last_duration = elapsed;
            if result.is_err() {
                stats.scrape_errors_total += 1;
            }
            stats.clone()
        };

        match result {
            Ok(samples) => {
                debug!(
                    samples = samples.len(),
                    duration_ms = elapsed.as_millis() as u64,
                    "Scrape complete"
                );
                Ok(exposition::render(&self.registry, &samples, &stats))
            }
            Err(e) => {
                error!(
                    metric = e.metric().unwrap_or("-"),
                    error = %e,
                    "Scrape failed"
                );
                Err(e)
            }
        }
    }

    /// Check that a database session can be opened.
    pub async fn check_database(&self) -> Result<()> {
        self.source
            .session()
            .await
            .map(|_| ())
            .map_err(CollectError::Connect)
    }

    /// Get scrape statistics.
    pub fn stats(&self) -> ScrapeStats {
        self.stats.read().clone()
    }
}

async fn query_scalar(
    session: &mut dyn MetricSession,
    desc: &MetricDesc,
    sql: &str,
) -> Result<Sample> {
    let value = session
        .fetch_scalar(sql)
        .await
        .map_err(|source| CollectError::Query {
            metric: desc.name.clone(),
            source,
        })?
        .ok_or_else(|| CollectError::EmptyResult {
            metric: desc.name.clone(),
        })?;

    trace!(metric = %desc.name, value, "Scalar query complete");
    Ok(Sample::scalar(desc.id, value))
}

/// The label set is rebuilt from this cycle's rows only. Rows that collapse
/// onto the same label after transformation are summed.
async fn query_grouped(
    session: &mut dyn MetricSession,
    desc: &MetricDesc,
    sql: &str,
) -> Result<Vec<Sample>> {
    let rows = session
        .fetch_grouped(sql)
        .await
        .map_err(|source| CollectError::Query {
            metric: desc.name.clone(),
            source,
        })?;

    let transform = desc.id.label_transform();
    let mut by_label: BTreeMap<String, f64> = BTreeMap::new();
    for (raw, value) in rows {
        *by_label.entry(transform.apply(&raw)).or_insert(0.0) += value;
    }

    trace!(metric = %desc.name, series = by_label.len(), "Grouped query complete");
    Ok(by_label
        .into_iter()
        .map(|(label, value)| Sample::labelled(desc.id, label, value))
        .collect())
}
