//! Database access for the collection cycle.
//!
//! A [`MetricSource`] hands out one [`MetricSession`] per scrape. The MySQL
//! implementation keeps a lazily connected pool; queries are always executed
//! against the live database, nothing is cached between scrapes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions, MySqlRow};
use sqlx::pool::PoolConnection;
use sqlx::{MySql, MySqlPool, Row};
use tracing::{debug, trace};

use crate::config::DatabaseConfig;
use crate::error::SourceError;

/// Factory for per-scrape database sessions.
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Open a session for one collection cycle.
    async fn session(&self) -> Result<Box<dyn MetricSession>, SourceError>;
}

/// A database session scoped to a single collection cycle.
#[async_trait]
pub trait MetricSession: Send {
    /// Run a scalar query.
    ///
    /// Returns the first column of the first row, or `None` if the query
    /// returned no rows.
    async fn fetch_scalar(&mut self, sql: &str) -> Result<Option<f64>, SourceError>;

    /// Run a grouped query returning `(label, value)` rows.
    async fn fetch_grouped(&mut self, sql: &str) -> Result<Vec<(String, f64)>, SourceError>;
}

/// MySQL/MariaDB source backed by a sqlx pool.
#[derive(Debug, Clone)]
pub struct MySqlSource {
    pool: MySqlPool,
}

impl MySqlSource {
    /// Create the source. No connection is made until the first scrape.
    pub fn new(config: &DatabaseConfig) -> Self {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.name);

        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect_lazy_with(options);

        debug!(
            host = %config.host,
            port = config.port,
            database = %config.name,
            user = %config.user,
            "Created MySQL connection pool"
        );

        Self { pool }
    }

    /// Close all pooled connections.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl MetricSource for MySqlSource {
    async fn session(&self) -> Result<Box<dyn MetricSession>, SourceError> {
        let conn = self.pool.acquire().await?;
        Ok(Box::new(MySqlSession { conn }))
    }
}

struct MySqlSession {
    conn: PoolConnection<MySql>,
}

#[async_trait]
impl MetricSession for MySqlSession {
    async fn fetch_scalar(&mut self, sql: &str) -> Result<Option<f64>, SourceError> {
        trace!(sql, "Running scalar query");
        let row = sqlx::query(sql).fetch_optional(&mut *self.conn).await?;
        row.map(|row| decode_numeric(&row, 0)).transpose()
    }

    async fn fetch_grouped(&mut self, sql: &str) -> Result<Vec<(String, f64)>, SourceError> {
        trace!(sql, "Running grouped query");
        let rows = sqlx::query(sql).fetch_all(&mut *self.conn).await?;
        rows.iter()
            .map(|row| Ok((decode_label(row, 0)?, decode_numeric(row, 1)?)))
            .collect()
    }
}

/// Decode a numeric column.
///
/// `COUNT(*)` comes back as `BIGINT`, casts as signed or unsigned `BIGINT`
/// depending on the server, and some MariaDB versions hand `DECIMAL`
/// aggregates over as text.
fn decode_numeric(row: &MySqlRow, index: usize) -> Result<f64, SourceError> {
    if let Ok(value) = row.try_get::<i64, _>(index) {
        return Ok(value as f64);
    }
    if let Ok(value) = row.try_get::<u64, _>(index) {
        return Ok(value as f64);
    }
    if let Ok(value) = row.try_get::<f64, _>(index) {
        return Ok(value);
    }
    match row.try_get::<String, _>(index) {
        Ok(text) => text
            .trim()
            .parse()
            .map_err(|_| SourceError::NonNumeric { column: index }),
        Err(_) => Err(SourceError::NonNumeric { column: index }),
    }
}

/// Decode a label column. Binary collations yield bytes; NULL becomes empty.
fn decode_label(row: &MySqlRow, index: usize) -> Result<String, SourceError> {
    if let Ok(label) = row.try_get::<Option<String>, _>(index) {
        return Ok(label.unwrap_or_default());
    }
    let bytes = row.try_get::<Option<Vec<u8>>, _>(index)?;
    Ok(bytes
        .map(|b| String::from_utf8_lossy(&b).into_owned())
        .unwrap_or_default())
}

#[derive(Debug, Default)]
struct StaticData {
    scalars: HashMap<String, f64>,
    grouped: HashMap<String, Vec<(String, f64)>>,
    failing: HashSet<String>,
    unavailable: bool,
    executed: Vec<String>,
}

/// In-memory source serving canned results keyed by SQL text.
///
/// Results can be changed between scrapes. Used by tests and for running
/// the exporter without a database.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    data: Arc<RwLock<StaticData>>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `value` for the scalar query `sql`.
    pub fn set_scalar(&self, sql: impl Into<String>, value: f64) {
        self.data.write().scalars.insert(sql.into(), value);
    }

    /// Serve `rows` for the grouped query `sql`, replacing previous rows.
    pub fn set_grouped<L: Into<String>>(
        &self,
        sql: impl Into<String>,
        rows: impl IntoIterator<Item = (L, f64)>,
    ) {
        let rows = rows.into_iter().map(|(l, v)| (l.into(), v)).collect();
        self.data.write().grouped.insert(sql.into(), rows);
    }

    /// Make the query `sql` fail until [`clear_failures`](Self::clear_failures).
    pub fn fail_query(&self, sql: impl Into<String>) {
        self.data.write().failing.insert(sql.into());
    }

    pub fn clear_failures(&self) {
        self.data.write().failing.clear();
    }

    /// Refuse to open sessions, simulating a database that is down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.data.write().unavailable = unavailable;
    }

    /// Every query executed so far, in order.
    pub fn executed(&self) -> Vec<String> {
        self.data.read().executed.clone()
    }

    fn check(&self, sql: &str) -> Result<(), SourceError> {
        let mut data = self.data.write();
        data.executed.push(sql.to_string());
        if data.failing.contains(sql) {
            return Err(SourceError::Unavailable(format!("query rejected: {}", sql)));
        }
        Ok(())
    }
}

#[async_trait]
impl MetricSource for StaticSource {
    async fn session(&self) -> Result<Box<dyn MetricSession>, SourceError> {
        if self.data.read().unavailable {
            return Err(SourceError::Unavailable("database unavailable".to_string()));
        }
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl MetricSession for StaticSource {
    async fn fetch_scalar(&mut self, sql: &str) -> Result<Option<f64>, SourceError> {
        self.check(sql)?;
        Ok(self.data.read().scalars.get(sql).copied())
    }

    async fn fetch_grouped(&mut self, sql: &str) -> Result<Vec<(String, f64)>, SourceError> {
        self.check(sql)?;
        Ok(self.data.read().grouped.get(sql).cloned().unwrap_or_default())
    }
}
