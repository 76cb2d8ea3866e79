//! Error types for the WordPress exporter.

use thiserror::Error;

/// Errors raised by a [`MetricSource`](crate::source::MetricSource) or one of
/// its sessions.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Driver-level failure (connect, execute, decode).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A column expected to hold a number held something else (or NULL).
    #[error("Column {column} is not numeric")]
    NonNumeric { column: usize },

    /// The source refused to run the query.
    #[error("{0}")]
    Unavailable(String),
}

/// Errors that abort a single collection cycle.
///
/// None of these are fatal to the process: the scrape that hit them fails
/// and the next scrape starts from scratch.
#[derive(Debug, Error)]
pub enum CollectError {
    /// No database session could be opened for this scrape.
    #[error("Failed to open database session: {0}")]
    Connect(#[source] SourceError),

    /// A query failed to execute or its rows could not be decoded.
    #[error("Query for {metric} failed: {source}")]
    Query {
        metric: String,
        #[source]
        source: SourceError,
    },

    /// A scalar query came back without a row.
    #[error("Query for {metric} returned no rows")]
    EmptyResult { metric: String },
}

impl CollectError {
    /// Name of the metric whose query failed, if the failure is query-scoped.
    pub fn metric(&self) -> Option<&str> {
        match self {
            Self::Connect(_) => None,
            Self::Query { metric, .. } | Self::EmptyResult { metric } => Some(metric),
        }
    }
}

/// Result type alias for collection cycles.
pub type Result<T> = std::result::Result<T, CollectError>;
