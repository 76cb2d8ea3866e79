//! Catalog of WordPress metrics and the SQL queries that feed them.
//!
//! The catalog is fixed: every metric is declared regardless of
//! configuration, so [`MetricRegistry::describe`] returns the same
//! definitions on every call. Each definition is bound to exactly one query
//! template, rendered with the operator-supplied table prefix.
//!
//! The table prefix and database name are substituted into the SQL text
//! verbatim. They come from the operator's configuration and are trusted;
//! never feed them from an untrusted source.

/// Default namespace prepended to every metric name.
pub const DEFAULT_NAMESPACE: &str = "wordpress";

/// Sanitize a metric name to be Prometheus-compatible.
///
/// Prometheus metric names must match `[a-zA-Z_:][a-zA-Z0-9_:]*`.
/// This function:
/// - Replaces invalid characters with underscores
/// - Ensures the name starts with a letter or underscore
/// - Collapses multiple underscores into one
pub fn sanitize_metric_name(name: &str) -> String {
    let mut result = String::with_capacity(name.len() + 1);
    let mut last_was_underscore = false;
    let mut chars = name.chars().peekable();

    // A leading digit is kept but prefixed with an underscore
    if let Some(&first) = chars.peek()
        && first.is_ascii_digit()
    {
        result.push('_');
        last_was_underscore = true;
    }

    for c in chars {
        let is_valid_char = c.is_ascii_alphanumeric() || c == '_' || c == ':';

        if is_valid_char {
            if c == '_' {
                if !last_was_underscore {
                    result.push(c);
                    last_was_underscore = true;
                }
            } else {
                result.push(c);
                last_was_underscore = false;
            }
        } else if !last_was_underscore {
            result.push('_');
            last_was_underscore = true;
        }
    }

    while result.ends_with('_') {
        result.pop();
    }

    result
}

/// Build a fully qualified metric name: `{namespace}_{name}`.
pub fn build_metric_name(namespace: &str, name: &str) -> String {
    let namespace = sanitize_metric_name(namespace);

    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{}_{}", namespace, name)
    }
}

/// Prometheus value kind of a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
}

impl MetricKind {
    /// Get the TYPE comment string for Prometheus exposition format.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
        }
    }
}

/// Shape of the result set a metric's query produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryShape {
    /// Exactly one row with one numeric column.
    Scalar,
    /// Any number of `(label, value)` rows.
    Grouped,
}

/// Rewrite applied to a raw label value before it becomes a sample label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelTransform {
    /// Use the value as returned.
    Identity,
    /// Replace an empty value with a fixed default.
    DefaultIfEmpty(&'static str),
    /// Drop a fixed number of leading characters.
    StripPrefix(usize),
}

impl LabelTransform {
    /// Apply the transform to a raw label value.
    pub fn apply(&self, raw: &str) -> String {
        match self {
            LabelTransform::Identity => raw.to_string(),
            LabelTransform::DefaultIfEmpty(default) if raw.is_empty() => default.to_string(),
            LabelTransform::DefaultIfEmpty(_) => raw.to_string(),
            LabelTransform::StripPrefix(count) => raw.chars().skip(*count).collect(),
        }
    }
}

/// Identifier of every metric the exporter knows about.
///
/// Declaration order is the order queries run in during a collection cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetricId {
    Users,
    Customers,
    Comments,
    Posts,
    UserSessions,
    Webhooks,
    OptionAutoload,
    OptionAutoloadBytes,
    DatabaseSize,
    PostsType,
    OrderType,
}

impl MetricId {
    /// All metrics, in collection order.
    pub const ALL: [MetricId; 11] = [
        MetricId::Users,
        MetricId::Customers,
        MetricId::Comments,
        MetricId::Posts,
        MetricId::UserSessions,
        MetricId::Webhooks,
        MetricId::OptionAutoload,
        MetricId::OptionAutoloadBytes,
        MetricId::DatabaseSize,
        MetricId::PostsType,
        MetricId::OrderType,
    ];

    /// Metric name without namespace.
    pub fn name(self) -> &'static str {
        match self {
            MetricId::Users => "users_total",
            MetricId::Customers => "customers_total",
            MetricId::Comments => "comments_total",
            MetricId::Posts => "posts_total",
            MetricId::UserSessions => "user_sessions_total",
            MetricId::Webhooks => "webhooks_total",
            MetricId::OptionAutoload => "option_autoload_total",
            MetricId::OptionAutoloadBytes => "option_autoload_bytes",
            MetricId::DatabaseSize => "database_size_bytes",
            MetricId::PostsType => "posts_type_total",
            MetricId::OrderType => "order_type_total",
        }
    }

    pub fn help(self) -> &'static str {
        match self {
            MetricId::Users => "Shows the number of registered users in the WordPress site",
            MetricId::Customers => "Shows the number of customers in the WordPress site",
            MetricId::Comments => "Shows the number of total comments in the WordPress site",
            MetricId::Posts => "Shows the number of total posts in the WordPress site",
            MetricId::UserSessions => "Shows the number of sessions in the WordPress site",
            MetricId::Webhooks => "Shows the number of webhooks in the WordPress site",
            MetricId::OptionAutoload => "Shows the number of options with autoload",
            MetricId::OptionAutoloadBytes => "Shows the size in bytes of options with autoload",
            MetricId::DatabaseSize => "Shows the size in bytes of the WordPress database",
            MetricId::PostsType => "Shows the number of total posts type in the WordPress site",
            MetricId::OrderType => "Shows the number of total orders type in WooCommerce",
        }
    }

    /// Every metric is exported as a gauge: the counts can go down.
    pub fn kind(self) -> MetricKind {
        MetricKind::Gauge
    }

    /// Label dimension for grouped metrics.
    pub fn label(self) -> Option<&'static str> {
        match self {
            MetricId::Comments | MetricId::Posts | MetricId::PostsType | MetricId::OrderType => {
                Some("type")
            }
            MetricId::Webhooks => Some("status"),
            _ => None,
        }
    }

    pub fn shape(self) -> QueryShape {
        if self.label().is_some() {
            QueryShape::Grouped
        } else {
            QueryShape::Scalar
        }
    }

    pub fn label_transform(self) -> LabelTransform {
        match self {
            // Legacy comments carry an empty comment_type
            MetricId::Comments => LabelTransform::DefaultIfEmpty("comment"),
            // WooCommerce order statuses are stored as "wc-<status>"
            MetricId::OrderType => LabelTransform::StripPrefix(3),
            _ => LabelTransform::Identity,
        }
    }

    /// Whether the metric depends on WooCommerce session storage and can be
    /// skipped by configuration.
    pub fn is_optional(self) -> bool {
        matches!(self, MetricId::UserSessions)
    }

    /// Render the SQL for this metric.
    ///
    /// Grouped queries return `(label, value)`, scalar queries a single
    /// `value` column. Sums are coalesced so empty tables yield `0`.
    pub fn query(self, table_prefix: &str, db_name: &str) -> String {
        let p = table_prefix;
        match self {
            MetricId::Users => format!("SELECT COUNT(*) AS value FROM {p}users"),
            MetricId::Customers => format!(
                "SELECT COUNT(*) AS value FROM {p}users \
                 INNER JOIN {p}usermeta ON {p}users.ID = {p}usermeta.user_id \
                 WHERE {p}usermeta.meta_key = '{p}capabilities' \
                 AND {p}usermeta.meta_value LIKE '%customer%'"
            ),
            MetricId::Comments => format!(
                "SELECT comment_type AS label, COUNT(*) AS value FROM {p}comments \
                 GROUP BY comment_type"
            ),
            MetricId::Posts => format!(
                "SELECT post_status AS label, COUNT(*) AS value FROM {p}posts \
                 WHERE post_type = 'post' GROUP BY post_status"
            ),
            MetricId::UserSessions => {
                format!("SELECT COUNT(*) AS value FROM {p}woocommerce_sessions")
            }
            MetricId::Webhooks => format!(
                "SELECT post_status AS label, COUNT(*) AS value FROM {p}posts \
                 WHERE post_type = 'scheduled-action' GROUP BY post_status"
            ),
            MetricId::OptionAutoload => {
                format!("SELECT COUNT(*) AS value FROM {p}options WHERE autoload = 'yes'")
            }
            MetricId::OptionAutoloadBytes => format!(
                "SELECT CAST(COALESCE(SUM(LENGTH(option_value)), 0) AS SIGNED) AS value \
                 FROM {p}options WHERE autoload = 'yes'"
            ),
            MetricId::DatabaseSize => format!(
                "SELECT CAST(COALESCE(SUM(data_length + index_length), 0) AS SIGNED) AS value \
                 FROM information_schema.tables WHERE table_schema = '{db_name}'"
            ),
            MetricId::PostsType => format!(
                "SELECT post_type AS label, COUNT(*) AS value FROM {p}posts GROUP BY post_type"
            ),
            MetricId::OrderType => format!(
                "SELECT post_status AS label, COUNT(*) AS value FROM {p}posts \
                 WHERE post_type = 'shop_order' GROUP BY post_status"
            ),
        }
    }
}

/// A declared metric.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricDesc {
    pub id: MetricId,
    /// Fully qualified name, including the namespace.
    pub name: String,
    pub help: &'static str,
    pub kind: MetricKind,
    /// Label dimension for grouped metrics.
    pub label: Option<&'static str>,
}

/// Immutable catalog of every metric the exporter can emit.
#[derive(Debug, Clone)]
pub struct MetricRegistry {
    namespace: String,
    descs: Vec<MetricDesc>,
}

impl MetricRegistry {
    /// Create the registry with the default `wordpress` namespace.
    pub fn new() -> Self {
        Self::with_namespace(DEFAULT_NAMESPACE)
    }

    /// Create the registry with a custom namespace.
    pub fn with_namespace(namespace: &str) -> Self {
        let descs = MetricId::ALL
            .iter()
            .map(|&id| MetricDesc {
                id,
                name: build_metric_name(namespace, id.name()),
                help: id.help(),
                kind: id.kind(),
                label: id.label(),
            })
            .collect();

        Self {
            namespace: namespace.to_string(),
            descs,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Every declared metric, in collection order.
    pub fn describe(&self) -> &[MetricDesc] {
        &self.descs
    }

    /// Look up the definition of a metric.
    pub fn get(&self, id: MetricId) -> &MetricDesc {
        // descs is built from MetricId::ALL, which follows declaration order
        &self.descs[id as usize]
    }
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::new()
    }
}
