//! Prometheus text exposition format (version 0.0.4).

use std::collections::BTreeMap;
use std::fmt::Write;

use crate::collector::{Sample, ScrapeStats};
use crate::registry::{MetricDesc, MetricId, MetricKind, MetricRegistry, build_metric_name};

/// Content type of the rendered output.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Render the described metrics with this scrape's samples.
///
/// Only metrics present in `registry` are written; each one gets its HELP
/// and TYPE lines even when the scrape produced no samples for it. Exporter
/// self-metrics follow the catalog.
pub fn render(registry: &MetricRegistry, samples: &[Sample], stats: &ScrapeStats) -> String {
    let mut output = String::with_capacity(samples.len() * 64 + 2048);

    let mut by_metric: BTreeMap<MetricId, Vec<&Sample>> = BTreeMap::new();
    for sample in samples {
        by_metric.entry(sample.metric).or_default().push(sample);
    }

    for desc in registry.describe() {
        write_header(&mut output, &desc.name, desc.help, desc.kind);

        let Some(series) = by_metric.get_mut(&desc.id) else {
            continue;
        };
        series.sort_by(|a, b| a.label.cmp(&b.label));

        for sample in series.iter() {
            write_sample(&mut output, desc, sample);
        }
    }

    write_exporter_stats(&mut output, registry, stats);
    output
}

fn write_header(output: &mut String, name: &str, help: &str, kind: MetricKind) {
    writeln!(output, "# HELP {} {}", name, escape_help(help)).ok();
    writeln!(output, "# TYPE {} {}", name, kind.as_str()).ok();
}

fn write_sample(output: &mut String, desc: &MetricDesc, sample: &Sample) {
    match (desc.label, &sample.label) {
        (Some(label_name), Some(label_value)) => {
            writeln!(
                output,
                "{}{{{}=\"{}\"}} {}",
                desc.name,
                label_name,
                escape_label_value(label_value),
                format_value(sample.value)
            )
            .ok();
        }
        _ => {
            writeln!(output, "{} {}", desc.name, format_value(sample.value)).ok();
        }
    }
}

fn write_exporter_stats(output: &mut String, registry: &MetricRegistry, stats: &ScrapeStats) {
    let namespace = registry.namespace();

    let duration = build_metric_name(namespace, "exporter_scrape_duration_seconds");
    write_header(
        output,
        &duration,
        "Duration of the last collection cycle",
        MetricKind::Gauge,
    );
    writeln!(
        output,
        "{} {}",
        duration,
        format_value(stats.last_duration.as_secs_f64())
    )
    .ok();

    let scrapes = build_metric_name(namespace, "exporter_scrapes_total");
    write_header(
        output,
        &scrapes,
        "Total number of collection cycles",
        MetricKind::Counter,
    );
    writeln!(output, "{} {}", scrapes, stats.scrapes_total).ok();

    let errors = build_metric_name(namespace, "exporter_scrape_errors_total");
    write_header(
        output,
        &errors,
        "Total number of collection cycles aborted by an error",
        MetricKind::Counter,
    );
    writeln!(output, "{} {}", errors, stats.scrape_errors_total).ok();
}

/// Escape special characters in label values.
fn escape_label_value(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\n' => result.push_str("\\n"),
            _ => result.push(c),
        }
    }
    result
}

/// Escape HELP text: only backslash and newline are special there.
fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}

/// Format a floating point value for Prometheus.
fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value.is_sign_positive() {
            "+Inf".to_string()
        } else {
            "-Inf".to_string()
        }
    } else if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric_lines<'a>(output: &'a str, name: &str) -> Vec<&'a str> {
        output
            .lines()
            .filter(|l| !l.starts_with('#'))
            .filter(|l| l.split(['{', ' ']).next() == Some(name))
            .collect()
    }

    #[test]
    fn test_render_scalar_and_grouped() {
        let registry = MetricRegistry::new();
        let samples = vec![
            Sample::scalar(MetricId::Users, 12.0),
            Sample::labelled(MetricId::Posts, "publish", 2.0),
            Sample::labelled(MetricId::Posts, "draft", 1.0),
        ];

        let output = render(&registry, &samples, &ScrapeStats::default());

        assert!(output.contains("# TYPE wordpress_users_total gauge"));
        assert!(output.contains(
            "# HELP wordpress_users_total Shows the number of registered users in the WordPress site"
        ));
        assert_eq!(
            metric_lines(&output, "wordpress_users_total"),
            vec!["wordpress_users_total 12"]
        );
        assert_eq!(
            metric_lines(&output, "wordpress_posts_total"),
            vec![
                "wordpress_posts_total{type=\"draft\"} 1",
                "wordpress_posts_total{type=\"publish\"} 2",
            ]
        );
    }

    #[test]
    fn test_render_uses_label_dimension() {
        let registry = MetricRegistry::new();
        let samples = vec![Sample::labelled(MetricId::Webhooks, "pending", 3.0)];

        let output = render(&registry, &samples, &ScrapeStats::default());
        assert!(output.contains("wordpress_webhooks_total{status=\"pending\"} 3"));
    }

    #[test]
    fn test_render_declares_metrics_without_samples() {
        let registry = MetricRegistry::new();
        let output = render(&registry, &[], &ScrapeStats::default());

        for desc in registry.describe() {
            assert!(output.contains(&format!("# TYPE {} gauge", desc.name)));
        }
        assert!(metric_lines(&output, "wordpress_user_sessions_total").is_empty());
    }

    #[test]
    fn test_render_exporter_stats() {
        let registry = MetricRegistry::with_namespace("shop");
        let stats = ScrapeStats {
            scrapes_total: 5,
            scrape_errors_total: 2,
            ..Default::default()
        };

        let output = render(&registry, &[], &stats);
        assert!(output.contains("# TYPE shop_exporter_scrapes_total counter"));
        assert!(output.contains("shop_exporter_scrapes_total 5"));
        assert!(output.contains("shop_exporter_scrape_errors_total 2"));
        assert!(output.contains("shop_exporter_scrape_duration_seconds 0"));
    }

    #[test]
    fn test_render_escapes_label_values() {
        let registry = MetricRegistry::new();
        let samples = vec![Sample::labelled(MetricId::PostsType, "we\"ird\\type", 1.0)];

        let output = render(&registry, &samples, &ScrapeStats::default());
        assert!(output.contains("wordpress_posts_type_total{type=\"we\\\"ird\\\\type\"} 1"));
    }

    #[test]
    fn test_escape_label_value() {
        assert_eq!(escape_label_value("simple"), "simple");
        assert_eq!(escape_label_value("with\"quote"), "with\\\"quote");
        assert_eq!(escape_label_value("with\\backslash"), "with\\\\backslash");
        assert_eq!(escape_label_value("with\nnewline"), "with\\nnewline");
    }

    #[test]
    fn test_escape_help() {
        assert_eq!(escape_help("plain"), "plain");
        assert_eq!(escape_help("a\\b\nc"), "a\\\\b\\nc");
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(42.0), "42");
        assert_eq!(format_value(2.5), "2.5");
        assert_eq!(format_value(1_073_741_824.0), "1073741824");
        assert_eq!(format_value(f64::NAN), "NaN");
        assert_eq!(format_value(f64::INFINITY), "+Inf");
        assert_eq!(format_value(f64::NEG_INFINITY), "-Inf");
    }
}
