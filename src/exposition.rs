//! Prometheus text exposition format.
//!
//! Every family is a gauge. Families are written in catalog order, samples
//! within a family sorted by label values so repeated scrapes diff cleanly.

use std::collections::BTreeMap;
use std::fmt::Write;

use consul_exporter_types::{catalog, Metric, MetricDesc};

/// Content type of the text exposition format.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Format samples as Prometheus exposition text.
///
/// Only families with at least one sample are written. Families outside
/// [`catalog::ALL`] follow the catalog ones, ordered by name.
pub fn format_prometheus(metrics: &[Metric], namespace: Option<&str>) -> String {
    let mut families: BTreeMap<(usize, &'static str), Vec<&Metric>> = BTreeMap::new();
    for metric in metrics {
        families
            .entry((family_rank(metric.desc), metric.name()))
            .or_default()
            .push(metric);
    }

    let mut output = String::new();
    for samples in families.values_mut() {
        samples.sort_by(|a, b| a.label_values.cmp(&b.label_values));

        let desc = samples[0].desc;
        let name = desc.fq_name(namespace);
        let _ = writeln!(output, "# HELP {} {}", name, escape_help(desc.help));
        let _ = writeln!(output, "# TYPE {} gauge", name);

        for metric in samples.iter() {
            output.push_str(&name);
            write_labels(&mut output, metric);
            let _ = writeln!(output, " {}", format_value(metric.value));
        }
    }

    output
}

fn family_rank(desc: &MetricDesc) -> usize {
    catalog::ALL
        .iter()
        .position(|d| d.name == desc.name)
        .unwrap_or(catalog::ALL.len())
}

fn write_labels(output: &mut String, metric: &Metric) {
    if metric.desc.labels.is_empty() {
        return;
    }

    output.push('{');
    for (i, (name, value)) in metric.labels().enumerate() {
        if i > 0 {
            output.push(',');
        }
        let _ = write!(output, "{}=\"{}\"", name, escape_label_value(value));
    }
    output.push('}');
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        value.to_string()
    }
}

/// Escape a label value for Prometheus format.
/// Backslash, double-quote, and newline must be escaped.
fn escape_label_value(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn escape_help(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\n', "\\n")
}
