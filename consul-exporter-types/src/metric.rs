//! Metric samples and their descriptors.

/// Static description of a metric family.
///
/// The label schema is fixed per family: every [`Metric`] built from a
/// descriptor carries exactly one value per entry in `labels`, in order.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct MetricDesc {
    /// Identifier without the exposition namespace (e.g. `raft_peers`).
    pub name: &'static str,
    /// Human readable description, rendered as `# HELP`.
    pub help: &'static str,
    /// Ordered label names.
    pub labels: &'static [&'static str],
}

impl MetricDesc {
    /// Fully qualified name under `namespace` (e.g. `consul_raft_peers`).
    pub fn fq_name(&self, namespace: Option<&str>) -> String {
        match namespace {
            Some(ns) if !ns.is_empty() => format!("{}_{}", ns, self.name),
            _ => self.name.to_string(),
        }
    }
}

/// A single gauge sample: descriptor, ordered label values, and value.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub desc: &'static MetricDesc,
    pub label_values: Vec<String>,
    pub value: f64,
}

impl Metric {
    /// Create an unlabeled sample.
    pub fn new(desc: &'static MetricDesc, value: f64) -> Self {
        Self::labeled(desc, value, core::iter::empty::<String>())
    }

    /// Create a sample with label values given in schema order.
    pub fn labeled<I, S>(desc: &'static MetricDesc, value: f64, label_values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let label_values: Vec<String> = label_values.into_iter().map(Into::into).collect();
        debug_assert_eq!(
            label_values.len(),
            desc.labels.len(),
            "label cardinality mismatch for {}",
            desc.name
        );
        Self {
            desc,
            label_values,
            value,
        }
    }

    /// The metric identifier (without namespace).
    pub fn name(&self) -> &'static str {
        self.desc.name
    }

    /// Look up a label value by label name.
    pub fn label(&self, name: &str) -> Option<&str> {
        self.desc
            .labels
            .iter()
            .position(|l| *l == name)
            .and_then(|i| self.label_values.get(i))
            .map(String::as_str)
    }

    /// Iterate over `(label name, label value)` pairs in schema order.
    pub fn labels(&self) -> impl Iterator<Item = (&'static str, &str)> + '_ {
        self.desc
            .labels
            .iter()
            .copied()
            .zip(self.label_values.iter().map(String::as_str))
    }
}
