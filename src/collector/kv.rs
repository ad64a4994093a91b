//! Numeric key/value export.

use consul_exporter_client::KvPair;
use consul_exporter_types::{catalog, Metric};
use tracing::{debug, error};

use super::{BranchOutcome, Exporter, MetricSink};

impl Exporter {
    /// Emit `catalog_kv` for every numeric value under the configured
    /// prefix whose key matches the filter.
    ///
    /// Non-numeric values are expected and dropped without noise.
    pub(crate) async fn collect_key_values(&self, sink: &MetricSink) -> BranchOutcome {
        let prefix = self.config.kv_prefix.as_str();
        if prefix.is_empty() {
            return BranchOutcome::Disabled;
        }

        let pairs = match self.api.kv_list(prefix, &self.config.query_options).await {
            Ok(pairs) => pairs,
            Err(e) => {
                error!("Error fetching key/values: {}", e);
                return BranchOutcome::skipped(e);
            }
        };

        for pair in pairs.iter().filter(|p| self.key_selected(&p.key)) {
            match numeric_value(pair) {
                Some(value) => {
                    sink.emit(Metric::labeled(&catalog::CATALOG_KV, value, [pair.key.as_str()]))
                        .await
                }
                None => debug!("Ignoring non-numeric value of {}", pair.key),
            }
        }

        BranchOutcome::Completed
    }

    fn key_selected(&self, key: &str) -> bool {
        self.config
            .kv_filter
            .as_ref()
            .map_or(true, |filter| filter.is_match(key))
    }
}

fn numeric_value(pair: &KvPair) -> Option<f64> {
    pair.value_str()?
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}
