//! Service instance health summaries.

use consul_exporter_client::{QueryOptions, ServiceEntry};
use consul_exporter_types::{catalog, render_tags, HealthStatus, Metric, UnmappedStatus};
use tracing::{debug, error, warn};

use super::{BranchOutcome, Exporter, MetricSink, ServiceReport};

impl Exporter {
    /// Emit one `catalog_service_node_healthy` per instance of `service`.
    ///
    /// Costs one query per service, which is why it can be switched off.
    pub(crate) async fn collect_service_health(
        &self,
        sink: &MetricSink,
        options: &QueryOptions,
        service: String,
    ) -> ServiceReport {
        debug!("Fetching health summary for: {}", service);

        let mut report = ServiceReport {
            service,
            outcome: BranchOutcome::Completed,
            instances: 0,
            unmapped: 0,
        };

        let entries = match self.api.service_health(&report.service, options).await {
            Ok(entries) => entries,
            Err(e) => {
                error!("Failed to query service health: {}", e);
                report.outcome = BranchOutcome::skipped(e);
                return report;
            }
        };

        let datacenter = options.datacenter.as_deref().unwrap_or_default();
        for entry in &entries {
            match instance_metric(entry, datacenter) {
                Ok(metric) => {
                    sink.emit(metric).await;
                    report.instances += 1;
                }
                Err(e) => {
                    warn!(
                        "Skipping {} on {}: {}",
                        entry.service.id, entry.node.node, e
                    );
                    report.unmapped += 1;
                }
            }
        }

        report
    }
}

fn instance_metric(entry: &ServiceEntry, datacenter: &str) -> Result<Metric, UnmappedStatus> {
    let status = HealthStatus::aggregate(
        entry
            .checks
            .iter()
            .map(|c| (c.check_id.as_str(), c.status.as_str())),
    )?;
    let tags = render_tags(&entry.service.tags);

    Ok(Metric::labeled(
        &catalog::CATALOG_SERVICE_NODE_HEALTHY,
        status.value(),
        [
            entry.service.id.as_str(),
            entry.node.node.as_str(),
            entry.service.service.as_str(),
            datacenter,
            tags.as_str(),
        ],
    ))
}
