//! Per-datacenter collection.

use consul_exporter_client::HealthCheck;
use consul_exporter_types::{catalog, render_tags, status_value, Metric, UnmappedStatus};
use tracing::{error, warn};

use super::{fan_out, BranchOutcome, DatacenterReport, Exporter, MetricSink};

impl Exporter {
    /// Collect node, catalog, and health metrics for one datacenter.
    ///
    /// Never fails: a failed node query drops only `serf_lan_members`, a
    /// failed catalog query ends this datacenter's branch, a failed check
    /// query drops the check metrics. Siblings are unaffected either way.
    pub(crate) async fn collect_datacenter(
        &self,
        sink: &MetricSink,
        datacenter: String,
    ) -> DatacenterReport {
        let options = self.config.query_options.in_datacenter(datacenter.as_str());
        let mut report = DatacenterReport::new(&datacenter);

        match self.api.nodes(&options).await {
            Ok(nodes) => {
                sink.emit(Metric::labeled(
                    &catalog::SERF_LAN_MEMBERS,
                    nodes.len() as f64,
                    [datacenter.as_str()],
                ))
                .await;
            }
            Err(e) => {
                warn!("Failed to query nodes in {}: {}", datacenter, e);
                report.nodes = BranchOutcome::skipped(e);
            }
        }

        let services = match self.api.services(&options).await {
            Ok(services) => services,
            Err(e) => {
                error!("Failed to query services in {}: {}", datacenter, e);
                report.catalog = BranchOutcome::skipped(e);
                report.checks = BranchOutcome::skipped("service catalog unavailable");
                return report;
            }
        };

        sink.emit(Metric::labeled(
            &catalog::CATALOG_SERVICES,
            services.len() as f64,
            [datacenter.as_str()],
        ))
        .await;

        if self.config.health_summary {
            let names: Vec<String> = services.into_keys().collect();
            let options = &options;
            report.health_summary = fan_out(names, self.config.max_concurrency, move |name| {
                self.collect_service_health(sink, options, name)
            })
            .await;
            report.health_summary.sort_by(|a, b| a.service.cmp(&b.service));
        }

        let checks = match self.api.checks(&options).await {
            Ok(checks) => checks,
            Err(e) => {
                error!("Failed to query service health: {}", e);
                report.checks = BranchOutcome::skipped(e);
                return report;
            }
        };

        for check in &checks {
            match check_metric(check, &datacenter) {
                Ok(metric) => sink.emit(metric).await,
                Err(e) => {
                    warn!(
                        "Skipping check {} on {} in {}: {}",
                        check.check_id, check.node, datacenter, e
                    );
                    report.unmapped_checks += 1;
                }
            }
        }

        report
    }
}

/// Metric for a raw check: node level without a service, service level with.
fn check_metric(check: &HealthCheck, datacenter: &str) -> Result<Metric, UnmappedStatus> {
    let value = status_value(&check.status)?;

    let metric = if check.is_node_check() {
        Metric::labeled(
            &catalog::HEALTH_NODE_STATUS,
            value,
            [
                check.check_id.as_str(),
                check.node.as_str(),
                check.status.as_str(),
                datacenter,
            ],
        )
    } else {
        let tags = render_tags(&check.service_tags);
        Metric::labeled(
            &catalog::HEALTH_SERVICE_STATUS,
            value,
            [
                check.check_id.as_str(),
                check.node.as_str(),
                check.service_id.as_str(),
                check.service_name.as_str(),
                check.status.as_str(),
                datacenter,
                tags.as_str(),
            ],
        )
    };

    Ok(metric)
}

#[cfg(test)]
mod tests {
    use super::super::fake::{check, instance, service_check, FakeConsul, FakeDatacenter};
    use super::super::CollectorConfig;
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Barrier;

    #[test]
    fn test_node_check_metric() {
        let metric = check_metric(&check("node-a", "serfHealth", "critical"), "dc1").unwrap();
        assert_eq!(metric.name(), "health_node_status");
        assert_eq!(metric.value, 3.0);
        assert_eq!(metric.label("check"), Some("serfHealth"));
        assert_eq!(metric.label("status"), Some("critical"));
        assert_eq!(metric.label("datacenter"), Some("dc1"));
    }

    #[test]
    fn test_service_check_metric() {
        let hc = service_check("node-a", "service:web-1", "warning", "web-1", "web", &["a", "b"]);
        let metric = check_metric(&hc, "dc1").unwrap();
        assert_eq!(metric.name(), "health_service_status");
        assert_eq!(metric.value, 2.0);
        assert_eq!(metric.label("service_id"), Some("web-1"));
        assert_eq!(metric.label("service_name"), Some("web"));
        assert_eq!(metric.label("status"), Some("warning"));
        assert_eq!(metric.label("datacenter"), Some("dc1"));
        assert_eq!(metric.label("tags"), Some(",a,b,"));
    }

    #[test]
    fn test_unmapped_check_status() {
        assert!(check_metric(&check("node-a", "serfHealth", "unknown"), "dc1").is_err());
    }

    #[tokio::test]
    async fn test_checks_are_emitted_per_kind() {
        let mut dc = FakeDatacenter::single_service("node-a", "web");
        dc.checks = Some(vec![
            check("node-a", "serfHealth", "passing"),
            service_check("node-a", "service:web", "critical", "web", "web", &[]),
            check("node-a", "disk", "bogus"),
        ]);
        let fake = Arc::new(FakeConsul::healthy().with_datacenter("dc1", dc));
        let exporter = Exporter::new(fake, CollectorConfig::default());

        let scrape = exporter.scrape().await.unwrap();

        assert_eq!(scrape.family("health_node_status").count(), 1);
        let service: Vec<_> = scrape.family("health_service_status").collect();
        assert_eq!(service.len(), 1);
        assert_eq!(service[0].value, 3.0);
        assert_eq!(service[0].label("tags"), Some(",,"));
        assert_eq!(scrape.report.datacenters[0].unmapped_checks, 1);
    }

    #[tokio::test]
    async fn test_check_failure_keeps_catalog_metrics() {
        let mut dc = FakeDatacenter::single_service("node-a", "web");
        dc.checks = None;
        let fake = Arc::new(FakeConsul::healthy().with_datacenter("dc1", dc));
        let exporter = Exporter::new(fake, CollectorConfig::default());

        let scrape = exporter.scrape().await.unwrap();

        assert_eq!(scrape.family("catalog_services").count(), 1);
        assert_eq!(scrape.family("catalog_service_node_healthy").count(), 1);
        assert!(scrape.report.datacenters[0].checks.is_skipped());
    }

    #[tokio::test]
    async fn test_health_summary_disabled() {
        let fake = Arc::new(
            FakeConsul::healthy().with_datacenter("dc1", FakeDatacenter::single_service("n", "web")),
        );
        let config = CollectorConfig {
            health_summary: false,
            ..CollectorConfig::default()
        };
        let exporter = Exporter::new(fake.clone(), config);

        let scrape = exporter.scrape().await.unwrap();

        assert_eq!(scrape.family("catalog_service_node_healthy").count(), 0);
        assert!(scrape.report.datacenters[0].health_summary.is_empty());
        assert!(!fake.calls().iter().any(|c| c.starts_with("service_health")));
    }

    #[tokio::test]
    async fn test_each_branch_scopes_its_own_options() {
        let fake = Arc::new(
            FakeConsul::healthy()
                .with_datacenter("dc1", FakeDatacenter::single_service("a", "web"))
                .with_datacenter("dc2", FakeDatacenter::single_service("b", "api")),
        );
        let exporter = Exporter::new(fake.clone(), CollectorConfig::default());

        exporter.scrape().await.unwrap();

        let calls = fake.calls();
        for expected in [
            "nodes dc1",
            "services dc1",
            "service_health web dc1",
            "checks dc1",
            "nodes dc2",
            "services dc2",
            "service_health api dc2",
            "checks dc2",
        ] {
            assert!(calls.iter().any(|c| c == expected), "missing {expected}");
        }
        assert!(exporter.config().query_options.datacenter.is_none());
    }

    #[tokio::test]
    async fn test_service_health_queries_run_concurrently() {
        let mut dc = FakeDatacenter::single_service("node-a", "web");
        dc.add_service("api", vec![instance("node-a", "api-1", "api", &[], &["passing"])]);
        dc.add_service("db", vec![instance("node-b", "db-1", "db", &[], &["warning"])]);
        let mut fake = FakeConsul::healthy().with_datacenter("dc1", dc);
        // Each service_health() call waits until all three services are in flight.
        fake.health_gate = Some(Arc::new(Barrier::new(3)));
        let exporter = Exporter::new(Arc::new(fake), CollectorConfig::default());

        let scrape = tokio::time::timeout(Duration::from_secs(3), exporter.scrape())
            .await
            .expect("service health was queried one service at a time")
            .unwrap();

        let healthy: Vec<_> = scrape.family("catalog_service_node_healthy").collect();
        assert_eq!(healthy.len(), 3);
        assert_eq!(scrape.report.datacenters[0].health_summary.len(), 3);
    }
}
