//! The scrape pipeline.
//!
//! A scrape is a two-level scatter/gather over Consul:
//!
//! ```text
//! peers ──▶ leader ──▶ datacenters ──┬─▶ dc1 ──┬─▶ nodes, catalog
//!  (up)                              │         ├─▶ health summary per service (parallel)
//!                                    │         └─▶ checks
//!                                    ├─▶ dc2 ...
//!                                    └─▶ (join) ──▶ key/values ──▶ stream closed
//! ```
//!
//! - [`datacenter`]: per-datacenter collection
//! - [`health`]: per-service instance health roll-up
//! - [`kv`]: numeric key/value export
//! - [`report`]: per-branch outcomes returned with the metrics
//!
//! Every branch writes straight into one `mpsc` channel. The orchestrator
//! task owns the sender; it is dropped once every branch has joined, which
//! is what closes the stream for the consumer.

mod datacenter;
mod health;
mod kv;
mod report;

#[cfg(test)]
pub(crate) mod fake;

pub use report::{BranchOutcome, DatacenterReport, Discovery, ScrapeReport, ServiceReport};

use std::future::Future;
use std::sync::Arc;

use consul_exporter_client::{ConsulApi, QueryOptions};
use consul_exporter_types::{catalog, Metric};
use futures_util::future::join_all;
use futures_util::stream::{self, StreamExt};
use regex::Regex;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, warn};

/// Samples buffered between the branches and the consumer.
const METRIC_BUFFER: usize = 256;

/// What a scrape collects and how.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Template for every query; branches scope a copy to their datacenter.
    pub query_options: QueryOptions,
    /// Run one health query per service in every datacenter.
    pub health_summary: bool,
    /// KV prefix to export. Empty disables the KV scrape.
    pub kv_prefix: String,
    /// Keys must match this pattern to be exported. `None` matches all.
    pub kv_filter: Option<Regex>,
    /// In-flight branch cap per fan-out level. `None` is unbounded.
    pub max_concurrency: Option<usize>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            query_options: QueryOptions::new(true, false),
            health_summary: true,
            kv_prefix: String::new(),
            kv_filter: None,
            max_concurrency: None,
        }
    }
}

/// Receiving side of a running scrape.
///
/// Branches block once the buffer is full, so the stream must be drained
/// before the report can resolve. [`Collection::finish`] does both.
#[derive(Debug)]
pub struct Collection {
    metrics: mpsc::Receiver<Metric>,
    report: JoinHandle<ScrapeReport>,
}

impl Collection {
    /// Next sample, or `None` once every branch has finished.
    pub async fn next(&mut self) -> Option<Metric> {
        self.metrics.recv().await
    }

    /// Drain the remaining samples, then wait for the report.
    pub async fn finish(mut self) -> Result<Scrape, JoinError> {
        let mut metrics = Vec::new();
        while let Some(metric) = self.metrics.recv().await {
            metrics.push(metric);
        }

        Ok(Scrape {
            metrics,
            report: self.report.await?,
        })
    }
}

/// A finished scrape.
#[derive(Debug, Clone)]
pub struct Scrape {
    pub metrics: Vec<Metric>,
    pub report: ScrapeReport,
}

impl Scrape {
    /// All samples of one metric family.
    pub fn family<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Metric> + 'a {
        self.metrics.iter().filter(move |m| m.name() == name)
    }

    /// Value of the first sample of an unlabeled family.
    pub fn value(&self, name: &str) -> Option<f64> {
        self.family(name).next().map(|m| m.value)
    }
}

/// Write side of the metric stream, shared by reference across branches.
#[derive(Debug)]
pub(crate) struct MetricSink {
    tx: mpsc::Sender<Metric>,
}

impl MetricSink {
    pub(crate) async fn emit(&self, metric: Metric) {
        if self.tx.send(metric).await.is_err() {
            debug!("Metric receiver dropped, discarding sample");
        }
    }
}

/// Collects Consul state into metrics, one independent scrape at a time.
///
/// Cloning is cheap; clones share the client and configuration.
#[derive(Debug, Clone)]
pub struct Exporter {
    api: Arc<dyn ConsulApi>,
    config: Arc<CollectorConfig>,
}

impl Exporter {
    pub fn new(api: Arc<dyn ConsulApi>, config: CollectorConfig) -> Self {
        Self {
            api,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Start a scrape and stream its metrics as they are produced.
    ///
    /// Must be called from within a tokio runtime.
    pub fn collect(&self) -> Collection {
        let (tx, rx) = mpsc::channel(METRIC_BUFFER);
        let exporter = self.clone();
        let report = tokio::spawn(async move { exporter.run(MetricSink { tx }).await });

        Collection {
            metrics: rx,
            report,
        }
    }

    /// Run a full scrape and wait for every branch to finish.
    pub async fn scrape(&self) -> Result<Scrape, JoinError> {
        self.collect().finish().await
    }

    async fn run(&self, sink: MetricSink) -> ScrapeReport {
        // Peers double as the liveness check.
        let peers = match self.api.peers().await {
            Ok(peers) => peers,
            Err(e) => {
                error!("Can't query consul: {}", e);
                sink.emit(Metric::new(&catalog::UP, 0.0)).await;
                return ScrapeReport::down(e);
            }
        };

        sink.emit(Metric::new(&catalog::UP, 1.0)).await;
        sink.emit(Metric::new(&catalog::RAFT_PEERS, peers.len() as f64))
            .await;

        let leader = self.collect_leader(&sink).await;
        let (datacenters, discovery) = self.discover_datacenters().await;

        let sink_ref = &sink;
        let mut reports = fan_out(datacenters, self.config.max_concurrency, move |dc| {
            self.collect_datacenter(sink_ref, dc)
        })
        .await;
        reports.sort_by(|a, b| a.datacenter.cmp(&b.datacenter));

        let kv = self.collect_key_values(&sink).await;

        ScrapeReport {
            up: true,
            failure: None,
            leader,
            discovery: Some(discovery),
            datacenters: reports,
            kv,
        }
    }

    async fn collect_leader(&self, sink: &MetricSink) -> BranchOutcome {
        let (value, outcome) = match self.api.leader().await {
            Ok(leader) if !leader.is_empty() => (1.0, BranchOutcome::Completed),
            Ok(_) => (0.0, BranchOutcome::Completed),
            Err(e) => {
                error!("Can't query consul leader: {}", e);
                (0.0, BranchOutcome::skipped(e))
            }
        };

        sink.emit(Metric::new(&catalog::RAFT_LEADER, value)).await;
        outcome
    }

    async fn discover_datacenters(&self) -> (Vec<String>, Discovery) {
        let err = match self.api.datacenters().await {
            Ok(datacenters) => return (datacenters, Discovery::Catalog),
            Err(e) => e,
        };

        warn!(
            "Can't list datacenters, using the agent's own datacenter: {}",
            err
        );

        match self.api.agent_datacenter().await {
            Ok(datacenter) => (vec![datacenter], Discovery::Agent),
            Err(e) => {
                // An empty datacenter makes Consul answer for the agent's own.
                error!("Can't read agent configuration: {}", e);
                (vec![String::new()], Discovery::LocalDefault)
            }
        }
    }
}

/// Run `f` over every item concurrently and gather the results.
///
/// With a limit, at most `limit` futures are in flight and results arrive in
/// completion order; without one, everything runs at once.
pub(crate) async fn fan_out<T, F, Fut, R>(items: Vec<T>, limit: Option<usize>, f: F) -> Vec<R>
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = R>,
{
    match limit {
        Some(limit) => {
            stream::iter(items)
                .map(f)
                .buffer_unordered(limit.max(1))
                .collect()
                .await
        }
        None => join_all(items.into_iter().map(f)).await,
    }
}
