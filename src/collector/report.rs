//! Per-branch outcomes of a scrape.
//!
//! Failures inside a scrape never reach the caller as errors. They are
//! logged and recorded here, so callers and tests can tell a degraded
//! scrape from a complete one without reading logs.

use std::fmt;

/// What happened to one branch of the collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchOutcome {
    /// The branch ran and emitted its metrics.
    Completed,
    /// The branch is switched off by configuration.
    Disabled,
    /// The branch did not emit its metrics.
    Skipped { reason: String },
}

impl BranchOutcome {
    pub fn skipped(reason: impl fmt::Display) -> Self {
        BranchOutcome::Skipped {
            reason: reason.to_string(),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, BranchOutcome::Completed)
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, BranchOutcome::Skipped { .. })
    }
}

/// Where the datacenter list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discovery {
    /// The catalog datacenter listing.
    Catalog,
    /// The local agent's own configuration, after the catalog failed.
    Agent,
    /// Both lookups failed; the agent's default datacenter is queried.
    LocalDefault,
}

/// Health summary outcome for one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceReport {
    pub service: String,
    pub outcome: BranchOutcome,
    /// Instances emitted as `catalog_service_node_healthy`.
    pub instances: usize,
    /// Instances dropped because a check status was not recognized.
    pub unmapped: usize,
}

/// Outcome of one datacenter branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatacenterReport {
    pub datacenter: String,
    pub nodes: BranchOutcome,
    pub catalog: BranchOutcome,
    /// One entry per service when health summaries ran.
    pub health_summary: Vec<ServiceReport>,
    pub checks: BranchOutcome,
    /// Checks dropped because their status was not recognized.
    pub unmapped_checks: usize,
}

impl DatacenterReport {
    pub(crate) fn new(datacenter: &str) -> Self {
        Self {
            datacenter: datacenter.to_string(),
            nodes: BranchOutcome::Completed,
            catalog: BranchOutcome::Completed,
            health_summary: Vec::new(),
            checks: BranchOutcome::Completed,
            unmapped_checks: 0,
        }
    }

    /// True when every sub-branch emitted all of its metrics.
    pub fn is_complete(&self) -> bool {
        !self.nodes.is_skipped()
            && !self.catalog.is_skipped()
            && !self.checks.is_skipped()
            && self.unmapped_checks == 0
            && self
                .health_summary
                .iter()
                .all(|s| !s.outcome.is_skipped() && s.unmapped == 0)
    }
}

/// Summary of a whole scrape, returned alongside the metric stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeReport {
    /// Whether Consul answered the liveness check.
    pub up: bool,
    /// Why the liveness check failed.
    pub failure: Option<String>,
    pub leader: BranchOutcome,
    /// `None` when the scrape stopped before discovery.
    pub discovery: Option<Discovery>,
    pub datacenters: Vec<DatacenterReport>,
    pub kv: BranchOutcome,
}

impl ScrapeReport {
    pub(crate) fn down(reason: impl fmt::Display) -> Self {
        let reason = reason.to_string();
        Self {
            up: false,
            leader: BranchOutcome::skipped("consul unreachable"),
            discovery: None,
            datacenters: Vec::new(),
            kv: BranchOutcome::skipped("consul unreachable"),
            failure: Some(reason),
        }
    }

    pub fn datacenter(&self, name: &str) -> Option<&DatacenterReport> {
        self.datacenters.iter().find(|d| d.datacenter == name)
    }

    /// True when Consul was up but some branch dropped metrics.
    pub fn is_degraded(&self) -> bool {
        self.up
            && (self.leader.is_skipped()
                || self.kv.is_skipped()
                || self.discovery != Some(Discovery::Catalog)
                || self.datacenters.iter().any(|d| !d.is_complete()))
    }
}
