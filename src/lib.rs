//! # consul-exporter
//!
//! A pull-based Prometheus exporter for Consul. Each scrape queries the
//! Consul HTTP API, fans out across datacenters and services, and returns a
//! consistent set of gauges describing cluster, catalog, health and
//! key/value state.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        consul-exporter                       │
//! │  ┌─────────┐   ┌────────────┐   ┌────────────┐   ┌────────┐  │
//! │  │ server  │──▶│ collector  │──▶│ exposition │──▶│  HTTP  │  │
//! │  │ (hyper) │   │ (fan-out)  │   │   (text)   │   │response│  │
//! │  └─────────┘   └─────┬──────┘   └────────────┘   └────────┘  │
//! │                      │                                       │
//! │                      ▼                                       │
//! │               ┌─────────────┐                                │
//! │               │  ConsulApi  │◀── ConsulClient | test fakes   │
//! │               └─────────────┘                                │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **[`collector`]**: the scrape pipeline, streaming [`Metric`]s and
//!   returning a [`ScrapeReport`] of per-branch outcomes
//! - **[`exposition`]**: Prometheus text rendering
//! - **[`server`]**: the HTTP endpoint that triggers scrapes
//! - **[`settings`]**: layered configuration (defaults, file, env, flags)
//!
//! ## Usage
//!
//! ```bash
//! consul-exporter --consul.server=localhost:8500 --kv.prefix=metrics/
//! ```
//!
//! ### As a library
//!
//! ```no_run
//! use consul_exporter::{CollectorConfig, Exporter};
//! use consul_exporter_client::ConsulClient;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ConsulClient::builder().address("localhost:8500").build()?;
//! let exporter = Exporter::new(Arc::new(client), CollectorConfig::default());
//!
//! let scrape = exporter.scrape().await?;
//! println!("up = {:?}", scrape.value("up"));
//! # Ok(())
//! # }
//! ```

pub mod collector;
pub mod exposition;
pub mod server;
pub mod settings;

// Re-export main types for convenience
pub use collector::{
    BranchOutcome, Collection, CollectorConfig, DatacenterReport, Discovery, Exporter, Scrape,
    ScrapeReport, ServiceReport,
};
pub use consul_exporter_types::{HealthStatus, Metric};
pub use settings::{Settings, SettingsError};

/// Version reported by the landing page and `exporter_build_info`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
