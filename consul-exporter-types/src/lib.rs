//! # consul-exporter-types
//!
//! Core types shared by the collector and the exposition layer. This crate
//! has no dependencies: it only describes what a metric looks like, which
//! metrics exist, and how Consul health states become gauge values.
//!
//! ## Contents
//!
//! - [`Metric`] and [`MetricDesc`]: a labeled sample and its static descriptor
//! - [`catalog`]: every metric family the exporter can emit
//! - [`HealthStatus`]: the fixed status ordinal and the worst-case roll-up
//! - [`render_tags`]: the `,a,b,` tag label convention
//!
//! ## Example
//!
//! ```rust
//! use consul_exporter_types::{catalog, render_tags, HealthStatus, Metric};
//!
//! let status: HealthStatus = "warning".parse().unwrap();
//! let metric = Metric::labeled(
//!     &catalog::CATALOG_SERVICE_NODE_HEALTHY,
//!     status.value(),
//!     ["web-1", "node-a", "web", "dc1", render_tags(&["http"]).as_str()],
//! );
//!
//! assert_eq!(metric.value, 2.0);
//! assert_eq!(metric.label("tags"), Some(",http,"));
//! ```

pub mod catalog;
mod metric;
mod status;
mod tags;

pub use metric::*;
pub use status::*;
pub use tags::*;
