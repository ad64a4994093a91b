//! # consul-exporter-client
//!
//! The boundary between the collector and Consul.
//!
//! [`ConsulApi`] lists exactly the queries a scrape needs. [`ConsulClient`]
//! implements it over the Consul HTTP API; tests implement it in memory.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use consul_exporter_client::{ConsulApi, ConsulClient, QueryOptions};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ConsulClient::builder()
//!         .address("localhost:8500")
//!         .timeout(Duration::from_millis(200))
//!         .build()?;
//!
//!     let peers = client.peers().await?;
//!     let nodes = client.nodes(&QueryOptions::default().in_datacenter("dc1")).await?;
//!
//!     println!("{} peers, {} nodes", peers.len(), nodes.len());
//!     Ok(())
//! }
//! ```

mod api;
mod client;
pub mod error;

pub use api::*;
pub use client::{ConsulClient, ConsulClientBuilder, DEFAULT_ADDRESS, DEFAULT_TIMEOUT};
pub use error::ConsulError;
