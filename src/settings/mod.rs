//! Exporter configuration.
//!
//! Settings are layered, later sources winning:
//!
//! 1. built-in defaults
//! 2. an optional configuration file (TOML, YAML or JSON by extension)
//! 3. environment variables, e.g. `CONSUL_EXPORTER__CONSUL__SERVER`
//! 4. command line flags
//!
//! ```toml
//! [web]
//! listen_address = ":9107"
//!
//! [consul]
//! server = "https://consul.service:8501"
//! ca_file = "/etc/consul/ca.pem"
//! timeout = "500ms"
//!
//! [kv]
//! prefix = "metrics/"
//! filter = "^metrics/(load|queue)"
//! ```

pub mod duration;

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use consul_exporter_client::{ConsulClient, ConsulError, QueryOptions};
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use crate::collector::CollectorConfig;
use duration::parse_duration;

/// Environment variable prefix; nested keys are separated by `__`.
pub const ENV_PREFIX: &str = "CONSUL_EXPORTER";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("invalid duration: {0:?}")]
    InvalidDuration(String),

    #[error("invalid key filter {pattern:?}: {source}")]
    InvalidFilter {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid telemetry path {0:?}: must start with '/'")]
    InvalidTelemetryPath(String),

    #[error(transparent)]
    Client(#[from] ConsulError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub web: WebSettings,
    pub consul: ConsulSettings,
    pub kv: KvSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebSettings {
    /// Address to serve on; a bare `:port` listens on all interfaces.
    pub listen_address: String,
    pub telemetry_path: String,
    /// Prefix for every metric name. Empty disables it.
    pub namespace: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConsulSettings {
    pub server: String,
    #[serde(default)]
    pub ca_file: Option<PathBuf>,
    #[serde(default)]
    pub cert_file: Option<PathBuf>,
    #[serde(default)]
    pub key_file: Option<PathBuf>,
    #[serde(default)]
    pub server_name: Option<String>,
    pub timeout: String,
    pub health_summary: bool,
    pub allow_stale: bool,
    pub require_consistent: bool,
    /// Per-level fan-out cap; unset or zero is unbounded.
    #[serde(default)]
    pub max_concurrency: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KvSettings {
    pub prefix: String,
    pub filter: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

/// Values given on the command line. `None` leaves the lower layers alone.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub listen_address: Option<String>,
    pub telemetry_path: Option<String>,
    pub namespace: Option<String>,
    pub server: Option<String>,
    pub ca_file: Option<String>,
    pub cert_file: Option<String>,
    pub key_file: Option<String>,
    pub server_name: Option<String>,
    pub timeout: Option<String>,
    pub health_summary: Option<bool>,
    pub allow_stale: Option<bool>,
    pub require_consistent: Option<bool>,
    pub max_concurrency: Option<usize>,
    pub kv_prefix: Option<String>,
    pub kv_filter: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<String>,
}

impl Settings {
    /// Load settings from defaults, `file`, the environment, then `overrides`.
    pub fn load(file: Option<&Path>, overrides: &Overrides) -> Result<Self, SettingsError> {
        let mut builder = Config::builder()
            .set_default("web.listen_address", "0.0.0.0:9107")?
            .set_default("web.telemetry_path", "/metrics")?
            .set_default("web.namespace", "consul")?
            .set_default("consul.server", consul_exporter_client::DEFAULT_ADDRESS)?
            .set_default("consul.timeout", "200ms")?
            .set_default("consul.health_summary", true)?
            .set_default("consul.allow_stale", true)?
            .set_default("consul.require_consistent", false)?
            .set_default("kv.prefix", "")?
            .set_default("kv.filter", ".*")?
            .set_default("log.level", "info")?
            .set_default("log.format", "text")?;

        if let Some(path) = file {
            builder = builder.add_source(File::from(path));
        }

        let o = overrides.clone();
        let settings: Settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("web.listen_address", o.listen_address)?
            .set_override_option("web.telemetry_path", o.telemetry_path)?
            .set_override_option("web.namespace", o.namespace)?
            .set_override_option("consul.server", o.server)?
            .set_override_option("consul.ca_file", o.ca_file)?
            .set_override_option("consul.cert_file", o.cert_file)?
            .set_override_option("consul.key_file", o.key_file)?
            .set_override_option("consul.server_name", o.server_name)?
            .set_override_option("consul.timeout", o.timeout)?
            .set_override_option("consul.health_summary", o.health_summary)?
            .set_override_option("consul.allow_stale", o.allow_stale)?
            .set_override_option("consul.require_consistent", o.require_consistent)?
            .set_override_option(
                "consul.max_concurrency",
                o.max_concurrency.and_then(|n| i64::try_from(n).ok()),
            )?
            .set_override_option("kv.prefix", o.kv_prefix)?
            .set_override_option("kv.filter", o.kv_filter)?
            .set_override_option("log.level", o.log_level)?
            .set_override_option("log.format", o.log_format)?
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if !self.web.telemetry_path.starts_with('/') {
            return Err(SettingsError::InvalidTelemetryPath(
                self.web.telemetry_path.clone(),
            ));
        }
        self.timeout()?;
        self.key_filter()?;
        Ok(())
    }

    /// Address to bind, with a bare `:port` widened to all interfaces.
    pub fn listen_address(&self) -> String {
        let addr = self.web.listen_address.trim();
        if addr.starts_with(':') {
            format!("0.0.0.0{}", addr)
        } else {
            addr.to_string()
        }
    }

    /// Metric name prefix, `None` when disabled.
    pub fn namespace(&self) -> Option<&str> {
        Some(self.web.namespace.as_str()).filter(|ns| !ns.is_empty())
    }

    pub fn timeout(&self) -> Result<Duration, SettingsError> {
        parse_duration(&self.consul.timeout)
    }

    pub fn query_options(&self) -> QueryOptions {
        QueryOptions::new(self.consul.allow_stale, self.consul.require_consistent)
    }

    fn key_filter(&self) -> Result<Option<Regex>, SettingsError> {
        let pattern = self.kv.filter.as_str();
        if pattern.is_empty() {
            return Ok(None);
        }
        Regex::new(pattern)
            .map(Some)
            .map_err(|source| SettingsError::InvalidFilter {
                pattern: pattern.to_string(),
                source,
            })
    }

    pub fn collector_config(&self) -> Result<CollectorConfig, SettingsError> {
        Ok(CollectorConfig {
            query_options: self.query_options(),
            health_summary: self.consul.health_summary,
            kv_prefix: self.kv.prefix.clone(),
            kv_filter: self.key_filter()?,
            max_concurrency: self.consul.max_concurrency.filter(|n| *n > 0),
        })
    }

    /// Build the Consul client these settings describe.
    pub fn consul_client(&self) -> Result<ConsulClient, SettingsError> {
        let consul = &self.consul;
        let mut builder = ConsulClient::builder()
            .address(consul.server.as_str())
            .timeout(self.timeout()?);

        if let Some(ca) = &consul.ca_file {
            builder = builder.ca_file(ca);
        }
        if let Some(cert) = &consul.cert_file {
            builder = builder.cert_file(cert);
        }
        if let Some(key) = &consul.key_file {
            builder = builder.key_file(key);
        }
        if let Some(name) = &consul.server_name {
            builder = builder.server_name(name.as_str());
        }

        Ok(builder.build()?)
    }
}
