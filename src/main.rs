use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use consul_exporter::server::{self, ServerConfig};
use consul_exporter::settings::{LogFormat, Overrides, Settings};
use consul_exporter::{Exporter, VERSION};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "consul-exporter", version)]
#[command(about = "Prometheus exporter for Consul cluster, catalog, health and key/value state")]
struct Args {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(long = "config.file")]
    config_file: Option<PathBuf>,

    /// Address to listen on for the web interface and telemetry
    #[arg(long = "web.listen-address")]
    listen_address: Option<String>,

    /// Path under which to expose metrics
    #[arg(long = "web.telemetry-path")]
    telemetry_path: Option<String>,

    /// Namespace prefix for metric names; empty for none
    #[arg(long = "web.namespace")]
    namespace: Option<String>,

    /// Consul agent address (e.g. "localhost:8500", "https://consul:8501")
    #[arg(long = "consul.server")]
    server: Option<String>,

    /// PEM-encoded CA bundle for verifying the Consul server
    #[arg(long = "consul.ca-file")]
    ca_file: Option<String>,

    /// PEM-encoded client certificate for TLS authentication
    #[arg(long = "consul.cert-file")]
    cert_file: Option<String>,

    /// PEM-encoded client key for TLS authentication
    #[arg(long = "consul.key-file")]
    key_file: Option<String>,

    /// Hostname to verify the Consul server certificate against
    #[arg(long = "consul.server-name")]
    server_name: Option<String>,

    /// Timeout of each Consul request (e.g. "200ms", "1s"); "0s" disables it.
    /// One number and one unit only: compound forms like "1m30s" are rejected
    #[arg(long = "consul.timeout")]
    timeout: Option<String>,

    /// Collect per-instance health summaries (one query per service)
    #[arg(long = "consul.health-summary")]
    health_summary: Option<bool>,

    /// Allow any Consul server, not only the leader, to answer reads
    #[arg(long = "consul.allow-stale")]
    allow_stale: Option<bool>,

    /// Force fully consistent reads through the leader
    #[arg(long = "consul.require-consistent")]
    require_consistent: Option<bool>,

    /// Cap on concurrent queries per fan-out level; 0 for unbounded
    #[arg(long = "consul.max-concurrency")]
    max_concurrency: Option<usize>,

    /// KV prefix to export numeric values from; empty disables
    #[arg(long = "kv.prefix")]
    kv_prefix: Option<String>,

    /// Only export keys matching this regular expression
    #[arg(long = "kv.filter")]
    kv_filter: Option<String>,

    /// Log level (overridden by RUST_LOG)
    #[arg(long = "log.level")]
    log_level: Option<String>,

    /// Log format: "text" or "json"
    #[arg(long = "log.format")]
    log_format: Option<String>,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            listen_address: self.listen_address.clone(),
            telemetry_path: self.telemetry_path.clone(),
            namespace: self.namespace.clone(),
            server: self.server.clone(),
            ca_file: self.ca_file.clone(),
            cert_file: self.cert_file.clone(),
            key_file: self.key_file.clone(),
            server_name: self.server_name.clone(),
            timeout: self.timeout.clone(),
            health_summary: self.health_summary,
            allow_stale: self.allow_stale,
            require_consistent: self.require_consistent,
            max_concurrency: self.max_concurrency,
            kv_prefix: self.kv_prefix.clone(),
            kv_filter: self.kv_filter.clone(),
            log_level: self.log_level.clone(),
            log_format: self.log_format.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let settings = Settings::load(args.config_file.as_deref(), &args.overrides())
        .context("Failed to load configuration")?;

    init_tracing(&settings);

    let client = settings
        .consul_client()
        .context("Failed to create Consul client")?;
    info!(
        "Starting consul-exporter {} for {}",
        VERSION,
        client.base_url()
    );

    let exporter = Exporter::new(Arc::new(client), settings.collector_config()?);

    let listen_address = settings.listen_address();
    let listener = TcpListener::bind(&listen_address)
        .await
        .with_context(|| format!("Failed to listen on {}", listen_address))?;

    let server_config = ServerConfig {
        telemetry_path: settings.web.telemetry_path.clone(),
        namespace: settings.namespace().map(str::to_string),
    };

    let shutdown = server::shutdown_signal(tokio::signal::ctrl_c());
    server::run(listener, exporter, server_config, shutdown).await?;

    Ok(())
}

/// Initialize tracing; `RUST_LOG` takes precedence over `log.level`.
fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match settings.log.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}
