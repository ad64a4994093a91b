//! HTTP endpoint serving scrapes.
//!
//! Every request to the telemetry path runs one full scrape and answers
//! only after it has finished. Nothing is cached between requests.
//!
//! ```rust,no_run
//! use consul_exporter::server::{self, ServerConfig};
//! use consul_exporter::{CollectorConfig, Exporter};
//! use consul_exporter_client::ConsulClient;
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = ConsulClient::builder().address("localhost:8500").build()?;
//!     let exporter = Exporter::new(Arc::new(client), CollectorConfig::default());
//!     let listener = TcpListener::bind("0.0.0.0:9107").await?;
//!
//!     let shutdown = server::shutdown_signal(tokio::signal::ctrl_c());
//!     server::run(listener, exporter, ServerConfig::default(), shutdown).await?;
//!     Ok(())
//! }
//! ```

use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use consul_exporter_types::{catalog, Metric};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::collector::Exporter;
use crate::exposition::{self, format_prometheus};
use crate::VERSION;

/// How long in-flight requests may run after shutdown is requested.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Serving options.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Path that triggers a scrape (e.g. "/metrics").
    pub telemetry_path: String,
    /// Optional namespace prefix for all metrics.
    pub namespace: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            telemetry_path: "/metrics".to_string(),
            namespace: Some("consul".to_string()),
        }
    }
}

#[derive(Debug)]
struct ServerState {
    exporter: Exporter,
    config: ServerConfig,
}

/// Accept connections on `listener` until `shutdown` resolves.
///
/// Connections already accepted are then asked to close and given up to
/// [`DRAIN_TIMEOUT`] to finish the request they are serving.
pub async fn run(
    listener: TcpListener,
    exporter: Exporter,
    config: ServerConfig,
    shutdown: impl Future<Output = ()>,
) -> io::Result<()> {
    let state = Arc::new(ServerState { exporter, config });
    let graceful = GracefulShutdown::new();
    tokio::pin!(shutdown);

    if let Ok(addr) = listener.local_addr() {
        info!(
            "Listening on {} (metrics at {})",
            addr, state.config.telemetry_path
        );
    }

    loop {
        let (stream, peer) = tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    continue;
                }
            },
        };

        let io = TokioIo::new(stream);
        let state = state.clone();
        let service = service_fn(move |req| {
            let state = state.clone();
            async move { handle_request(req, &state).await }
        });

        let conn = graceful.watch(http1::Builder::new().serve_connection(io, service));
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!("Connection error from {}: {}", peer, e);
            }
        });
    }

    drop(listener);
    info!("Shutting down, draining open connections");
    if tokio::time::timeout(DRAIN_TIMEOUT, graceful.shutdown())
        .await
        .is_err()
    {
        warn!(
            "Connections still open after {:?}, closing anyway",
            DRAIN_TIMEOUT
        );
    }

    Ok(())
}

/// Resolve when `signal` fires.
///
/// If the signal handler cannot be installed the error is logged and the
/// returned future never resolves, so the server keeps serving.
pub async fn shutdown_signal(signal: impl Future<Output = io::Result<()>>) {
    if let Err(e) = signal.await {
        error!("Failed to listen for the shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    state: &ServerState,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let path = req.uri().path().to_owned();

    let response = if path == state.config.telemetry_path {
        scrape(state).await
    } else if path == "/" {
        respond(
            StatusCode::OK,
            "text/html; charset=utf-8",
            landing_page(state),
        )
    } else if path == "/health" || path == "/healthz" {
        respond(StatusCode::OK, "text/plain", "OK".to_string())
    } else {
        respond(StatusCode::NOT_FOUND, "text/plain", "Not Found".to_string())
    };

    Ok(response)
}

async fn scrape(state: &ServerState) -> Response<Full<Bytes>> {
    match state.exporter.scrape().await {
        Ok(mut scrape) => {
            if scrape.report.is_degraded() {
                debug!("Scrape completed with skipped branches: {:?}", scrape.report);
            }
            scrape.metrics.push(build_info());
            let body = format_prometheus(&scrape.metrics, state.config.namespace.as_deref());
            respond(StatusCode::OK, exposition::CONTENT_TYPE, body)
        }
        Err(e) => {
            error!("Scrape task failed: {}", e);
            respond(
                StatusCode::INTERNAL_SERVER_ERROR,
                "text/plain",
                format!("scrape failed: {}", e),
            )
        }
    }
}

fn build_info() -> Metric {
    Metric::labeled(&catalog::EXPORTER_BUILD_INFO, 1.0, [VERSION])
}

fn landing_page(state: &ServerState) -> String {
    let options = serde_json::to_string_pretty(&state.exporter.config().query_options)
        .unwrap_or_default();
    let options = escape_html(&options);
    let path = escape_html(&state.config.telemetry_path);

    format!(
        "<html>\n\
         <head><title>Consul Exporter</title></head>\n\
         <body>\n\
         <h1>Consul Exporter</h1>\n\
         <p><a href=\"{path}\">Metrics</a></p>\n\
         <h2>Options</h2>\n\
         <pre>{options}</pre>\n\
         <h2>Build</h2>\n\
         <pre>{VERSION}</pre>\n\
         </body>\n\
         </html>\n"
    )
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn respond(status: StatusCode, content_type: &'static str, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}
