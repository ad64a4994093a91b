//! Consul client over the HTTP API.
//!
//! Every request shares one `reqwest::Client`, so the configured timeout
//! bounds each call individually and connections are pooled across the
//! concurrent branches of a scrape.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use reqwest::{Certificate, Client, Identity, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::api::{
    null_as_default, ConsulApi, HealthCheck, KvPair, Node, QueryOptions, ServiceCatalog,
    ServiceEntry,
};
use crate::ConsulError;

pub const DEFAULT_ADDRESS: &str = "http://localhost:8500";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(200);

/// Consul HTTP API client.
#[derive(Debug, Clone)]
pub struct ConsulClient {
    client: Client,
    base_url: Url,
}

impl ConsulClient {
    /// Create a new builder for configuring the client.
    pub fn builder() -> ConsulClientBuilder {
        ConsulClientBuilder::default()
    }

    /// The normalized agent URL requests are sent to.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint<'a, I>(&self, segments: I) -> Result<Url, ConsulError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ConsulError::InvalidAddress(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, String)],
    ) -> Result<T, ConsulError> {
        self.get_json_optional(url, query)
            .await?
            .ok_or_else(|| ConsulError::Status {
                status: StatusCode::NOT_FOUND.as_u16(),
                body: "not found".to_string(),
            })
    }

    /// Like `get_json`, but a 404 answer is `Ok(None)`.
    async fn get_json_optional<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, String)],
    ) -> Result<Option<T>, ConsulError> {
        let response = self.client.get(url).query(query).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ConsulError::Status {
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }

        let value = response
            .json()
            .await
            .map_err(|e| ConsulError::Parse(e.to_string()))?;

        Ok(Some(value))
    }
}

#[async_trait]
impl ConsulApi for ConsulClient {
    async fn peers(&self) -> Result<Vec<String>, ConsulError> {
        let url = self.endpoint(["v1", "status", "peers"])?;
        self.get_json(url, &[]).await
    }

    async fn leader(&self) -> Result<String, ConsulError> {
        let url = self.endpoint(["v1", "status", "leader"])?;
        self.get_json(url, &[]).await
    }

    async fn datacenters(&self) -> Result<Vec<String>, ConsulError> {
        let url = self.endpoint(["v1", "catalog", "datacenters"])?;
        self.get_json(url, &[]).await
    }

    async fn agent_datacenter(&self) -> Result<String, ConsulError> {
        let url = self.endpoint(["v1", "agent", "self"])?;
        let agent: AgentSelf = self.get_json(url, &[]).await?;
        Ok(agent.config.datacenter)
    }

    async fn nodes(&self, options: &QueryOptions) -> Result<Vec<Node>, ConsulError> {
        let url = self.endpoint(["v1", "catalog", "nodes"])?;
        self.get_json(url, &options.query_pairs()).await
    }

    async fn services(&self, options: &QueryOptions) -> Result<ServiceCatalog, ConsulError> {
        let url = self.endpoint(["v1", "catalog", "services"])?;
        let raw: std::collections::BTreeMap<String, Option<Vec<String>>> =
            self.get_json(url, &options.query_pairs()).await?;
        Ok(raw
            .into_iter()
            .map(|(name, tags)| (name, tags.unwrap_or_default()))
            .collect())
    }

    async fn checks(&self, options: &QueryOptions) -> Result<Vec<HealthCheck>, ConsulError> {
        let url = self.endpoint(["v1", "health", "state", "any"])?;
        self.get_json(url, &options.query_pairs()).await
    }

    async fn service_health(
        &self,
        service: &str,
        options: &QueryOptions,
    ) -> Result<Vec<ServiceEntry>, ConsulError> {
        let url = self.endpoint(["v1", "health", "service", service])?;
        self.get_json(url, &options.query_pairs()).await
    }

    async fn kv_list(
        &self,
        prefix: &str,
        options: &QueryOptions,
    ) -> Result<Vec<KvPair>, ConsulError> {
        let segments = ["v1", "kv"]
            .into_iter()
            .chain(prefix.trim_start_matches('/').split('/'));
        let url = self.endpoint(segments)?;

        let mut query = options.query_pairs();
        query.push(("recurse", String::new()));

        // Consul answers 404 when nothing lives under the prefix.
        let raw: Vec<RawKvPair> = self
            .get_json_optional(url, &query)
            .await?
            .unwrap_or_default();

        raw.into_iter().map(RawKvPair::decode).collect()
    }
}

/// Builder for ConsulClient.
#[derive(Debug, Default)]
pub struct ConsulClientBuilder {
    address: Option<String>,
    timeout: Option<Duration>,
    ca_file: Option<PathBuf>,
    cert_file: Option<PathBuf>,
    key_file: Option<PathBuf>,
    server_name: Option<String>,
}

impl ConsulClientBuilder {
    /// Set the agent address (default: "http://localhost:8500").
    ///
    /// An address without a scheme is treated as plain HTTP.
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Set the per-request timeout (default: 200ms). Zero disables it.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// PEM-encoded CA bundle used to verify the server certificate.
    pub fn ca_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_file = Some(path.into());
        self
    }

    /// PEM-encoded client certificate and key presented to the server.
    pub fn client_identity(
        mut self,
        cert_file: impl Into<PathBuf>,
        key_file: impl Into<PathBuf>,
    ) -> Self {
        self.cert_file = Some(cert_file.into());
        self.key_file = Some(key_file.into());
        self
    }

    /// Client certificate path alone; pair with [`Self::key_file`].
    pub fn cert_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.cert_file = Some(path.into());
        self
    }

    /// Client key path alone; pair with [`Self::cert_file`].
    pub fn key_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_file = Some(path.into());
        self
    }

    /// Hostname to verify the server certificate against, when it differs
    /// from the host in the address.
    ///
    /// Only applies to `https`. Requests are addressed to this name (it is
    /// also the `Host` header) while connections still go to the configured
    /// host, looked up per connection.
    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<ConsulClient, ConsulError> {
        let address = self.address.as_deref().unwrap_or(DEFAULT_ADDRESS);
        let mut base_url = normalize_address(address)?;

        let mut builder = Client::builder();
        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);
        if !timeout.is_zero() {
            builder = builder.timeout(timeout);
        }

        if let Some(path) = non_empty(&self.ca_file) {
            let pem = read_pem(path)?;
            let cert = Certificate::from_pem(&pem).map_err(|e| tls_error(path, e))?;
            builder = builder.add_root_certificate(cert);
        }

        match (non_empty(&self.cert_file), non_empty(&self.key_file)) {
            (Some(cert_path), Some(key_path)) => {
                let mut pem = read_pem(key_path)?;
                pem.extend(read_pem(cert_path)?);
                let identity = Identity::from_pem(&pem).map_err(|e| tls_error(cert_path, e))?;
                builder = builder.identity(identity);
            }
            (None, None) => {}
            _ => {
                return Err(ConsulError::Tls(
                    "client certificate and key must be configured together".to_string(),
                ))
            }
        }

        if let Some(name) = self.server_name.filter(|n| !n.is_empty()) {
            if base_url.scheme() == "https" && base_url.host_str() != Some(name.as_str()) {
                let resolver = ServerNameResolver {
                    server_name: name.clone(),
                    host: base_url
                        .host_str()
                        .unwrap_or_default()
                        .trim_start_matches('[')
                        .trim_end_matches(']')
                        .to_string(),
                };
                base_url
                    .set_host(Some(&name))
                    .map_err(|e| ConsulError::InvalidAddress(format!("{}: {}", name, e)))?;
                builder = builder.dns_resolver(Arc::new(resolver));
            }
        }

        let client = builder.build()?;

        Ok(ConsulClient { client, base_url })
    }
}

/// Parse an agent address, defaulting the scheme to `http`.
pub(crate) fn normalize_address(address: &str) -> Result<Url, ConsulError> {
    let with_scheme = if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    };

    let url = Url::parse(&with_scheme)
        .map_err(|e| ConsulError::InvalidAddress(format!("{}: {}", with_scheme, e)))?;

    let has_host = url.host_str().is_some_and(|h| !h.is_empty());
    if !has_host || !matches!(url.scheme(), "http" | "https") {
        return Err(ConsulError::InvalidAddress(with_scheme));
    }

    Ok(url)
}

/// Sends connections for the TLS server name to the configured host.
///
/// The host is looked up on every new connection, so address changes are
/// picked up without a restart and a lookup failure only fails that scrape.
#[derive(Debug)]
struct ServerNameResolver {
    server_name: String,
    host: String,
}

impl Resolve for ServerNameResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let host = if name.as_str() == self.server_name {
            self.host.clone()
        } else {
            name.as_str().to_string()
        };

        Box::pin(async move {
            let addrs = tokio::net::lookup_host((host.as_str(), 0)).await?;
            let addrs: Addrs = Box::new(addrs.collect::<Vec<SocketAddr>>().into_iter());
            Ok::<_, Box<dyn std::error::Error + Send + Sync>>(addrs)
        })
    }
}

fn non_empty(path: &Option<PathBuf>) -> Option<&PathBuf> {
    path.as_ref().filter(|p| !p.as_os_str().is_empty())
}

fn read_pem(path: &Path) -> Result<Vec<u8>, ConsulError> {
    std::fs::read(path).map_err(|e| tls_error(path, e))
}

fn tls_error(path: &Path, err: impl std::fmt::Display) -> ConsulError {
    ConsulError::Tls(format!("{}: {}", path.display(), err))
}

#[derive(Debug, Deserialize)]
struct AgentSelf {
    #[serde(rename = "Config")]
    config: AgentConfig,
}

#[derive(Debug, Deserialize)]
struct AgentConfig {
    #[serde(rename = "Datacenter")]
    datacenter: String,
}

/// KV pair as Consul encodes it: the value is base64 or null.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawKvPair {
    key: String,
    #[serde(default, deserialize_with = "null_as_default")]
    value: Option<String>,
}

impl RawKvPair {
    fn decode(self) -> Result<KvPair, ConsulError> {
        let value = match self.value {
            Some(encoded) => Some(
                STANDARD
                    .decode(encoded.as_bytes())
                    .map_err(|e| ConsulError::Parse(format!("value of {}: {}", self.key, e)))?,
            ),
            None => None,
        };
        Ok(KvPair {
            key: self.key,
            value,
        })
    }
}
