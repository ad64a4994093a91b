//! The queries a scrape issues, and the shapes Consul answers with.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

use crate::ConsulError;

/// Read options attached to catalog, health and KV queries.
///
/// This is a plain value: each collection branch derives its own copy with
/// [`QueryOptions::in_datacenter`] instead of mutating a shared template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueryOptions {
    /// Datacenter to query. `None` (or empty) means the agent's own.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datacenter: Option<String>,
    /// Let any server, not only the leader, answer the read.
    pub allow_stale: bool,
    /// Force a fully consistent read through the leader.
    pub require_consistent: bool,
}

impl QueryOptions {
    pub fn new(allow_stale: bool, require_consistent: bool) -> Self {
        Self {
            datacenter: None,
            allow_stale,
            require_consistent,
        }
    }

    /// A copy of these options scoped to `datacenter`.
    pub fn in_datacenter(&self, datacenter: impl Into<String>) -> Self {
        Self {
            datacenter: Some(datacenter.into()),
            ..self.clone()
        }
    }

    /// URL query parameters for these options.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(dc) = self.datacenter.as_deref().filter(|dc| !dc.is_empty()) {
            pairs.push(("dc", dc.to_string()));
        }
        if self.allow_stale {
            pairs.push(("stale", String::new()));
        }
        if self.require_consistent {
            pairs.push(("consistent", String::new()));
        }
        pairs
    }
}

/// Service name to tags, as returned by the catalog.
pub type ServiceCatalog = BTreeMap<String, Vec<String>>;

/// A node registered in the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Node {
    pub node: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub datacenter: String,
}

/// A single health check, node level when `service_id` is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HealthCheck {
    #[serde(default)]
    pub node: String,
    #[serde(rename = "CheckID")]
    pub check_id: String,
    #[serde(default)]
    pub name: String,
    pub status: String,
    #[serde(rename = "ServiceID", default)]
    pub service_id: String,
    #[serde(default)]
    pub service_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub service_tags: Vec<String>,
}

impl HealthCheck {
    pub fn is_node_check(&self) -> bool {
        self.service_id.is_empty()
    }
}

/// The service half of a health entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AgentService {
    #[serde(rename = "ID")]
    pub id: String,
    pub service: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
}

/// One service instance with its node and every check attached to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceEntry {
    pub node: Node,
    pub service: AgentService,
    #[serde(default, deserialize_with = "null_as_default")]
    pub checks: Vec<HealthCheck>,
}

/// A key and its decoded value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KvPair {
    pub key: String,
    pub value: Option<Vec<u8>>,
}

impl KvPair {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }

    /// The value as UTF-8 text, if it is present and valid.
    pub fn value_str(&self) -> Option<&str> {
        self.value
            .as_deref()
            .and_then(|v| std::str::from_utf8(v).ok())
    }
}

/// Everything a scrape asks Consul.
///
/// Implementations must be safe to share across concurrent collection
/// branches; none of the methods mutate the client.
#[async_trait]
pub trait ConsulApi: Send + Sync + fmt::Debug {
    /// Raft peer addresses.
    async fn peers(&self) -> Result<Vec<String>, ConsulError>;

    /// Raft leader address, empty when there is no leader.
    async fn leader(&self) -> Result<String, ConsulError>;

    /// Every datacenter known to the catalog.
    async fn datacenters(&self) -> Result<Vec<String>, ConsulError>;

    /// The datacenter the local agent reports in its own configuration.
    async fn agent_datacenter(&self) -> Result<String, ConsulError>;

    async fn nodes(&self, options: &QueryOptions) -> Result<Vec<Node>, ConsulError>;

    async fn services(&self, options: &QueryOptions) -> Result<ServiceCatalog, ConsulError>;

    /// Health checks in any state.
    async fn checks(&self, options: &QueryOptions) -> Result<Vec<HealthCheck>, ConsulError>;

    /// All instances of `service`, regardless of their health.
    async fn service_health(
        &self,
        service: &str,
        options: &QueryOptions,
    ) -> Result<Vec<ServiceEntry>, ConsulError>;

    /// Every key/value pair under `prefix`.
    async fn kv_list(&self, prefix: &str, options: &QueryOptions)
        -> Result<Vec<KvPair>, ConsulError>;
}

pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_pairs() {
        let options = QueryOptions::new(true, false).in_datacenter("dc2");
        assert_eq!(
            options.query_pairs(),
            vec![("dc", "dc2".to_string()), ("stale", String::new())]
        );

        let consistent = QueryOptions::new(false, true);
        assert_eq!(
            consistent.query_pairs(),
            vec![("consistent", String::new())]
        );
    }

    #[test]
    fn test_empty_datacenter_is_omitted() {
        let options = QueryOptions::default().in_datacenter("");
        assert!(options.query_pairs().is_empty());
    }

    #[test]
    fn test_in_datacenter_leaves_template_untouched() {
        let template = QueryOptions::new(true, false);
        let scoped = template.in_datacenter("dc1");
        assert_eq!(template.datacenter, None);
        assert_eq!(scoped.datacenter.as_deref(), Some("dc1"));
        assert!(scoped.allow_stale);
    }

    #[test]
    fn test_options_serialize() {
        let json = serde_json::to_string(&QueryOptions::new(true, false)).unwrap();
        assert_eq!(json, r#"{"AllowStale":true,"RequireConsistent":false}"#);
    }

    #[test]
    fn test_deserialize_health_check() {
        let json = r#"{
            "Node": "node-a",
            "CheckID": "service:web-1",
            "Name": "Service 'web' check",
            "Status": "warning",
            "Notes": "",
            "Output": "HTTP GET: 429",
            "ServiceID": "web-1",
            "ServiceName": "web",
            "ServiceTags": ["primary", "v2"]
        }"#;
        let check: HealthCheck = serde_json::from_str(json).unwrap();
        assert_eq!(check.check_id, "service:web-1");
        assert_eq!(check.service_id, "web-1");
        assert_eq!(check.service_tags, vec!["primary", "v2"]);
        assert!(!check.is_node_check());
    }

    #[test]
    fn test_deserialize_node_check_with_null_tags() {
        let json = r#"{
            "Node": "node-a",
            "CheckID": "serfHealth",
            "Name": "Serf Health Status",
            "Status": "passing",
            "ServiceID": "",
            "ServiceName": "",
            "ServiceTags": null
        }"#;
        let check: HealthCheck = serde_json::from_str(json).unwrap();
        assert!(check.is_node_check());
        assert!(check.service_tags.is_empty());
    }

    #[test]
    fn test_deserialize_service_entry() {
        let json = r#"{
            "Node": {"ID": "x", "Node": "node-a", "Address": "10.0.0.1", "Datacenter": "dc1"},
            "Service": {"ID": "web-1", "Service": "web", "Tags": null, "Port": 80},
            "Checks": [
                {"Node": "node-a", "CheckID": "serfHealth", "Status": "passing"},
                {"Node": "node-a", "CheckID": "service:web-1", "Status": "critical", "ServiceID": "web-1"}
            ]
        }"#;
        let entry: ServiceEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.node.node, "node-a");
        assert_eq!(entry.service.id, "web-1");
        assert!(entry.service.tags.is_empty());
        assert_eq!(entry.checks.len(), 2);
    }

    #[test]
    fn test_kv_value_str() {
        assert_eq!(KvPair::new("a", "42.5").value_str(), Some("42.5"));
        assert_eq!(KvPair::new("a", vec![0xff, 0xfe]).value_str(), None);
        let missing = KvPair {
            key: "a".to_string(),
            value: None,
        };
        assert_eq!(missing.value_str(), None);
    }
}
