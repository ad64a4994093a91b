//! In-memory Consul for collector tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use consul_exporter_client::{
    AgentService, ConsulApi, ConsulError, HealthCheck, KvPair, Node, QueryOptions,
    ServiceCatalog, ServiceEntry,
};
use tokio::sync::Barrier;

/// Canned answers for one datacenter. `None` makes the query fail.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeDatacenter {
    pub nodes: Option<Vec<Node>>,
    pub services: Option<ServiceCatalog>,
    pub checks: Option<Vec<HealthCheck>>,
    pub health: BTreeMap<String, Option<Vec<ServiceEntry>>>,
}

impl FakeDatacenter {
    /// One node running one passing instance of one service, no raw checks.
    pub fn single_service(node: &str, service: &str) -> Self {
        let mut dc = Self {
            nodes: Some(vec![Node {
                node: node.to_string(),
                ..Node::default()
            }]),
            services: Some(ServiceCatalog::new()),
            checks: Some(Vec::new()),
            health: BTreeMap::new(),
        };
        let id = format!("{}-1", service);
        dc.add_service(service, vec![instance(node, &id, service, &[], &["passing"])]);
        dc
    }

    pub fn add_service(&mut self, name: &str, entries: Vec<ServiceEntry>) {
        let tags = entries
            .first()
            .map(|e| e.service.tags.clone())
            .unwrap_or_default();
        self.services
            .get_or_insert_with(ServiceCatalog::new)
            .insert(name.to_string(), tags);
        self.health.insert(name.to_string(), Some(entries));
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeConsul {
    pub peers: Option<Vec<String>>,
    pub leader: Option<String>,
    pub datacenters: Option<Vec<String>>,
    pub agent_datacenter: Option<String>,
    pub dcs: BTreeMap<String, FakeDatacenter>,
    pub kv: Option<Vec<KvPair>>,
    /// Held by every `nodes` call until the barrier fills.
    pub nodes_gate: Option<Arc<Barrier>>,
    /// Held by every `service_health` call until the barrier fills.
    pub health_gate: Option<Arc<Barrier>>,
    calls: Mutex<Vec<String>>,
}

impl FakeConsul {
    /// Three peers, a leader, no datacenters yet, empty KV.
    pub fn healthy() -> Self {
        Self {
            peers: Some(vec![
                "10.0.0.1:8300".to_string(),
                "10.0.0.2:8300".to_string(),
                "10.0.0.3:8300".to_string(),
            ]),
            leader: Some("10.0.0.1:8300".to_string()),
            datacenters: Some(Vec::new()),
            agent_datacenter: None,
            dcs: BTreeMap::new(),
            kv: Some(Vec::new()),
            nodes_gate: None,
            health_gate: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_datacenter(mut self, name: &str, dc: FakeDatacenter) -> Self {
        if let Some(list) = self.datacenters.as_mut() {
            list.push(name.to_string());
        }
        self.dcs.insert(name.to_string(), dc);
        self
    }

    pub fn with_kv(mut self, pairs: Vec<KvPair>) -> Self {
        self.kv = Some(pairs);
        self
    }

    /// Every query made so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn dc(&self, options: &QueryOptions) -> Option<&FakeDatacenter> {
        self.dcs.get(options.datacenter.as_deref().unwrap_or_default())
    }
}

fn answer<T: Clone>(value: Option<&T>, what: &str) -> Result<T, ConsulError> {
    value
        .cloned()
        .ok_or_else(|| ConsulError::Connection(format!("{} unavailable", what)))
}

fn dc_label(options: &QueryOptions) -> &str {
    options.datacenter.as_deref().unwrap_or_default()
}

#[async_trait]
impl ConsulApi for FakeConsul {
    async fn peers(&self) -> Result<Vec<String>, ConsulError> {
        self.record("peers".to_string());
        answer(self.peers.as_ref(), "peers")
    }

    async fn leader(&self) -> Result<String, ConsulError> {
        self.record("leader".to_string());
        answer(self.leader.as_ref(), "leader")
    }

    async fn datacenters(&self) -> Result<Vec<String>, ConsulError> {
        self.record("datacenters".to_string());
        answer(self.datacenters.as_ref(), "datacenters")
    }

    async fn agent_datacenter(&self) -> Result<String, ConsulError> {
        self.record("agent_datacenter".to_string());
        answer(self.agent_datacenter.as_ref(), "agent")
    }

    async fn nodes(&self, options: &QueryOptions) -> Result<Vec<Node>, ConsulError> {
        self.record(format!("nodes {}", dc_label(options)));
        if let Some(gate) = &self.nodes_gate {
            gate.wait().await;
        }
        answer(self.dc(options).and_then(|d| d.nodes.as_ref()), "nodes")
    }

    async fn services(&self, options: &QueryOptions) -> Result<ServiceCatalog, ConsulError> {
        self.record(format!("services {}", dc_label(options)));
        answer(self.dc(options).and_then(|d| d.services.as_ref()), "services")
    }

    async fn checks(&self, options: &QueryOptions) -> Result<Vec<HealthCheck>, ConsulError> {
        self.record(format!("checks {}", dc_label(options)));
        answer(self.dc(options).and_then(|d| d.checks.as_ref()), "checks")
    }

    async fn service_health(
        &self,
        service: &str,
        options: &QueryOptions,
    ) -> Result<Vec<ServiceEntry>, ConsulError> {
        self.record(format!("service_health {} {}", service, dc_label(options)));
        if let Some(gate) = &self.health_gate {
            gate.wait().await;
        }
        let entries = self
            .dc(options)
            .and_then(|d| d.health.get(service))
            .and_then(Option::as_ref);
        answer(entries, "service health")
    }

    async fn kv_list(
        &self,
        prefix: &str,
        _options: &QueryOptions,
    ) -> Result<Vec<KvPair>, ConsulError> {
        self.record(format!("kv_list {}", prefix));
        answer(self.kv.as_ref(), "kv")
    }
}

/// A node-level check.
pub(crate) fn check(node: &str, check_id: &str, status: &str) -> HealthCheck {
    HealthCheck {
        node: node.to_string(),
        check_id: check_id.to_string(),
        name: check_id.to_string(),
        status: status.to_string(),
        ..HealthCheck::default()
    }
}

/// A service-level check.
pub(crate) fn service_check(
    node: &str,
    check_id: &str,
    status: &str,
    service_id: &str,
    service_name: &str,
    tags: &[&str],
) -> HealthCheck {
    HealthCheck {
        service_id: service_id.to_string(),
        service_name: service_name.to_string(),
        service_tags: tags.iter().map(|t| t.to_string()).collect(),
        ..check(node, check_id, status)
    }
}

/// A service instance whose checks carry the given statuses.
pub(crate) fn instance(
    node: &str,
    service_id: &str,
    service_name: &str,
    tags: &[&str],
    statuses: &[&str],
) -> ServiceEntry {
    ServiceEntry {
        node: Node {
            node: node.to_string(),
            ..Node::default()
        },
        service: AgentService {
            id: service_id.to_string(),
            service: service_name.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        },
        checks: statuses
            .iter()
            .enumerate()
            .map(|(i, status)| {
                service_check(
                    node,
                    &format!("service:{}:{}", service_id, i),
                    status,
                    service_id,
                    service_name,
                    tags,
                )
            })
            .collect(),
    }
}
