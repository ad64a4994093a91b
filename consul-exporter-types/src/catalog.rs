//! Every metric family the exporter emits.
//!
//! Names and label schemas are an external contract: dashboards and alerts
//! match on them, so they must not change.

use crate::MetricDesc;

pub const UP: MetricDesc = MetricDesc {
    name: "up",
    help: "Was the last query of Consul successful.",
    labels: &[],
};

pub const RAFT_PEERS: MetricDesc = MetricDesc {
    name: "raft_peers",
    help: "How many peers (servers) are in the Raft cluster.",
    labels: &[],
};

pub const RAFT_LEADER: MetricDesc = MetricDesc {
    name: "raft_leader",
    help: "Does Raft cluster have a leader (according to this node).",
    labels: &[],
};

pub const SERF_LAN_MEMBERS: MetricDesc = MetricDesc {
    name: "serf_lan_members",
    help: "How many members are in the cluster.",
    labels: &["datacenter"],
};

pub const CATALOG_SERVICES: MetricDesc = MetricDesc {
    name: "catalog_services",
    help: "How many services are in the cluster.",
    labels: &["datacenter"],
};

pub const CATALOG_SERVICE_NODE_HEALTHY: MetricDesc = MetricDesc {
    name: "catalog_service_node_healthy",
    help: "Is this service healthy on this node?",
    labels: &["service_id", "node", "service_name", "datacenter", "tags"],
};

pub const HEALTH_NODE_STATUS: MetricDesc = MetricDesc {
    name: "health_node_status",
    help: "Status of health checks associated with a node.",
    labels: &["check", "node", "status", "datacenter"],
};

pub const HEALTH_SERVICE_STATUS: MetricDesc = MetricDesc {
    name: "health_service_status",
    help: "Status of health checks associated with a service.",
    labels: &[
        "check",
        "node",
        "service_id",
        "service_name",
        "status",
        "datacenter",
        "tags",
    ],
};

pub const CATALOG_KV: MetricDesc = MetricDesc {
    name: "catalog_kv",
    help: "The values for selected keys in Consul's key/value catalog. Keys with non-numeric values are omitted.",
    labels: &["key"],
};

/// Emitted by the HTTP layer, not by the collector.
pub const EXPORTER_BUILD_INFO: MetricDesc = MetricDesc {
    name: "exporter_build_info",
    help: "Build information of the running exporter.",
    labels: &["version"],
};

/// Families produced by a scrape, in exposition order.
pub const ALL: &[&MetricDesc] = &[
    &UP,
    &RAFT_PEERS,
    &RAFT_LEADER,
    &SERF_LAN_MEMBERS,
    &CATALOG_SERVICES,
    &CATALOG_SERVICE_NODE_HEALTHY,
    &HEALTH_NODE_STATUS,
    &HEALTH_SERVICE_STATUS,
    &CATALOG_KV,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_unique() {
        let mut names: Vec<_> = ALL.iter().map(|d| d.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), ALL.len());
    }

    #[test]
    fn test_label_schemas() {
        assert!(UP.labels.is_empty());
        assert!(RAFT_PEERS.labels.is_empty());
        assert!(RAFT_LEADER.labels.is_empty());
        assert_eq!(CATALOG_KV.labels, &["key"]);
        assert_eq!(HEALTH_SERVICE_STATUS.labels.len(), 7);
        assert_eq!(HEALTH_SERVICE_STATUS.labels[4], "status");
        assert_eq!(HEALTH_SERVICE_STATUS.labels[5], "datacenter");
    }
}
