//! Static description of the node the shim pretends to be.

use chrono::{DateTime, Utc};

use shim_shared_types::{ConditionStatus, NodeAddress, NodeAddressType, NodeCapacity, NodeCondition};

/// Node facts fixed for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    capacity: NodeCapacity,
    addresses: Vec<NodeAddress>,
    ready_since: DateTime<Utc>,
}

impl NodeInfo {
    /// An empty or missing `node_ip` reports no addresses.
    pub fn new(capacity: NodeCapacity, node_ip: Option<&str>) -> Self {
        let addresses = node_ip
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .map(|ip| NodeAddress {
                address_type: NodeAddressType::InternalIp,
                address: ip.to_string(),
            })
            .into_iter()
            .collect();

        Self {
            capacity,
            addresses,
            ready_since: Utc::now(),
        }
    }

    pub fn capacity(&self) -> &NodeCapacity {
        &self.capacity
    }

    pub fn addresses(&self) -> &[NodeAddress] {
        &self.addresses
    }

    /// The node is always Ready; the heartbeat is the time of the report.
    pub fn conditions(&self, now: DateTime<Utc>) -> Vec<NodeCondition> {
        vec![NodeCondition {
            condition_type: "Ready".to_string(),
            status: ConditionStatus::True,
            last_heartbeat_time: Some(now),
            last_transition_time: Some(self.ready_since),
            reason: Some("KubeletReady".to_string()),
            message: Some("At your service".to_string()),
        }]
    }
}
