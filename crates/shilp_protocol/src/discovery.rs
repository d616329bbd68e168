//! Discovery control-plane models.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A Shilp node known to the discovery registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaNode {
    /// Node ID.
    pub id: String,
    /// Node address.
    pub address: String,
    /// Last health check result.
    #[serde(default)]
    pub is_healthy: bool,
    /// Traffic gate: no traffic is routed while the node is syncing.
    #[serde(default)]
    pub is_syncing: bool,
}

/// Registry view for one account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStatus {
    /// Current write replica.
    #[serde(default)]
    pub write_replica: ReplicaNode,
    /// Read replicas.
    #[serde(default)]
    pub read_replicas: Vec<ReplicaNode>,
    /// Nodes eligible for traffic.
    #[serde(default)]
    pub available_count: u32,
    /// All registered nodes.
    #[serde(default)]
    pub total_count: u32,
}

/// Proxy statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyStats {
    /// Open proxy connections.
    #[serde(default)]
    pub active_proxies: u32,
    /// Proxy targets.
    #[serde(default)]
    pub targets: Vec<String>,
}

/// Response of `GET /control/shilp/stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryStats {
    /// Registry status.
    #[serde(default)]
    pub registry: RegistryStatus,
    /// Proxy statistics.
    #[serde(default)]
    pub proxy: ProxyStats,
}

/// Sync status reported by a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Caught up and accepting traffic.
    Ready,
    /// Replaying the oplog; traffic is gated.
    Syncing,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::Ready => f.write_str("ready"),
            SyncStatus::Syncing => f.write_str("syncing"),
        }
    }
}

/// Body of `POST /control/shilp/sync-status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSyncStatusRequest {
    /// Account the node belongs to.
    pub account_id: String,
    /// Node address.
    pub address: String,
    /// New status.
    pub status: SyncStatus,
}

/// Body of the register/unregister control endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterToDiscoveryRequest {
    /// Account the service belongs to.
    pub account_id: String,
    /// Service address.
    pub address: String,
    /// Service ID.
    pub id: String,
    /// Registers the service for reads.
    pub is_read: bool,
    /// Registers the service for writes.
    pub is_write: bool,
}

/// Role a Shilp node plays in a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplicaType {
    /// Serves reads only.
    ReadReplica,
    /// Serves writes only.
    WriteReplica,
    /// Serves both; registered once per role.
    SingleNode,
}

impl ReplicaType {
    /// Returns the `(is_read, is_write)` registrations this role needs,
    /// in the order they are sent.
    pub fn registrations(&self) -> &'static [(bool, bool)] {
        match self {
            ReplicaType::ReadReplica => &[(true, false)],
            ReplicaType::WriteReplica => &[(false, true)],
            ReplicaType::SingleNode => &[(true, false), (false, true)],
        }
    }
}
