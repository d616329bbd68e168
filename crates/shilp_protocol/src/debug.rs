//! Index introspection models for the debug endpoints.

use crate::JsonMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Distance between a node and a query text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebugDistance {
    /// Distance to the query embedding.
    pub distance: f64,
    /// The query embedding.
    #[serde(default)]
    pub vector: Vec<f32>,
}

/// Response of the node distance endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebugDistanceResponse {
    /// Success flag.
    #[serde(default)]
    pub success: bool,
    /// Status message.
    #[serde(default)]
    pub message: String,
    /// Distance payload.
    #[serde(default)]
    pub data: DebugDistance,
}

/// A neighbor edge of an index node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugNeighbor {
    /// Neighbor node ID.
    pub node_id: u64,
    /// Record ID the vector belongs to.
    pub vector_id: String,
    /// Indexed field.
    pub field: String,
    /// Distance to the source node.
    pub distance: f64,
    /// Record metadata.
    #[serde(default)]
    pub metadata: JsonMap,
}

/// An index node with its neighbors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugNodeInfo {
    /// Node ID.
    pub node_id: u64,
    /// Record ID the vector belongs to.
    pub vector_id: String,
    /// Indexed field.
    pub field: String,
    /// Top level the node appears on.
    pub level: u32,
    /// Record metadata.
    #[serde(default)]
    pub metadata: JsonMap,
    /// Neighbor edges.
    #[serde(default)]
    pub neighbors: Vec<DebugNeighbor>,
}

/// Response of the node info and neighbors endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebugNodeInfoResponse {
    /// Success flag.
    #[serde(default)]
    pub success: bool,
    /// Status message.
    #[serde(default)]
    pub message: String,
    /// Node, `None` if it does not exist.
    #[serde(default)]
    pub data: Option<DebugNodeInfo>,
}

/// Node count on one index level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugLevelInfo {
    /// Level number.
    pub level: u32,
    /// Nodes on the level.
    pub node_count: u64,
}

/// Response of the levels endpoint, keyed by field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugLevelsResponse {
    /// Success flag.
    #[serde(default)]
    pub success: bool,
    /// Status message.
    #[serde(default)]
    pub message: String,
    /// Level stats per field.
    #[serde(default)]
    pub data: HashMap<String, Vec<DebugLevelInfo>>,
}

/// Response of the nodes-at-level endpoint, keyed by field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugNodesAtLevelResponse {
    /// Success flag.
    #[serde(default)]
    pub success: bool,
    /// Status message.
    #[serde(default)]
    pub message: String,
    /// Node IDs per field.
    #[serde(default)]
    pub data: HashMap<String, Vec<u64>>,
}

/// One vector node of a reference record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugVectorNode {
    /// Node ID.
    pub id: u64,
    /// Indexed field.
    pub field: String,
    /// Stored vector.
    #[serde(default)]
    pub vector: Vec<f32>,
}

/// A reference record and the index nodes built from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugReferenceNode {
    /// Record ID.
    pub id: String,
    /// Record metadata.
    #[serde(default)]
    pub metadata: JsonMap,
    /// Vector nodes.
    #[serde(default)]
    pub nodes: Vec<DebugVectorNode>,
}

/// Response of the reference node endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebugReferenceNodeResponse {
    /// Success flag.
    #[serde(default)]
    pub success: bool,
    /// Status message.
    #[serde(default)]
    pub message: String,
    /// Reference node, `None` if it does not exist.
    #[serde(default)]
    pub data: Option<DebugReferenceNode>,
}
