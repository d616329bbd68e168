//! Index introspection endpoints.

use crate::error::ClientResult;
use crate::transport::{segment, ApiRequest, Transport};
use shilp_protocol::{
    DebugDistanceResponse, DebugLevelsResponse, DebugNodeInfoResponse, DebugNodesAtLevelResponse,
    DebugReferenceNodeResponse,
};

const BASE: &str = "/api/collections/v1/debug";

/// Debug endpoints, borrowed from a [`ShilpClient`](crate::ShilpClient).
#[derive(Debug, Clone, Copy)]
pub struct DebugApi<'a> {
    transport: &'a Transport,
}

impl<'a> DebugApi<'a> {
    pub(crate) fn new(transport: &'a Transport) -> Self {
        Self { transport }
    }

    /// Distance between `text` and an index node.
    pub async fn get_collection_distance(
        &self,
        collection: &str,
        field: &str,
        node_id: u64,
        text: &str,
    ) -> ClientResult<DebugDistanceResponse> {
        let path = format!(
            "{BASE}/{}/{}/distance/{node_id}",
            segment(collection),
            segment(field)
        );
        self.transport
            .request(ApiRequest::get(path).query("text", text))
            .await
    }

    /// One index node and its neighbors.
    pub async fn get_collection_node_info(
        &self,
        collection: &str,
        field: &str,
        node_id: u64,
    ) -> ClientResult<DebugNodeInfoResponse> {
        let path = format!(
            "{BASE}/{}/{}/nodes/{node_id}",
            segment(collection),
            segment(field)
        );
        self.transport.request(ApiRequest::get(path)).await
    }

    /// Neighbors of a node at one graph level, paginated.
    pub async fn get_collection_node_neighbors_at_level(
        &self,
        collection: &str,
        field: &str,
        node_id: u64,
        level: u32,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> ClientResult<DebugNodeInfoResponse> {
        let path = format!(
            "{BASE}/{}/{}/nodes/{node_id}/neighbors/{level}",
            segment(collection),
            segment(field)
        );
        let mut request = ApiRequest::get(path);
        if let Some(limit) = limit {
            request = request.query("limit", limit);
        }
        if let Some(offset) = offset {
            request = request.query("offset", offset);
        }
        self.transport.request(request).await
    }

    /// Graph levels per indexed field.
    pub async fn get_collection_levels(&self, collection: &str) -> ClientResult<DebugLevelsResponse> {
        let path = format!("{BASE}/{}/levels", segment(collection));
        self.transport.request(ApiRequest::get(path)).await
    }

    /// Node IDs at one level, per indexed field.
    pub async fn get_collection_nodes_at_level(
        &self,
        collection: &str,
        level: u32,
    ) -> ClientResult<DebugNodesAtLevelResponse> {
        let path = format!("{BASE}/{}/levels/{level}", segment(collection));
        self.transport.request(ApiRequest::get(path)).await
    }

    /// The record behind a reference node and its vector nodes.
    pub async fn get_collection_node_by_reference_node_id(
        &self,
        collection: &str,
        node_id: u64,
    ) -> ClientResult<DebugReferenceNodeResponse> {
        let path = format!("{BASE}/{}/nodes/reference_node/{node_id}", segment(collection));
        self.transport.request(ApiRequest::get(path)).await
    }
}
