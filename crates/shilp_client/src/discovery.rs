//! Discovery control-plane client.
//!
//! The discovery service tracks which Shilp nodes serve reads and writes
//! for an account and gates traffic while a node is syncing. It runs at its
//! own address, so this client has its own transport.

use crate::config::ClientConfig;
use crate::error::ClientResult;
use crate::transport::{ApiRequest, Transport};
use shilp_protocol::{
    DiscoveryStats, GenericResponse, RegisterToDiscoveryRequest, ReplicaType, SyncStatus,
    UpdateSyncStatusRequest,
};
use tracing::{info, warn};

/// Client for the discovery service.
#[derive(Debug, Clone)]
pub struct DiscoveryClient {
    transport: Transport,
}

impl DiscoveryClient {
    /// Creates a client with default configuration.
    pub fn new(base_url: impl Into<String>) -> ClientResult<Self> {
        Self::with_config(ClientConfig::new(base_url))
    }

    /// Creates a client from configuration.
    pub fn with_config(config: ClientConfig) -> ClientResult<Self> {
        Ok(Self {
            transport: Transport::new(&config)?,
        })
    }

    /// Returns the underlying transport.
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Registry and proxy statistics for an account.
    pub async fn get_shilp_stats(&self, account_id: &str) -> ClientResult<DiscoveryStats> {
        self.transport
            .request(ApiRequest::get("/control/shilp/stats").query("account_id", account_id))
            .await
    }

    /// Reports whether a node is syncing or ready for traffic.
    pub async fn update_shilp_sync_status(
        &self,
        account_id: &str,
        address: &str,
        status: SyncStatus,
    ) -> ClientResult<GenericResponse> {
        let body = UpdateSyncStatusRequest {
            account_id: account_id.to_string(),
            address: address.to_string(),
            status,
        };
        let response: GenericResponse = self
            .transport
            .request(ApiRequest::post("/control/shilp/sync-status").json(&body)?)
            .await?;
        info!(account_id, address, %status, "updated sync status");
        Ok(response)
    }

    /// Registers a Shilp node.
    ///
    /// A single node is registered twice, first for reads and then for
    /// writes.
    pub async fn register_shilp_service(
        &self,
        account_id: &str,
        address: &str,
        id: &str,
        replica_type: ReplicaType,
    ) -> ClientResult<Vec<GenericResponse>> {
        self.shilp_registration("/control/shilp/register", account_id, address, id, replica_type)
            .await
    }

    /// Unregisters a Shilp node, mirroring [`register_shilp_service`](Self::register_shilp_service).
    pub async fn unregister_shilp_service(
        &self,
        account_id: &str,
        address: &str,
        id: &str,
        replica_type: ReplicaType,
    ) -> ClientResult<Vec<GenericResponse>> {
        self.shilp_registration("/control/shilp/unregister", account_id, address, id, replica_type)
            .await
    }

    /// Registers a text-embedding-inference service (read only).
    pub async fn register_tei_service(
        &self,
        account_id: &str,
        address: &str,
        id: &str,
    ) -> ClientResult<GenericResponse> {
        self.post_registration("/control/tei/register", tei_request(account_id, address, id))
            .await
    }

    /// Unregisters a text-embedding-inference service.
    pub async fn unregister_tei_service(
        &self,
        account_id: &str,
        address: &str,
        id: &str,
    ) -> ClientResult<GenericResponse> {
        self.post_registration("/control/tei/unregister", tei_request(account_id, address, id))
            .await
    }

    async fn shilp_registration(
        &self,
        path: &str,
        account_id: &str,
        address: &str,
        id: &str,
        replica_type: ReplicaType,
    ) -> ClientResult<Vec<GenericResponse>> {
        let mut responses = Vec::new();
        // Sequential: the registry applies read and write roles in order.
        for &(is_read, is_write) in replica_type.registrations() {
            let body = RegisterToDiscoveryRequest {
                account_id: account_id.to_string(),
                address: address.to_string(),
                id: id.to_string(),
                is_read,
                is_write,
            };
            responses.push(self.post_registration(path, body).await?);
        }
        Ok(responses)
    }

    async fn post_registration(
        &self,
        path: &str,
        body: RegisterToDiscoveryRequest,
    ) -> ClientResult<GenericResponse> {
        let response: GenericResponse = self
            .transport
            .request(ApiRequest::post(path).json(&body)?)
            .await?;
        if response.success {
            info!(
                path,
                id = %body.id,
                is_read = body.is_read,
                is_write = body.is_write,
                "discovery registration"
            );
        } else {
            warn!(path, id = %body.id, message = %response.message, "discovery registration rejected");
        }
        Ok(response)
    }
}

fn tei_request(account_id: &str, address: &str, id: &str) -> RegisterToDiscoveryRequest {
    RegisterToDiscoveryRequest {
        account_id: account_id.to_string(),
        address: address.to_string(),
        id: id.to_string(),
        is_read: true,
        is_write: false,
    }
}
