//! The composed Shilp client.

use crate::collections::CollectionsApi;
use crate::config::{ClientConfig, UnregisterRoute};
use crate::data::DataApi;
use crate::debug::DebugApi;
use crate::error::ClientResult;
use crate::health::HealthApi;
use crate::oplog::{OplogApi, ReplicaGuard};
use crate::transport::Transport;
use std::sync::Arc;

/// Client for one Shilp server.
///
/// Cheap to clone; clones share the connection pool and the heartbeat
/// watermark guard. Endpoint groups are exposed as borrowed views:
///
/// ```no_run
/// # async fn run() -> shilp_client::ClientResult<()> {
/// use shilp_client::ShilpClient;
///
/// let client = ShilpClient::new("http://localhost:3000")?;
/// let health = client.health().check().await?;
/// let collections = client.collections().list().await?;
/// println!("{} ({} collections)", health.version, collections.data.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ShilpClient {
    transport: Arc<Transport>,
    guard: Arc<ReplicaGuard>,
    unregister_route: UnregisterRoute,
}

impl ShilpClient {
    /// Creates a client with default configuration.
    pub fn new(base_url: impl Into<String>) -> ClientResult<Self> {
        Self::with_config(ClientConfig::new(base_url))
    }

    /// Creates a client from configuration.
    pub fn with_config(config: ClientConfig) -> ClientResult<Self> {
        Ok(Self {
            transport: Arc::new(Transport::new(&config)?),
            guard: Arc::new(ReplicaGuard::default()),
            unregister_route: config.unregister_route,
        })
    }

    /// Returns the underlying transport.
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        self.transport.base_url()
    }

    /// Collection management.
    pub fn collections(&self) -> CollectionsApi<'_> {
        CollectionsApi::new(&self.transport)
    }

    /// Ingestion, search and storage.
    pub fn data(&self) -> DataApi<'_> {
        DataApi::new(&self.transport)
    }

    /// Index introspection.
    pub fn debug(&self) -> DebugApi<'_> {
        DebugApi::new(&self.transport)
    }

    /// Liveness.
    pub fn health(&self) -> HealthApi<'_> {
        HealthApi::new(&self.transport)
    }

    /// Oplog replication.
    pub fn oplog(&self) -> OplogApi<'_> {
        OplogApi::new(&self.transport, &self.guard, self.unregister_route)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn client_is_send_sync() {
        assert_send_sync::<ShilpClient>();
    }

    #[test]
    fn clones_share_transport() {
        let client = ShilpClient::new("http://localhost:3000/").unwrap();
        let other = client.clone();
        assert_eq!(other.base_url(), "http://localhost:3000");
        assert!(Arc::ptr_eq(&client.transport, &other.transport));
        assert!(Arc::ptr_eq(&client.guard, &other.guard));
    }
}
