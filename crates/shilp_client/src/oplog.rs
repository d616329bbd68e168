//! Oplog replication endpoints.
//!
//! Lifecycle per replica: `register_replica`, then any number of
//! `update_replica_lsn` heartbeats, then `unregister_replica`. Reading
//! entries and status needs no registration.
//!
//! The client keeps the highest LSN it has heartbeated for every
//! `(collection, replica_id)` and refuses to report a lower one. Lifecycle
//! and heartbeat calls for the same replica ID run one at a time, in the
//! order they were issued. Both guarantees hold per client (and its
//! clones); across processes they remain the caller's job.

use crate::config::UnregisterRoute;
use crate::error::{ClientError, ClientResult};
use crate::transport::{ApiRequest, Transport};
use parking_lot::{Mutex, RwLock};
use shilp_protocol::{
    GenericResponse, GetOplogResponse, Lsn, OplogStatusResponse, RegisterReplicaRequest,
    UnregisterReplicaRequest, UpdateReplicaLsnRequest, UpdateReplicaLsnResponse,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

const BASE: &str = "/api/oplog/v1";

/// Per-replica ordering and heartbeat watermarks.
#[derive(Debug, Default)]
pub struct ReplicaGuard {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    watermarks: RwLock<HashMap<(String, String), Lsn>>,
}

impl ReplicaGuard {
    fn lock_for(&self, replica_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .entry(replica_id.to_string())
            .or_default()
            .clone()
    }

    fn check(&self, collection: &str, replica_id: &str, lsn: Lsn) -> ClientResult<()> {
        let key = (collection.to_string(), replica_id.to_string());
        match self.watermarks.read().get(&key) {
            Some(&last) if lsn < last => Err(ClientError::LsnRegression {
                collection: key.0,
                replica_id: key.1,
                last,
                attempted: lsn,
            }),
            _ => Ok(()),
        }
    }

    fn record(&self, collection: &str, replica_id: &str, lsn: Lsn) {
        let mut watermarks = self.watermarks.write();
        let entry = watermarks
            .entry((collection.to_string(), replica_id.to_string()))
            .or_insert(lsn);
        *entry = (*entry).max(lsn);
    }

    fn forget(&self, replica_id: &str) {
        self.watermarks.write().retain(|(_, id), _| id != replica_id);
    }

    /// Drops the replica's lock entry if `held` is the only outstanding
    /// clone. Callers still queued on the lock keep the entry alive.
    fn release(&self, replica_id: &str, held: &Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.locks.lock();
        let idle = locks
            .get(replica_id)
            .is_some_and(|lock| Arc::ptr_eq(lock, held) && Arc::strong_count(held) == 2);
        if idle {
            locks.remove(replica_id);
        }
    }

    /// Highest LSN successfully reported for a replica on a collection.
    pub fn last_reported(&self, collection: &str, replica_id: &str) -> Option<Lsn> {
        self.watermarks
            .read()
            .get(&(collection.to_string(), replica_id.to_string()))
            .copied()
    }
}

/// Oplog endpoints, borrowed from a [`ShilpClient`](crate::ShilpClient).
#[derive(Debug, Clone, Copy)]
pub struct OplogApi<'a> {
    transport: &'a Transport,
    guard: &'a ReplicaGuard,
    unregister_route: UnregisterRoute,
}

impl<'a> OplogApi<'a> {
    pub(crate) fn new(
        transport: &'a Transport,
        guard: &'a ReplicaGuard,
        unregister_route: UnregisterRoute,
    ) -> Self {
        Self {
            transport,
            guard,
            unregister_route,
        }
    }

    /// Fetches entries with `lsn > after_lsn`, oldest first.
    ///
    /// An empty `collection` reads every collection. `limit` is sent only
    /// when positive; otherwise the server default applies. A batch that is
    /// not strictly ascending or that contains entries at or before
    /// `after_lsn` fails with [`ClientError::Protocol`].
    ///
    /// Delivery is at-least-once: persist the new high-water LSN only after
    /// the batch has been applied.
    pub async fn get_oplog_entries(
        &self,
        collection: &str,
        after_lsn: Lsn,
        limit: Option<u32>,
    ) -> ClientResult<GetOplogResponse> {
        let mut request = ApiRequest::get(format!("{BASE}/")).query("after_lsn", after_lsn);
        if !collection.is_empty() {
            request = request.query("collection", collection);
        }
        if let Some(limit) = limit.filter(|l| *l > 0) {
            request = request.query("limit", limit);
        }

        let response: GetOplogResponse = self.transport.request(request).await?;
        if let Err(e) = response.verify_order(after_lsn) {
            warn!(collection, after_lsn, error = %e, "oplog batch out of order");
            return Err(e.into());
        }
        debug!(
            collection,
            after_lsn,
            count = response.entries.len(),
            last_lsn = response.last_lsn,
            "fetched oplog entries"
        );
        Ok(response)
    }

    /// Reports a replica's last applied LSN (heartbeat).
    ///
    /// Reporting the same LSN again is a keep-alive. A lower LSN than one
    /// already reported fails with [`ClientError::LsnRegression`] and sends
    /// nothing.
    pub async fn update_replica_lsn(
        &self,
        collection: &str,
        replica_id: &str,
        lsn: Lsn,
    ) -> ClientResult<UpdateReplicaLsnResponse> {
        require_replica_id(replica_id)?;
        let lock = self.guard.lock_for(replica_id);
        let _ordered = lock.lock().await;

        self.guard.check(collection, replica_id, lsn)?;

        let body = UpdateReplicaLsnRequest {
            collection: collection.to_string(),
            replica_id: replica_id.to_string(),
            lsn,
        };
        let response: UpdateReplicaLsnResponse = self
            .transport
            .request(ApiRequest::post(format!("{BASE}/heartbeat")).json(&body)?)
            .await?;

        if response.success {
            self.guard.record(collection, replica_id, lsn);
            debug!(collection, replica_id, lsn, "heartbeat accepted");
        } else {
            warn!(collection, replica_id, lsn, message = %response.message, "heartbeat rejected");
        }
        Ok(response)
    }

    /// Registers a replica for retention tracking. Safe to repeat.
    pub async fn register_replica(&self, replica_id: &str) -> ClientResult<GenericResponse> {
        require_replica_id(replica_id)?;
        let lock = self.guard.lock_for(replica_id);
        let _ordered = lock.lock().await;

        let body = RegisterReplicaRequest {
            replica_id: replica_id.to_string(),
        };
        let response: GenericResponse = self
            .transport
            .request(ApiRequest::post(format!("{BASE}/register")).json(&body)?)
            .await?;
        info!(replica_id, success = response.success, "registered replica");
        Ok(response)
    }

    /// Unregisters a replica so the server may trim past its watermark.
    /// Safe to repeat.
    ///
    /// Sent to the path chosen by
    /// [`ClientConfig::unregister_route`](crate::ClientConfig::unregister_route).
    /// Heartbeat watermarks are cleared only when the dedicated route
    /// accepts the call; the shared register path leaves the replica
    /// tracked on the server, so its watermarks stay in force.
    pub async fn unregister_replica(&self, replica_id: &str) -> ClientResult<GenericResponse> {
        require_replica_id(replica_id)?;
        let lock = self.guard.lock_for(replica_id);
        let _ordered = lock.lock().await;

        let body = UnregisterReplicaRequest {
            replica_id: replica_id.to_string(),
        };
        let response: GenericResponse = self
            .transport
            .request(ApiRequest::post(self.unregister_route.path()).json(&body)?)
            .await?;
        if response.success {
            if self.unregister_route == UnregisterRoute::Dedicated {
                self.guard.forget(replica_id);
            }
            self.guard.release(replica_id, &lock);
        }
        info!(replica_id, success = response.success, "unregistered replica");
        Ok(response)
    }

    /// Returns a snapshot of a collection's oplog.
    pub async fn get_oplog_status(&self, collection: &str) -> ClientResult<OplogStatusResponse> {
        if collection.is_empty() {
            return Err(ClientError::Validation("collection cannot be empty".into()));
        }
        self.transport
            .request(ApiRequest::get(format!("{BASE}/status")).query("collection", collection))
            .await
    }

    /// Highest LSN this client has successfully reported for the replica.
    pub fn last_reported_lsn(&self, collection: &str, replica_id: &str) -> Option<Lsn> {
        self.guard.last_reported(collection, replica_id)
    }
}

fn require_replica_id(replica_id: &str) -> ClientResult<()> {
    if replica_id.is_empty() {
        return Err(ClientError::Validation("replica_id cannot be empty".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_allows_equal_and_higher() {
        let guard = ReplicaGuard::default();
        assert!(guard.check("docs", "r1", 0).is_ok());

        guard.record("docs", "r1", 10);
        assert!(guard.check("docs", "r1", 10).is_ok());
        assert!(guard.check("docs", "r1", 11).is_ok());
        assert_eq!(guard.last_reported("docs", "r1"), Some(10));
    }

    #[test]
    fn guard_rejects_regression() {
        let guard = ReplicaGuard::default();
        guard.record("docs", "r1", 10);

        let err = guard.check("docs", "r1", 9).unwrap_err();
        assert!(matches!(
            err,
            ClientError::LsnRegression {
                last: 10,
                attempted: 9,
                ..
            }
        ));
    }

    #[test]
    fn guard_is_keyed_by_collection_and_replica() {
        let guard = ReplicaGuard::default();
        guard.record("docs", "r1", 10);

        assert!(guard.check("images", "r1", 1).is_ok());
        assert!(guard.check("docs", "r2", 1).is_ok());
    }

    #[test]
    fn record_never_lowers() {
        let guard = ReplicaGuard::default();
        guard.record("docs", "r1", 10);
        guard.record("docs", "r1", 3);
        assert_eq!(guard.last_reported("docs", "r1"), Some(10));
    }

    #[test]
    fn forget_clears_all_collections_for_replica() {
        let guard = ReplicaGuard::default();
        guard.record("docs", "r1", 10);
        guard.record("images", "r1", 4);
        guard.record("docs", "r2", 7);

        guard.forget("r1");
        assert_eq!(guard.last_reported("docs", "r1"), None);
        assert_eq!(guard.last_reported("images", "r1"), None);
        assert_eq!(guard.last_reported("docs", "r2"), Some(7));
    }

    #[test]
    fn release_drops_idle_lock_entry() {
        let guard = ReplicaGuard::default();
        let held = guard.lock_for("r1");

        guard.release("r1", &held);
        assert!(!guard.locks.lock().contains_key("r1"));

        // A fresh lock is handed out on the next call.
        let next = guard.lock_for("r1");
        assert!(!Arc::ptr_eq(&held, &next));
    }

    #[test]
    fn release_keeps_lock_while_others_wait() {
        let guard = ReplicaGuard::default();
        let held = guard.lock_for("r1");
        let queued = guard.lock_for("r1");

        guard.release("r1", &held);
        assert!(guard.locks.lock().contains_key("r1"));
        assert!(Arc::ptr_eq(&queued, &guard.lock_for("r1")));
    }

    #[test]
    fn release_ignores_stale_handle() {
        let guard = ReplicaGuard::default();
        let stale = guard.lock_for("r1");
        guard.release("r1", &stale);
        let current = guard.lock_for("r1");

        guard.release("r1", &stale);
        assert!(Arc::ptr_eq(&current, &guard.lock_for("r1")));
    }

    #[test]
    fn same_replica_shares_lock() {
        let guard = ReplicaGuard::default();
        let a = guard.lock_for("r1");
        let b = guard.lock_for("r1");
        let c = guard.lock_for("r2");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
