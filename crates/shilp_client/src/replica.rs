//! Replica follower state machine.
//!
//! [`ReplicaSync`] drives one replica through the oplog protocol:
//! register, then repeatedly pull entries after the applied LSN, apply them
//! through an [`OplogApplier`], persist the new LSN and heartbeat it, and
//! finally unregister.
//!
//! ## Invariants
//!
//! - Entries are applied in the order the server returned them
//! - The applied LSN is persisted only after the batch applied cleanly
//! - The heartbeat never runs ahead of the persisted LSN
//! - A crash between apply and persist re-delivers the batch, so appliers
//!   must be idempotent per `doc_id`

use crate::client::ShilpClient;
use crate::config::ReplicaConfig;
use crate::error::{ClientError, ClientResult};
use parking_lot::RwLock;
use shilp_protocol::{Change, JsonMap, Lsn, OplogEntry};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// The current state of a replica follower.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaState {
    /// Not yet registered.
    Idle,
    /// Registering with the server.
    Registering,
    /// Fetching oplog entries.
    Pulling,
    /// Applying a fetched batch.
    Applying,
    /// Reporting the applied LSN.
    Heartbeating,
    /// Caught up as of the last cycle.
    Synced,
    /// The last operation failed.
    Error,
    /// Waiting before retrying.
    RetryWait,
    /// Unregistered from the server.
    Unregistered,
}

impl ReplicaState {
    /// Returns true while a cycle is running.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ReplicaState::Registering
                | ReplicaState::Pulling
                | ReplicaState::Applying
                | ReplicaState::Heartbeating
        )
    }

    /// Returns true if a new cycle may start from this state.
    pub fn can_start_sync(&self) -> bool {
        matches!(
            self,
            ReplicaState::Idle | ReplicaState::Synced | ReplicaState::Error | ReplicaState::RetryWait
        )
    }
}

/// Statistics about a follower.
#[derive(Debug, Clone, Default)]
pub struct ReplicaStats {
    /// Sync cycles completed.
    pub cycles_completed: u64,
    /// Entries applied.
    pub entries_applied: u64,
    /// Batches applied.
    pub batches_applied: u64,
    /// Heartbeats accepted by the server.
    pub heartbeats_sent: u64,
    /// Retries performed by `sync_with_retry`.
    pub retries: u64,
    /// Applied LSN after the last cycle.
    pub applied_lsn: Lsn,
    /// Last successful cycle.
    pub last_sync_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Result of one sync cycle.
#[derive(Debug, Clone, Default)]
pub struct ReplicaCycleResult {
    /// Entries applied.
    pub applied: u64,
    /// Batches fetched and applied.
    pub batches: u64,
    /// Applied LSN at the end of the cycle.
    pub applied_lsn: Lsn,
    /// Duration of the cycle.
    pub duration: Duration,
}

/// Applies oplog entries to local state.
///
/// Failures reach the follower's caller as [`ClientError::Apply`].
pub trait OplogApplier: Send + Sync {
    /// Applies a batch in order. Must be idempotent per `doc_id`.
    fn apply(&self, entries: &[OplogEntry]) -> ClientResult<()>;

    /// Returns the last persisted LSN, 0 if nothing has been applied.
    fn applied_lsn(&self) -> ClientResult<Lsn>;

    /// Persists the LSN after a batch has been applied.
    fn set_applied_lsn(&self, lsn: Lsn) -> ClientResult<()>;
}

/// Follows one collection's oplog for one replica.
pub struct ReplicaSync<A: OplogApplier> {
    client: ShilpClient,
    config: ReplicaConfig,
    applier: Arc<A>,
    state: RwLock<ReplicaState>,
    stats: RwLock<ReplicaStats>,
    registered: AtomicBool,
    cancelled: AtomicBool,
}

impl<A: OplogApplier> ReplicaSync<A> {
    /// Creates a follower.
    pub fn new(client: ShilpClient, config: ReplicaConfig, applier: A) -> Self {
        Self {
            client,
            config,
            applier: Arc::new(applier),
            state: RwLock::new(ReplicaState::Idle),
            stats: RwLock::new(ReplicaStats::default()),
            registered: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Gets the current state.
    pub fn state(&self) -> ReplicaState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> ReplicaStats {
        self.stats.read().clone()
    }

    /// Gets the applier.
    pub fn applier(&self) -> &Arc<A> {
        &self.applier
    }

    /// Gets the configuration.
    pub fn config(&self) -> &ReplicaConfig {
        &self.config
    }

    /// Returns true once `start` has succeeded and `stop` has not run.
    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    /// Stops the running cycle at the next batch boundary.
    ///
    /// Stays in effect until [`reset_cancel`](Self::reset_cancel) or
    /// [`start`](Self::start).
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Clears a previous `cancel`.
    pub fn reset_cancel(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    fn check_cancelled(&self) -> ClientResult<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            Err(ClientError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn set_state(&self, state: ReplicaState) {
        *self.state.write() = state;
    }

    fn invalid_transition(&self, to: &str) -> ClientError {
        ClientError::InvalidState {
            from: format!("{:?}", self.state()),
            to: to.into(),
        }
    }

    /// Registers the replica with the server.
    pub async fn start(&self) -> ClientResult<()> {
        if self.state().is_active() {
            return Err(self.invalid_transition("start"));
        }
        self.reset_cancel();
        self.set_state(ReplicaState::Registering);

        let response = match self.client.oplog().register_replica(&self.config.replica_id).await {
            Ok(response) => response,
            Err(e) => {
                self.handle_error(&e);
                return Err(e);
            }
        };
        if !response.success {
            let e = ClientError::Rejected(response.message);
            self.handle_error(&e);
            return Err(e);
        }

        self.registered.store(true, Ordering::SeqCst);
        self.set_state(ReplicaState::Idle);
        info!(
            replica_id = %self.config.replica_id,
            collection = %self.config.collection,
            "replica started"
        );
        Ok(())
    }

    /// Pulls and applies everything after the applied LSN.
    pub async fn sync_once(&self) -> ClientResult<ReplicaCycleResult> {
        if !self.is_registered() || !self.state().can_start_sync() {
            return Err(self.invalid_transition("sync"));
        }

        let start = Instant::now();
        match self.run_cycle().await {
            Ok(mut result) => {
                result.duration = start.elapsed();
                self.set_state(ReplicaState::Synced);
                let mut stats = self.stats.write();
                stats.cycles_completed += 1;
                stats.entries_applied += result.applied;
                stats.batches_applied += result.batches;
                stats.applied_lsn = result.applied_lsn;
                stats.last_sync_time = Some(Instant::now());
                stats.last_error = None;
                Ok(result)
            }
            Err(e) => {
                self.handle_error(&e);
                Err(e)
            }
        }
    }

    /// Runs `sync_once`, retrying retryable failures with backoff.
    pub async fn sync_with_retry(&self) -> ClientResult<ReplicaCycleResult> {
        let retry = &self.config.retry;
        let attempts = retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            if attempt > 0 {
                self.set_state(ReplicaState::RetryWait);
                let delay = retry.delay_before(attempt, &self.config.replica_id);
                debug!(attempt, ?delay, "retrying replica sync");
                tokio::time::sleep(delay).await;
                self.stats.write().retries += 1;
            }

            self.check_cancelled()?;

            match self.sync_once().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt + 1 < attempts => {
                    warn!(attempt, error = %e, "replica sync failed");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Unregisters the replica.
    pub async fn stop(&self) -> ClientResult<()> {
        if self.state().is_active() {
            return Err(self.invalid_transition("stop"));
        }

        let response = match self.client.oplog().unregister_replica(&self.config.replica_id).await
        {
            Ok(response) => response,
            Err(e) => {
                self.handle_error(&e);
                return Err(e);
            }
        };
        if !response.success {
            let e = ClientError::Rejected(response.message);
            self.handle_error(&e);
            return Err(e);
        }

        self.registered.store(false, Ordering::SeqCst);
        self.set_state(ReplicaState::Unregistered);
        info!(replica_id = %self.config.replica_id, "replica stopped");
        Ok(())
    }

    async fn run_cycle(&self) -> ClientResult<ReplicaCycleResult> {
        let oplog = self.client.oplog();
        let batch_size = self.config.batch_size;
        let mut result = ReplicaCycleResult {
            applied_lsn: self.applier.applied_lsn()?,
            ..Default::default()
        };

        loop {
            self.check_cancelled()?;

            self.set_state(ReplicaState::Pulling);
            let batch = oplog
                .get_oplog_entries(&self.config.collection, result.applied_lsn, Some(batch_size))
                .await?;
            let Some(high_water) = batch.high_water_lsn() else {
                break;
            };

            self.set_state(ReplicaState::Applying);
            self.applier.apply(&batch.entries).map_err(apply_failed)?;
            self.applier.set_applied_lsn(high_water).map_err(apply_failed)?;
            result.applied += batch.entries.len() as u64;
            result.batches += 1;
            result.applied_lsn = high_water;
            debug!(
                replica_id = %self.config.replica_id,
                count = batch.entries.len(),
                lsn = high_water,
                "applied oplog batch"
            );

            self.heartbeat(high_water).await?;

            if batch_size > 0 && (batch.entries.len() as u64) < u64::from(batch_size) {
                break;
            }
        }

        if result.batches == 0 {
            // keep-alive
            self.heartbeat(result.applied_lsn).await?;
        }
        Ok(result)
    }

    async fn heartbeat(&self, lsn: Lsn) -> ClientResult<()> {
        self.set_state(ReplicaState::Heartbeating);
        let response = self
            .client
            .oplog()
            .update_replica_lsn(&self.config.collection, &self.config.replica_id, lsn)
            .await?;
        if !response.success {
            return Err(ClientError::Rejected(response.message));
        }
        self.stats.write().heartbeats_sent += 1;
        Ok(())
    }

    fn handle_error(&self, error: &ClientError) {
        self.set_state(ReplicaState::Error);
        self.stats.write().last_error = Some(error.to_string());
        warn!(replica_id = %self.config.replica_id, error = %error, "replica error");
    }
}

fn apply_failed(error: ClientError) -> ClientError {
    match error {
        ClientError::Apply(_) => error,
        other => ClientError::Apply(other.to_string()),
    }
}

/// An in-memory applier, keyed by `(collection, doc_id)`.
#[derive(Debug, Default)]
pub struct MemoryOplogApplier {
    documents: RwLock<HashMap<(String, String), JsonMap>>,
    applied_entries: RwLock<Vec<OplogEntry>>,
    applied_lsn: AtomicU64,
}

impl MemoryOplogApplier {
    /// Creates an empty applier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an applier that resumes after `lsn`.
    pub fn resume_from(lsn: Lsn) -> Self {
        let applier = Self::default();
        applier.applied_lsn.store(lsn, Ordering::SeqCst);
        applier
    }

    /// Gets a document's fields.
    pub fn document(&self, collection: &str, doc_id: &str) -> Option<JsonMap> {
        self.documents
            .read()
            .get(&(collection.to_string(), doc_id.to_string()))
            .cloned()
    }

    /// Number of documents held.
    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    /// Returns true if no documents are held.
    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }

    /// Entries passed to `apply` since the last
    /// [`take_applied_entries`](Self::take_applied_entries), including
    /// re-deliveries.
    pub fn applied_entries(&self) -> Vec<OplogEntry> {
        self.applied_entries.read().clone()
    }

    /// Drains the entries applied so far. Long-running followers call this
    /// each cycle so the log does not grow without bound.
    pub fn take_applied_entries(&self) -> Vec<OplogEntry> {
        std::mem::take(&mut *self.applied_entries.write())
    }

    fn apply_one(
        documents: &mut HashMap<(String, String), JsonMap>,
        entry: &OplogEntry,
    ) -> ClientResult<()> {
        match entry.change()? {
            Change::Upsert { doc_id, fields, .. } => {
                documents.insert(
                    (entry.collection.clone(), doc_id.to_string()),
                    fields.cloned().unwrap_or_default(),
                );
            }
            Change::Delete { doc_id } => {
                documents.remove(&(entry.collection.clone(), doc_id.to_string()));
            }
            Change::DropCollection { collection } => {
                documents.retain(|(c, _), _| c != collection);
            }
            Change::Rename { from, to } => {
                let moved: Vec<_> = documents
                    .keys()
                    .filter(|(c, _)| c == from)
                    .cloned()
                    .collect();
                for key in moved {
                    if let Some(doc) = documents.remove(&key) {
                        documents.insert((to.to_string(), key.1), doc);
                    }
                }
            }
            Change::Unknown => {
                warn!(lsn = entry.lsn, "skipping oplog entry with unknown op type");
            }
        }
        Ok(())
    }
}

impl OplogApplier for MemoryOplogApplier {
    fn apply(&self, entries: &[OplogEntry]) -> ClientResult<()> {
        let mut documents = self.documents.write();
        for entry in entries {
            Self::apply_one(&mut documents, entry)?;
        }
        self.applied_entries.write().extend(entries.iter().cloned());
        Ok(())
    }

    fn applied_lsn(&self) -> ClientResult<Lsn> {
        Ok(self.applied_lsn.load(Ordering::SeqCst))
    }

    fn set_applied_lsn(&self, lsn: Lsn) -> ClientResult<()> {
        self.applied_lsn.store(lsn, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shilp_protocol::OpType;

    fn insert(lsn: Lsn, doc_id: &str, title: &str) -> OplogEntry {
        let mut entry = OplogEntry::new(lsn, "docs", doc_id, OpType::Insert);
        entry.fields = json!({ "title": title }).as_object().cloned();
        entry
    }

    #[test]
    fn replica_state_checks() {
        assert!(ReplicaState::Idle.can_start_sync());
        assert!(ReplicaState::Synced.can_start_sync());
        assert!(ReplicaState::Error.can_start_sync());
        assert!(!ReplicaState::Pulling.can_start_sync());
        assert!(!ReplicaState::Unregistered.can_start_sync());

        assert!(ReplicaState::Applying.is_active());
        assert!(!ReplicaState::Synced.is_active());
    }

    #[test]
    fn memory_applier_is_idempotent() {
        let applier = MemoryOplogApplier::new();
        let batch = vec![insert(1, "a", "first"), insert(2, "b", "second")];

        applier.apply(&batch).unwrap();
        applier.apply(&batch).unwrap();

        assert_eq!(applier.len(), 2);
        assert_eq!(applier.document("docs", "a").unwrap()["title"], "first");
        assert_eq!(applier.applied_entries().len(), 4);
    }

    #[test]
    fn take_applied_entries_drains_the_log() {
        let applier = MemoryOplogApplier::new();
        applier.apply(&[insert(1, "a", "first")]).unwrap();
        applier.apply(&[insert(2, "b", "second")]).unwrap();

        let taken: Vec<Lsn> = applier.take_applied_entries().iter().map(|e| e.lsn).collect();
        assert_eq!(taken, vec![1, 2]);
        assert!(applier.applied_entries().is_empty());
        assert_eq!(applier.len(), 2);

        applier.apply(&[insert(3, "c", "third")]).unwrap();
        assert_eq!(applier.take_applied_entries().len(), 1);
        assert!(applier.take_applied_entries().is_empty());
    }

    #[test]
    fn memory_applier_delete_drop_rename() {
        let applier = MemoryOplogApplier::new();
        applier
            .apply(&[insert(1, "a", "x"), insert(2, "b", "y"), insert(3, "c", "z")])
            .unwrap();

        applier
            .apply(&[OplogEntry::new(4, "docs", "a", OpType::Delete)])
            .unwrap();
        assert!(applier.document("docs", "a").is_none());

        let mut rename = OplogEntry::new(5, "docs", "", OpType::RenameCollection);
        rename.new_name = Some("articles".into());
        applier.apply(&[rename]).unwrap();
        assert!(applier.document("docs", "b").is_none());
        assert_eq!(applier.document("articles", "b").unwrap()["title"], "y");

        applier
            .apply(&[OplogEntry::new(6, "articles", "", OpType::DropCollection)])
            .unwrap();
        assert!(applier.is_empty());
    }

    #[test]
    fn memory_applier_rejects_malformed_entries() {
        let applier = MemoryOplogApplier::new();
        let err = applier
            .apply(&[OplogEntry::new(1, "docs", "", OpType::Delete)])
            .unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
    }

    #[test]
    fn applier_failures_become_apply_errors() {
        let err = apply_failed(ClientError::Validation("missing doc_id".into()));
        assert!(matches!(err, ClientError::Apply(ref m) if m.contains("missing doc_id")));
        assert!(!err.is_retryable());

        let err = apply_failed(ClientError::Apply("disk full".into()));
        assert_eq!(err.to_string(), "apply failed: disk full");
    }

    #[test]
    fn memory_applier_lsn() {
        let applier = MemoryOplogApplier::resume_from(42);
        assert_eq!(applier.applied_lsn().unwrap(), 42);
        applier.set_applied_lsn(50).unwrap();
        assert_eq!(applier.applied_lsn().unwrap(), 50);
    }

    #[tokio::test]
    async fn sync_before_start_is_invalid() {
        let client = ShilpClient::new("http://127.0.0.1:9").unwrap();
        let replica = ReplicaSync::new(
            client,
            ReplicaConfig::new("replica-a", "docs"),
            MemoryOplogApplier::new(),
        );

        let err = replica.sync_once().await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidState { .. }));
        assert_eq!(replica.state(), ReplicaState::Idle);
    }
}
