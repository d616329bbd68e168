//! Integration tests for the replica follower against the fake server.

use shilp_client::{
    ClientConfig, ClientError, MemoryOplogApplier, OplogApplier, ReplicaConfig, ReplicaState,
    ReplicaSync, RetryConfig, ShilpClient, UnregisterRoute,
};
use shilp_protocol::{Lsn, OpType};
use shilp_testkit::{hello_world_record, FakeShilp};
use std::time::Duration;

fn client(server: &FakeShilp) -> ShilpClient {
    ShilpClient::with_config(
        ClientConfig::new(server.uri()).with_unregister_route(UnregisterRoute::Dedicated),
    )
    .unwrap()
}

fn fast_retry(attempts: u32) -> RetryConfig {
    RetryConfig::new(attempts)
        .with_initial_delay(Duration::from_millis(5))
        .without_jitter()
}

fn follower(server: &FakeShilp, batch_size: u32) -> ReplicaSync<MemoryOplogApplier> {
    let config = ReplicaConfig::new("replica-1", "docs")
        .with_batch_size(batch_size)
        .with_retry(fast_retry(3));
    ReplicaSync::new(client(server), config, MemoryOplogApplier::new())
}

fn heartbeat_lsns(server: &FakeShilp) -> Vec<Lsn> {
    server.heartbeats().iter().map(|h| h.lsn).collect()
}

#[tokio::test]
async fn full_cycle_applies_everything_in_batches() {
    let server = FakeShilp::start().await;
    server.seed_records("docs", 5);
    let replica = follower(&server, 2);

    replica.start().await.unwrap();
    assert!(replica.is_registered());
    assert_eq!(server.registered_replicas(), vec!["replica-1".to_string()]);

    let result = replica.sync_once().await.unwrap();
    assert_eq!(result.applied, 5);
    assert_eq!(result.batches, 3);
    assert_eq!(result.applied_lsn, 5);
    assert_eq!(replica.state(), ReplicaState::Synced);

    // One heartbeat per applied batch, never ahead of what was applied.
    assert_eq!(heartbeat_lsns(&server), vec![2, 4, 5]);
    assert_eq!(server.watermark("docs", "replica-1"), Some(5));

    let applier = replica.applier();
    assert_eq!(applier.len(), 5);
    assert_eq!(applier.applied_lsn().unwrap(), 5);
    assert_eq!(applier.document("docs", "doc-3").unwrap()["title"], "Document 3");
}

#[tokio::test]
async fn later_cycles_pick_up_only_new_entries() {
    let server = FakeShilp::start().await;
    server.seed_records("docs", 3);
    let replica = follower(&server, 10);
    replica.start().await.unwrap();
    replica.sync_once().await.unwrap();

    let writer = client(&server);
    writer
        .collections()
        .insert_record(&hello_world_record("docs"))
        .await
        .unwrap();
    writer.collections().delete_record("docs", "doc-1").await.unwrap();

    let result = replica.sync_once().await.unwrap();
    assert_eq!(result.applied, 2);
    assert_eq!(result.applied_lsn, server.last_lsn());

    let applier = replica.applier();
    assert!(applier.document("docs", "doc-1").is_none());
    assert_eq!(applier.document("docs", "record-1").unwrap()["title"], "Hello World");

    let stats = replica.stats();
    assert_eq!(stats.cycles_completed, 2);
    assert_eq!(stats.entries_applied, 5);
}

#[tokio::test]
async fn idle_cycle_sends_keep_alive() {
    let server = FakeShilp::start().await;
    server.seed_records("docs", 2);
    let replica = follower(&server, 10);
    replica.start().await.unwrap();
    replica.sync_once().await.unwrap();

    let result = replica.sync_once().await.unwrap();
    assert_eq!(result.applied, 0);
    assert_eq!(result.batches, 0);
    assert_eq!(heartbeat_lsns(&server), vec![2, 2]);
}

#[tokio::test]
async fn resumes_after_persisted_lsn() {
    let server = FakeShilp::start().await;
    server.seed_records("docs", 5);
    let config = ReplicaConfig::new("replica-1", "docs");
    let replica = ReplicaSync::new(client(&server), config, MemoryOplogApplier::resume_from(3));
    replica.start().await.unwrap();

    let result = replica.sync_once().await.unwrap();
    assert_eq!(result.applied, 2);
    let applied: Vec<Lsn> = replica.applier().applied_entries().iter().map(|e| e.lsn).collect();
    assert_eq!(applied, vec![4, 5]);
}

#[tokio::test]
async fn sync_before_start_is_invalid() {
    let server = FakeShilp::start().await;
    let replica = follower(&server, 10);

    let err = replica.sync_once().await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidState { .. }));
    assert!(server.requests().is_empty());
}

#[tokio::test]
async fn transient_failure_is_retried() {
    let server = FakeShilp::start().await;
    server.seed_records("docs", 3);
    let replica = follower(&server, 10);
    replica.start().await.unwrap();

    server.fail_next(503, "service unavailable");
    let result = replica.sync_with_retry().await.unwrap();

    assert_eq!(result.applied, 3);
    assert_eq!(replica.stats().retries, 1);
    assert_eq!(replica.state(), ReplicaState::Synced);
}

#[tokio::test]
async fn client_error_is_not_retried() {
    let server = FakeShilp::start().await;
    server.seed_records("docs", 3);
    let replica = follower(&server, 10);
    replica.start().await.unwrap();

    server.fail_next(400, "bad request");
    let err = replica.sync_with_retry().await.unwrap_err();

    assert_eq!(err.status(), Some(400));
    assert_eq!(replica.stats().retries, 0);
    assert_eq!(replica.state(), ReplicaState::Error);
    assert!(replica.stats().last_error.is_some());

    // The next cycle recovers from the error state.
    assert_eq!(replica.sync_once().await.unwrap().applied, 3);
}

#[tokio::test]
async fn retries_give_up_after_max_attempts() {
    let server = FakeShilp::start().await;
    let replica = follower(&server, 10);
    replica.start().await.unwrap();

    for _ in 0..3 {
        server.fail_next(503, "service unavailable");
    }
    let err = replica.sync_with_retry().await.unwrap_err();

    assert_eq!(err.status(), Some(503));
    assert_eq!(replica.stats().retries, 2);
}

#[tokio::test]
async fn zero_attempts_still_syncs_once() {
    let server = FakeShilp::start().await;
    server.seed_records("docs", 2);
    let retry = RetryConfig {
        max_attempts: 0,
        ..RetryConfig::no_retry()
    };
    let config = ReplicaConfig::new("replica-1", "docs").with_retry(retry);
    let replica = ReplicaSync::new(client(&server), config, MemoryOplogApplier::new());
    replica.start().await.unwrap();

    assert_eq!(replica.sync_with_retry().await.unwrap().applied, 2);
    assert_eq!(replica.stats().retries, 0);
}

#[tokio::test]
async fn cancel_stops_until_reset() {
    let server = FakeShilp::start().await;
    server.seed_records("docs", 2);
    let replica = follower(&server, 10);
    replica.start().await.unwrap();

    replica.cancel();
    assert!(matches!(replica.sync_once().await, Err(ClientError::Cancelled)));
    assert!(matches!(replica.sync_with_retry().await, Err(ClientError::Cancelled)));
    assert!(replica.applier().is_empty());

    replica.reset_cancel();
    assert_eq!(replica.sync_once().await.unwrap().applied, 2);
}

#[tokio::test]
async fn stop_unregisters() {
    let server = FakeShilp::start().await;
    server.seed_records("docs", 1);
    let replica = follower(&server, 10);
    replica.start().await.unwrap();
    replica.sync_once().await.unwrap();

    replica.stop().await.unwrap();

    assert!(!replica.is_registered());
    assert_eq!(replica.state(), ReplicaState::Unregistered);
    assert!(server.registered_replicas().is_empty());
    assert!(matches!(
        replica.sync_once().await,
        Err(ClientError::InvalidState { .. })
    ));
}

#[tokio::test]
async fn restart_after_stop_resumes() {
    let server = FakeShilp::start().await;
    server.seed_records("docs", 2);
    let replica = follower(&server, 10);
    replica.start().await.unwrap();
    replica.sync_once().await.unwrap();
    replica.stop().await.unwrap();

    server.seed_records("docs", 3);
    replica.start().await.unwrap();
    let result = replica.sync_once().await.unwrap();

    // Re-seeding doc-1 and doc-2 logs updates; doc-3 is new.
    assert_eq!(result.applied, 3);
    assert_eq!(replica.applier().len(), 3);
}

#[tokio::test]
async fn dropped_collection_clears_documents() {
    let server = FakeShilp::start().await;
    server.seed_records("docs", 3);
    let replica = follower(&server, 10);
    replica.start().await.unwrap();
    replica.sync_once().await.unwrap();
    assert_eq!(replica.applier().len(), 3);

    client(&server).collections().drop("docs").await.unwrap();
    replica.sync_once().await.unwrap();

    assert!(replica.applier().is_empty());
}

#[tokio::test]
async fn malformed_entry_stops_before_persisting() {
    let server = FakeShilp::start().await;
    server.seed_records("docs", 2);
    server.append_entry("docs", "", OpType::Delete);
    let replica = follower(&server, 10);
    replica.start().await.unwrap();

    let err = replica.sync_with_retry().await.unwrap_err();

    assert!(matches!(err, ClientError::Apply(_)));
    assert_eq!(replica.stats().retries, 0);
    assert_eq!(replica.applier().applied_lsn().unwrap(), 0);
    assert!(server.heartbeats().is_empty());
}
