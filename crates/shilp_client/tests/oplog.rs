//! Integration tests for the oplog API and the heartbeat watermark guard.

use proptest::prelude::*;
use shilp_client::{ClientConfig, ClientError, ShilpClient, UnregisterRoute};
use shilp_protocol::{Lsn, OpType};
use shilp_testkit::{insert_entry, oplog_batch, FakeShilp};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn seeded(records: usize) -> (FakeShilp, ShilpClient) {
    let server = FakeShilp::start().await;
    server.seed_records("docs", records);
    let client = ShilpClient::new(server.uri()).unwrap();
    (server, client)
}

/// Pages through the oplog after `cursor` and returns every LSN seen.
async fn drain(client: &ShilpClient, collection: &str, mut cursor: Lsn, limit: u32) -> Vec<Lsn> {
    let mut seen = Vec::new();
    loop {
        let batch = client
            .oplog()
            .get_oplog_entries(collection, cursor, Some(limit))
            .await
            .unwrap();
        let Some(high) = batch.high_water_lsn() else {
            break;
        };
        seen.extend(batch.entries.iter().map(|e| e.lsn));
        cursor = high;
    }
    seen
}

// ============================================================================
// Fetching
// ============================================================================

#[tokio::test]
async fn fetch_returns_entries_after_cursor_in_order() {
    let (server, client) = seeded(5).await;

    let batch = client.oplog().get_oplog_entries("docs", 2, None).await.unwrap();
    let lsns: Vec<Lsn> = batch.entries.iter().map(|e| e.lsn).collect();

    assert_eq!(lsns, vec![3, 4, 5]);
    assert_eq!(batch.last_lsn, server.last_lsn());
    assert!(batch.entries.iter().all(|e| e.op_type == OpType::Insert));
    assert_eq!(batch.entries[0].doc_id, "doc-3");
}

#[tokio::test]
async fn fetch_respects_limit_and_pages_to_the_end() {
    let (_server, client) = seeded(7).await;

    let first = client.oplog().get_oplog_entries("docs", 0, Some(3)).await.unwrap();
    assert_eq!(first.entries.len(), 3);
    assert!(first.has_more());

    assert_eq!(drain(&client, "docs", 0, 3).await, (1..=7).collect::<Vec<_>>());
}

#[tokio::test]
async fn fetch_at_head_is_empty() {
    let (server, client) = seeded(2).await;

    let batch = client
        .oplog()
        .get_oplog_entries("docs", server.last_lsn(), None)
        .await
        .unwrap();
    assert!(batch.entries.is_empty());
    assert_eq!(batch.high_water_lsn(), None);
}

#[tokio::test]
async fn empty_collection_reads_every_collection() {
    let (server, client) = seeded(2).await;
    server.seed_records("other", 2);

    let all = client.oplog().get_oplog_entries("", 0, None).await.unwrap();
    assert_eq!(all.entries.len(), 4);

    let only_other = client.oplog().get_oplog_entries("other", 0, None).await.unwrap();
    assert!(only_other.entries.iter().all(|e| e.collection == "other"));
    assert_eq!(only_other.entries.len(), 2);
}

#[tokio::test]
async fn out_of_order_batch_is_protocol_error() {
    let server = MockServer::start().await;
    let mut batch = oplog_batch("docs", &[4, 5, 6]);
    batch.entries.swap(1, 2);
    Mock::given(method("GET"))
        .and(path("/api/oplog/v1/"))
        .and(query_param("after_lsn", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&batch))
        .mount(&server)
        .await;

    let client = ShilpClient::new(server.uri()).unwrap();
    let err = client.oplog().get_oplog_entries("docs", 3, None).await.unwrap_err();
    assert!(matches!(err, ClientError::Protocol(_)));
}

#[tokio::test]
async fn batch_at_or_before_cursor_is_protocol_error() {
    let server = MockServer::start().await;
    let mut batch = oplog_batch("docs", &[]);
    batch.entries = vec![insert_entry(3, "docs", "doc-3", "stale")];
    batch.last_lsn = 3;
    batch.count = 1;
    Mock::given(method("GET"))
        .and(path("/api/oplog/v1/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&batch))
        .mount(&server)
        .await;

    let client = ShilpClient::new(server.uri()).unwrap();
    let err = client.oplog().get_oplog_entries("docs", 3, None).await.unwrap_err();
    assert!(matches!(err, ClientError::Protocol(_)));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn paging_yields_every_later_lsn_once(records in 0usize..25, cursor in 0u64..30, limit in 1u32..8) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let seen = rt.block_on(async {
            let (_server, client) = seeded(records).await;
            drain(&client, "docs", cursor, limit).await
        });
        let expected: Vec<Lsn> = (cursor + 1..=records as Lsn).collect();
        prop_assert_eq!(seen, expected);
    }
}

// ============================================================================
// Registration
// ============================================================================

#[tokio::test]
async fn register_is_idempotent() {
    let (server, client) = seeded(0).await;

    assert!(client.oplog().register_replica("replica-a").await.unwrap().success);
    assert!(client.oplog().register_replica("replica-a").await.unwrap().success);

    assert_eq!(server.registered_replicas(), vec!["replica-a".to_string()]);
}

#[tokio::test]
async fn empty_replica_id_is_rejected_locally() {
    let (server, client) = seeded(0).await;

    let err = client.oplog().register_replica("").await.unwrap_err();
    assert!(err.is_validation());
    let err = client.oplog().update_replica_lsn("docs", "", 1).await.unwrap_err();
    assert!(err.is_validation());

    assert!(server.requests().is_empty());
}

#[tokio::test]
async fn default_unregister_route_leaves_replica_registered() {
    let (server, client) = seeded(0).await;
    client.oplog().register_replica("replica-a").await.unwrap();

    let resp = client.oplog().unregister_replica("replica-a").await.unwrap();
    assert!(resp.success);

    // The shared path re-registers on the server side.
    assert_eq!(server.registered_replicas(), vec!["replica-a".to_string()]);
    assert_eq!(
        server.requests().last().map(String::as_str),
        Some("POST /api/oplog/v1/register")
    );
}

#[tokio::test]
async fn dedicated_unregister_route_removes_replica() {
    let server = FakeShilp::start().await;
    let client = ShilpClient::with_config(
        ClientConfig::new(server.uri()).with_unregister_route(UnregisterRoute::Dedicated),
    )
    .unwrap();
    client.oplog().register_replica("replica-a").await.unwrap();

    client.oplog().unregister_replica("replica-a").await.unwrap();
    client.oplog().unregister_replica("replica-a").await.unwrap();

    assert!(server.registered_replicas().is_empty());
    assert_eq!(
        server.requests().last().map(String::as_str),
        Some("POST /api/oplog/v1/unregister")
    );
}

// ============================================================================
// Heartbeats
// ============================================================================

#[tokio::test]
async fn heartbeat_advances_watermark() {
    let (server, client) = seeded(3).await;
    client.oplog().register_replica("replica-a").await.unwrap();

    let resp = client.oplog().update_replica_lsn("docs", "replica-a", 3).await.unwrap();
    assert!(resp.success);
    assert_eq!(server.watermark("docs", "replica-a"), Some(3));
    assert_eq!(client.oplog().last_reported_lsn("docs", "replica-a"), Some(3));
}

#[tokio::test]
async fn lower_lsn_is_rejected_without_a_request() {
    let (server, client) = seeded(3).await;
    client.oplog().register_replica("replica-a").await.unwrap();
    client.oplog().update_replica_lsn("docs", "replica-a", 3).await.unwrap();
    let sent = server.requests().len();

    let err = client
        .oplog()
        .update_replica_lsn("docs", "replica-a", 2)
        .await
        .unwrap_err();

    match err {
        ClientError::LsnRegression { last, attempted, .. } => {
            assert_eq!(last, 3);
            assert_eq!(attempted, 2);
        }
        other => panic!("expected LsnRegression, got {other:?}"),
    }
    assert_eq!(server.requests().len(), sent);
    assert_eq!(server.watermark("docs", "replica-a"), Some(3));
}

#[tokio::test]
async fn repeating_the_same_lsn_is_a_keep_alive() {
    let (server, client) = seeded(3).await;
    client.oplog().register_replica("replica-a").await.unwrap();

    client.oplog().update_replica_lsn("docs", "replica-a", 3).await.unwrap();
    client.oplog().update_replica_lsn("docs", "replica-a", 3).await.unwrap();

    assert_eq!(server.heartbeats().len(), 2);
}

#[tokio::test]
async fn watermarks_are_per_collection() {
    let (server, client) = seeded(3).await;
    client.oplog().register_replica("replica-a").await.unwrap();

    client.oplog().update_replica_lsn("docs", "replica-a", 3).await.unwrap();
    client.oplog().update_replica_lsn("other", "replica-a", 1).await.unwrap();

    assert_eq!(server.watermark("other", "replica-a"), Some(1));
}

#[tokio::test]
async fn rejected_heartbeat_does_not_move_watermark() {
    let (server, client) = seeded(3).await;

    // Not registered, so the server answers success: false.
    let resp = client.oplog().update_replica_lsn("docs", "replica-a", 3).await.unwrap();
    assert!(!resp.success);
    assert_eq!(client.oplog().last_reported_lsn("docs", "replica-a"), None);

    // A lower LSN is still allowed because nothing was accepted.
    client.oplog().register_replica("replica-a").await.unwrap();
    assert!(client.oplog().update_replica_lsn("docs", "replica-a", 1).await.unwrap().success);
    assert_eq!(server.watermark("docs", "replica-a"), Some(1));
}

#[tokio::test]
async fn concurrent_heartbeats_arrive_in_issue_order() {
    let (server, client) = seeded(10).await;
    client.oplog().register_replica("replica-a").await.unwrap();

    let oplog = client.oplog();
    let (a, b, c) = tokio::join!(
        oplog.update_replica_lsn("docs", "replica-a", 4),
        oplog.update_replica_lsn("docs", "replica-a", 7),
        oplog.update_replica_lsn("docs", "replica-a", 9),
    );
    assert!(a.unwrap().success && b.unwrap().success && c.unwrap().success);

    let lsns: Vec<Lsn> = server.heartbeats().iter().map(|h| h.lsn).collect();
    assert_eq!(lsns, vec![4, 7, 9]);
}

#[tokio::test]
async fn concurrent_regression_is_caught() {
    let (server, client) = seeded(10).await;
    client.oplog().register_replica("replica-a").await.unwrap();

    let oplog = client.oplog();
    let (high, low) = tokio::join!(
        oplog.update_replica_lsn("docs", "replica-a", 8),
        oplog.update_replica_lsn("docs", "replica-a", 5),
    );

    assert!(high.unwrap().success);
    assert!(matches!(low, Err(ClientError::LsnRegression { .. })));
    assert_eq!(server.watermark("docs", "replica-a"), Some(8));
}

#[tokio::test]
async fn unregister_forgets_watermark() {
    let server = FakeShilp::start().await;
    let client = ShilpClient::with_config(
        ClientConfig::new(server.uri()).with_unregister_route(UnregisterRoute::Dedicated),
    )
    .unwrap();
    client.oplog().register_replica("replica-a").await.unwrap();
    client.oplog().update_replica_lsn("docs", "replica-a", 5).await.unwrap();

    client.oplog().unregister_replica("replica-a").await.unwrap();
    assert_eq!(client.oplog().last_reported_lsn("docs", "replica-a"), None);

    client.oplog().register_replica("replica-a").await.unwrap();
    assert!(client.oplog().update_replica_lsn("docs", "replica-a", 1).await.unwrap().success);
}

#[tokio::test]
async fn shared_route_unregister_keeps_watermark() {
    let (server, client) = seeded(10).await;
    client.oplog().register_replica("replica-a").await.unwrap();
    client.oplog().update_replica_lsn("docs", "replica-a", 10).await.unwrap();

    client.oplog().unregister_replica("replica-a").await.unwrap();
    assert_eq!(server.registered_replicas(), vec!["replica-a".to_string()]);
    assert_eq!(client.oplog().last_reported_lsn("docs", "replica-a"), Some(10));

    let sent = server.requests().len();
    let err = client
        .oplog()
        .update_replica_lsn("docs", "replica-a", 3)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ClientError::LsnRegression {
            last: 10,
            attempted: 3,
            ..
        }
    ));
    assert_eq!(server.requests().len(), sent);
    let lsns: Vec<Lsn> = server.heartbeats().iter().map(|h| h.lsn).collect();
    assert_eq!(lsns, vec![10]);
}

#[tokio::test]
async fn rejected_unregister_keeps_watermark() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/oplog/v1/register"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"success": true})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/oplog/v1/heartbeat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"success": true})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/oplog/v1/unregister"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"success": false, "message": "busy"})),
        )
        .mount(&server)
        .await;
    let client = ShilpClient::with_config(
        ClientConfig::new(server.uri()).with_unregister_route(UnregisterRoute::Dedicated),
    )
    .unwrap();
    client.oplog().register_replica("replica-a").await.unwrap();
    client.oplog().update_replica_lsn("docs", "replica-a", 10).await.unwrap();

    let resp = client.oplog().unregister_replica("replica-a").await.unwrap();
    assert!(!resp.success);
    assert_eq!(client.oplog().last_reported_lsn("docs", "replica-a"), Some(10));
    assert!(matches!(
        client.oplog().update_replica_lsn("docs", "replica-a", 3).await,
        Err(ClientError::LsnRegression { last: 10, .. })
    ));
}

// ============================================================================
// Status
// ============================================================================

#[tokio::test]
async fn status_reports_head_and_replicas() {
    let (server, client) = seeded(4).await;
    client.oplog().register_replica("replica-a").await.unwrap();

    let status = client.oplog().get_oplog_status("docs").await.unwrap();
    assert!(status.success);
    assert_eq!(status.last_lsn, server.last_lsn());
    assert_eq!(status.retention_lsn, 1);
    assert_eq!(status.replica_count, 1);
}

#[tokio::test]
async fn status_requires_collection() {
    let (server, client) = seeded(0).await;
    let err = client.oplog().get_oplog_status("").await.unwrap_err();
    assert!(err.is_validation());
    assert!(server.requests().is_empty());
}
