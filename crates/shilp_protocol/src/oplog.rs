//! Oplog models for replica synchronization.
//!
//! A replica pulls entries with `lsn > after_lsn`, applies them strictly in
//! the order returned, then reports its new watermark via heartbeat.
//! Delivery is at-least-once: after a crash the replica re-fetches from its
//! last persisted LSN, so appliers must be idempotent per `doc_id`.

use crate::collection::AttrType;
use crate::error::{ProtocolError, ProtocolResult};
use crate::JsonMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Log sequence number.
pub type Lsn = u64;

/// Kind of change recorded by an oplog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpType {
    /// A record was inserted.
    Insert,
    /// A record was replaced.
    Update,
    /// A record was deleted.
    Delete,
    /// The collection was dropped.
    DropCollection,
    /// The collection was renamed.
    RenameCollection,
    /// An op type this client does not know.
    #[serde(other)]
    Unknown,
}

impl OpType {
    /// Returns the wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            OpType::Insert => "insert",
            OpType::Update => "update",
            OpType::Delete => "delete",
            OpType::DropCollection => "drop_collection",
            OpType::RenameCollection => "rename_collection",
            OpType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A full record carried by insert/update entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Record ID.
    pub id: String,
    /// Record fields.
    #[serde(default)]
    pub fields: JsonMap,
    /// Fields stored as keywords.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword_fields: Option<HashMap<String, bool>>,
    /// Metadata field types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_fields: Option<HashMap<String, AttrType>>,
    /// Embeddings per field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vectors: Option<HashMap<String, Vec<f32>>>,
    /// Search distance, when returned from a query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dist: Option<f64>,
    /// Index node IDs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Vec<String>>,
    /// Expiry as a unix timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<i64>,
}

/// One durable change record.
///
/// The payload fields that are present depend on `op_type`; use
/// [`OplogEntry::change`] for a typed view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OplogEntry {
    /// Position in the log.
    pub lsn: Lsn,
    /// Server timestamp (RFC 3339).
    #[serde(default)]
    pub timestamp: String,
    /// Affected collection.
    pub collection: String,
    /// Affected record, empty for collection-level ops.
    #[serde(default)]
    pub doc_id: String,
    /// Kind of change.
    pub op_type: OpType,
    /// Single embedding (legacy single-field payload).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
    /// Record metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonMap>,
    /// Keyword values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
    /// Full record for insert/update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_doc: Option<Record>,
    /// Embeddings per field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vectors: Option<HashMap<String, Vec<f32>>>,
    /// Record fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<JsonMap>,
    /// Fields stored as keywords.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword_fields: Option<HashMap<String, bool>>,
    /// Metadata field types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_fields: Option<HashMap<String, AttrType>>,
    /// Expiry as a unix timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<i64>,
    /// New collection name for renames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_name: Option<String>,
}

/// Typed view of an entry's payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Change<'a> {
    /// Insert or update of one record.
    Upsert {
        /// Record ID.
        doc_id: &'a str,
        /// Record fields (from `fields`, falling back to `full_doc`).
        fields: Option<&'a JsonMap>,
        /// Embeddings (from `vectors`, falling back to `full_doc`).
        vectors: Option<&'a HashMap<String, Vec<f32>>>,
        /// True for `update`, false for `insert`.
        is_update: bool,
    },
    /// Deletion of one record.
    Delete {
        /// Record ID.
        doc_id: &'a str,
    },
    /// The collection was dropped.
    DropCollection {
        /// Dropped collection.
        collection: &'a str,
    },
    /// The collection was renamed.
    Rename {
        /// Old name.
        from: &'a str,
        /// New name.
        to: &'a str,
    },
    /// Unrecognized op type; appliers decide whether to skip or stop.
    Unknown,
}

impl OplogEntry {
    /// Creates an entry with an empty payload.
    pub fn new(
        lsn: Lsn,
        collection: impl Into<String>,
        doc_id: impl Into<String>,
        op_type: OpType,
    ) -> Self {
        Self {
            lsn,
            timestamp: String::new(),
            collection: collection.into(),
            doc_id: doc_id.into(),
            op_type,
            vector: None,
            metadata: None,
            keywords: None,
            full_doc: None,
            vectors: None,
            fields: None,
            keyword_fields: None,
            metadata_fields: None,
            expiry: None,
            new_name: None,
        }
    }

    /// Returns the record fields, preferring the top-level payload.
    pub fn record_fields(&self) -> Option<&JsonMap> {
        self.fields
            .as_ref()
            .or_else(|| self.full_doc.as_ref().map(|doc| &doc.fields))
    }

    /// Returns the typed change carried by this entry.
    pub fn change(&self) -> ProtocolResult<Change<'_>> {
        let change = match self.op_type {
            OpType::Insert | OpType::Update => Change::Upsert {
                doc_id: self.doc_id()?,
                fields: self.record_fields(),
                vectors: self
                    .vectors
                    .as_ref()
                    .or_else(|| self.full_doc.as_ref().and_then(|doc| doc.vectors.as_ref())),
                is_update: self.op_type == OpType::Update,
            },
            OpType::Delete => Change::Delete {
                doc_id: self.doc_id()?,
            },
            OpType::DropCollection => Change::DropCollection {
                collection: &self.collection,
            },
            OpType::RenameCollection => Change::Rename {
                from: &self.collection,
                to: self.new_name.as_deref().ok_or_else(|| self.missing("new_name"))?,
            },
            OpType::Unknown => Change::Unknown,
        };
        Ok(change)
    }

    fn doc_id(&self) -> ProtocolResult<&str> {
        if self.doc_id.is_empty() {
            // Some servers only fill the full document.
            match self.full_doc.as_ref() {
                Some(doc) if !doc.id.is_empty() => Ok(&doc.id),
                _ => Err(self.missing("doc_id")),
            }
        } else {
            Ok(&self.doc_id)
        }
    }

    fn missing(&self, field: &'static str) -> ProtocolError {
        ProtocolError::MissingField {
            lsn: self.lsn,
            op_type: self.op_type.to_string(),
            field,
        }
    }
}

/// Response of `GET /api/oplog/v1/`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetOplogResponse {
    /// Success flag.
    #[serde(default)]
    pub success: bool,
    /// Status message.
    #[serde(default)]
    pub message: String,
    /// Entries in ascending LSN order.
    #[serde(default)]
    pub entries: Vec<OplogEntry>,
    /// Newest LSN on the server at read time.
    #[serde(default)]
    pub last_lsn: Lsn,
    /// Number of entries returned.
    #[serde(default)]
    pub count: u64,
}

impl GetOplogResponse {
    /// Checks the batch against the fetch contract: every entry is after
    /// `after_lsn` and LSNs are strictly ascending.
    pub fn verify_order(&self, after_lsn: Lsn) -> ProtocolResult<()> {
        let mut previous: Option<Lsn> = None;
        for entry in &self.entries {
            match previous {
                None if entry.lsn <= after_lsn => {
                    return Err(ProtocolError::EntryBeforeCursor {
                        after_lsn,
                        lsn: entry.lsn,
                    })
                }
                Some(prev) if entry.lsn <= prev => {
                    return Err(ProtocolError::OutOfOrder {
                        previous: prev,
                        lsn: entry.lsn,
                    })
                }
                _ => {}
            }
            previous = Some(entry.lsn);
        }
        Ok(())
    }

    /// Returns the LSN of the last entry, the new high-water mark once the
    /// batch has been applied.
    pub fn high_water_lsn(&self) -> Option<Lsn> {
        self.entries.last().map(|e| e.lsn)
    }

    /// Returns true if the server holds entries beyond this batch.
    pub fn has_more(&self) -> bool {
        self.high_water_lsn()
            .is_some_and(|lsn| lsn < self.last_lsn)
    }
}

/// Response of `GET /api/oplog/v1/status`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OplogStatusResponse {
    /// Success flag.
    #[serde(default)]
    pub success: bool,
    /// Status message.
    #[serde(default)]
    pub message: String,
    /// Newest LSN.
    #[serde(default)]
    pub last_lsn: Lsn,
    /// Oldest retained LSN.
    #[serde(default)]
    pub retention_lsn: Lsn,
    /// Registered replicas.
    #[serde(default)]
    pub replica_count: u64,
}

impl OplogStatusResponse {
    /// Returns true if a replica at `applied_lsn` can still catch up from
    /// the log, i.e. nothing it needs has been trimmed.
    pub fn can_resume_from(&self, applied_lsn: Lsn) -> bool {
        self.retention_lsn <= applied_lsn.saturating_add(1)
    }
}

/// Body of `POST /api/oplog/v1/heartbeat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateReplicaLsnRequest {
    /// Collection the watermark applies to.
    pub collection: String,
    /// Replica ID.
    pub replica_id: String,
    /// Last applied LSN.
    pub lsn: Lsn,
}

/// Response of `POST /api/oplog/v1/heartbeat`.
pub type UpdateReplicaLsnResponse = crate::response::GenericResponse;

/// Body of `POST /api/oplog/v1/register`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterReplicaRequest {
    /// Replica ID.
    pub replica_id: String,
}

/// Body of the unregister call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnregisterReplicaRequest {
    /// Replica ID.
    pub replica_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn batch(lsns: &[Lsn]) -> GetOplogResponse {
        GetOplogResponse {
            success: true,
            entries: lsns
                .iter()
                .map(|&lsn| OplogEntry::new(lsn, "docs", format!("doc-{lsn}"), OpType::Insert))
                .collect(),
            last_lsn: lsns.last().copied().unwrap_or(0),
            count: lsns.len() as u64,
            ..Default::default()
        }
    }

    #[test]
    fn decode_server_entries() {
        let resp: GetOplogResponse = serde_json::from_value(json!({
            "success": true,
            "message": "",
            "entries": [
                {
                    "lsn": 11,
                    "timestamp": "2026-10-01T12:00:00Z",
                    "collection": "docs",
                    "doc_id": "record-1",
                    "op_type": "insert",
                    "fields": {"title": "Hello World"},
                    "vectors": {"title": [0.1, 0.2]}
                },
                {"lsn": 12, "timestamp": "2026-10-01T12:00:01Z", "collection": "docs", "doc_id": "record-1", "op_type": "delete"},
                {"lsn": 14, "timestamp": "2026-10-01T12:00:02Z", "collection": "docs", "doc_id": "", "op_type": "rename_collection", "new_name": "articles"}
            ],
            "last_lsn": 14,
            "count": 3
        }))
        .unwrap();

        assert!(resp.verify_order(10).is_ok());
        assert_eq!(resp.high_water_lsn(), Some(14));
        assert!(!resp.has_more());

        match resp.entries[0].change().unwrap() {
            Change::Upsert {
                doc_id,
                fields,
                vectors,
                is_update,
            } => {
                assert_eq!(doc_id, "record-1");
                assert_eq!(fields.unwrap()["title"], json!("Hello World"));
                assert_eq!(vectors.unwrap()["title"].len(), 2);
                assert!(!is_update);
            }
            other => panic!("unexpected change {other:?}"),
        }
        assert_eq!(
            resp.entries[1].change().unwrap(),
            Change::Delete { doc_id: "record-1" }
        );
        assert_eq!(
            resp.entries[2].change().unwrap(),
            Change::Rename {
                from: "docs",
                to: "articles"
            }
        );
    }

    #[test]
    fn unknown_op_type_does_not_fail_batch() {
        let entry: OplogEntry = serde_json::from_value(json!({
            "lsn": 3, "collection": "docs", "doc_id": "a", "op_type": "compact"
        }))
        .unwrap();
        assert_eq!(entry.op_type, OpType::Unknown);
        assert_eq!(entry.change().unwrap(), Change::Unknown);
    }

    #[test]
    fn rename_without_new_name_is_rejected() {
        let entry = OplogEntry::new(9, "docs", "", OpType::RenameCollection);
        assert!(matches!(
            entry.change(),
            Err(ProtocolError::MissingField { field: "new_name", .. })
        ));
    }

    #[test]
    fn upsert_falls_back_to_full_doc() {
        let mut entry = OplogEntry::new(5, "docs", "", OpType::Update);
        let mut fields = JsonMap::new();
        fields.insert("title".into(), json!("v2"));
        entry.full_doc = Some(Record {
            id: "record-7".into(),
            fields,
            ..Default::default()
        });
        match entry.change().unwrap() {
            Change::Upsert {
                doc_id,
                fields,
                is_update,
                ..
            } => {
                assert_eq!(doc_id, "record-7");
                assert_eq!(fields.unwrap()["title"], json!("v2"));
                assert!(is_update);
            }
            other => panic!("unexpected change {other:?}"),
        }
    }

    #[test]
    fn verify_rejects_entry_at_cursor() {
        assert_eq!(
            batch(&[5, 6]).verify_order(5),
            Err(ProtocolError::EntryBeforeCursor {
                after_lsn: 5,
                lsn: 5
            })
        );
    }

    #[test]
    fn verify_rejects_duplicates() {
        assert_eq!(
            batch(&[6, 7, 7]).verify_order(5),
            Err(ProtocolError::OutOfOrder { previous: 7, lsn: 7 })
        );
    }

    #[test]
    fn gaps_are_allowed() {
        assert!(batch(&[6, 9, 40]).verify_order(0).is_ok());
        assert!(batch(&[]).verify_order(100).is_ok());
    }

    #[test]
    fn status_resume_check() {
        let status = OplogStatusResponse {
            last_lsn: 100,
            retention_lsn: 50,
            ..Default::default()
        };
        assert!(status.can_resume_from(49));
        assert!(status.can_resume_from(80));
        assert!(!status.can_resume_from(10));
    }

    proptest! {
        #[test]
        fn ascending_batches_after_cursor_verify(
            cursor in 0u64..1000,
            steps in proptest::collection::vec(1u64..50, 0..40),
        ) {
            let mut lsn = cursor;
            let lsns: Vec<Lsn> = steps.iter().map(|s| { lsn += s; lsn }).collect();
            prop_assert!(batch(&lsns).verify_order(cursor).is_ok());
        }

        #[test]
        fn swapped_neighbors_fail_verification(
            cursor in 0u64..1000,
            steps in proptest::collection::vec(1u64..50, 2..40),
            pick in any::<proptest::sample::Index>(),
        ) {
            let mut lsn = cursor;
            let mut lsns: Vec<Lsn> = steps.iter().map(|s| { lsn += s; lsn }).collect();
            let i = pick.index(lsns.len() - 1);
            lsns.swap(i, i + 1);
            prop_assert!(batch(&lsns).verify_order(cursor).is_err());
        }
    }
}
