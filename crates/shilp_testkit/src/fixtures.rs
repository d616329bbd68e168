//! Test fixtures: sample records, oplog batches and temporary files.

use serde_json::{json, Value};
use shilp_protocol::{GetOplogResponse, InsertRecordRequest, JsonMap, Lsn, OpType, OplogEntry};
use std::io::Write;
use std::path::PathBuf;
use tempfile::TempDir;

/// Converts a JSON object literal into a [`JsonMap`].
///
/// # Panics
///
/// Panics if `value` is not an object.
pub fn object(value: Value) -> JsonMap {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// The canonical `record-1` / `"Hello World"` record.
pub fn hello_world_record(collection: &str) -> InsertRecordRequest {
    InsertRecordRequest::new(collection, object(json!({ "title": "Hello World" })))
        .with_id("record-1")
        .with_fields(["title"])
}

/// An insert entry with a `title` field.
pub fn insert_entry(lsn: Lsn, collection: &str, doc_id: &str, title: &str) -> OplogEntry {
    let mut entry = OplogEntry::new(lsn, collection, doc_id, OpType::Insert);
    entry.fields = Some(object(json!({ "title": title })));
    entry
}

/// A successful fetch response holding inserts at `lsns`.
pub fn oplog_batch(collection: &str, lsns: &[Lsn]) -> GetOplogResponse {
    GetOplogResponse {
        success: true,
        message: String::new(),
        entries: lsns
            .iter()
            .map(|&lsn| insert_entry(lsn, collection, &format!("doc-{lsn}"), "fixture"))
            .collect(),
        last_lsn: lsns.last().copied().unwrap_or(0),
        count: lsns.len() as u64,
    }
}

/// A file inside a temporary directory that lives as long as this value.
pub struct TempFile {
    /// Path of the file.
    pub path: PathBuf,
    _dir: TempDir,
}

impl TempFile {
    /// Creates `name` with `contents`.
    pub fn new(name: &str, contents: &[u8]) -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).expect("Failed to create temp file");
        file.write_all(contents).expect("Failed to write temp file");
        Self { path, _dir: dir }
    }

    /// A small CSV upload.
    pub fn csv() -> Self {
        Self::new("articles.csv", b"id,title\n1,Hello World\n2,Goodbye\n")
    }
}
