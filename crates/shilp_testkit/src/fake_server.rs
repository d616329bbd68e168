//! An in-memory Shilp server for integration tests.
//!
//! [`FakeShilp`] mounts a single stateful responder on a `wiremock`
//! server. It keeps collections, records and an oplog in memory, assigns
//! LSNs to every mutation, and tracks replica registrations and heartbeat
//! watermarks so tests can assert on what the client sent.
//!
//! Like the deployed server, the register path always registers: an
//! unregister sent there leaves the replica registered. Only
//! `/api/oplog/v1/unregister` removes it.

use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use shilp_protocol::{
    JsonMap, Lsn, OpType, OplogEntry, RegisterReplicaRequest, SearchRequest,
    UnregisterReplicaRequest, UpdateReplicaLsnRequest,
};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use wiremock::matchers::any;
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Version reported by `GET /health`.
pub const FAKE_VERSION: &str = "0.0.0-fake";

#[derive(Debug, Default)]
struct FakeCollection {
    loaded: bool,
    flushed: bool,
    records: BTreeMap<String, JsonMap>,
}

#[derive(Debug, Default)]
struct FakeState {
    collections: BTreeMap<String, FakeCollection>,
    oplog: Vec<OplogEntry>,
    last_lsn: Lsn,
    replicas: BTreeSet<String>,
    watermarks: HashMap<(String, String), Lsn>,
    heartbeats: Vec<UpdateReplicaLsnRequest>,
    failures: VecDeque<(u16, String)>,
    ingest_events: Vec<String>,
    requests: Vec<String>,
    next_id: u64,
}

impl FakeState {
    fn append(&mut self, collection: &str, doc_id: &str, op_type: OpType) -> &mut OplogEntry {
        self.last_lsn += 1;
        let mut entry = OplogEntry::new(self.last_lsn, collection, doc_id, op_type);
        entry.timestamp = format!("2026-01-01T00:00:{:02}Z", self.last_lsn % 60);
        self.oplog.push(entry);
        let last = self.oplog.len() - 1;
        &mut self.oplog[last]
    }

    fn retention_lsn(&self, collection: &str) -> Lsn {
        // Nothing is ever trimmed, so the oldest entry is retained.
        self.oplog
            .iter()
            .find(|e| collection.is_empty() || e.collection == collection)
            .map_or(self.last_lsn, |e| e.lsn)
    }
}

/// A running fake Shilp server.
pub struct FakeShilp {
    server: MockServer,
    state: Arc<Mutex<FakeState>>,
}

impl FakeShilp {
    /// Starts a fake server on a random local port.
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let state = Arc::new(Mutex::new(FakeState::default()));
        Mock::given(any())
            .respond_with(FakeResponder {
                state: Arc::clone(&state),
            })
            .mount(&server)
            .await;
        Self { server, state }
    }

    /// Base URL of the server.
    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Creates an empty collection.
    pub fn seed_collection(&self, name: &str) {
        self.state
            .lock()
            .collections
            .entry(name.to_string())
            .or_insert_with(|| FakeCollection {
                loaded: true,
                ..Default::default()
            });
    }

    /// Inserts `count` records `doc-1..=doc-count` into a collection,
    /// logging one insert per record.
    pub fn seed_records(&self, collection: &str, count: usize) {
        self.seed_collection(collection);
        let mut state = self.state.lock();
        for i in 1..=count {
            let id = format!("doc-{i}");
            let fields = json!({ "title": format!("Document {i}") })
                .as_object()
                .cloned()
                .unwrap_or_default();
            upsert(&mut state, collection, &id, fields);
        }
    }

    /// Appends a raw entry to the oplog, assigning the next LSN.
    pub fn append_entry(&self, collection: &str, doc_id: &str, op_type: OpType) -> Lsn {
        let mut state = self.state.lock();
        state.append(collection, doc_id, op_type).lsn
    }

    /// Makes the next request fail with `status` and `body`.
    pub fn fail_next(&self, status: u16, body: impl Into<String>) {
        self.state.lock().failures.push_back((status, body.into()));
    }

    /// Sets the lines served by the ingest stats stream.
    pub fn set_ingest_events<I, S>(&self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.lock().ingest_events = lines.into_iter().map(Into::into).collect();
    }

    /// Registered replica IDs.
    pub fn registered_replicas(&self) -> Vec<String> {
        self.state.lock().replicas.iter().cloned().collect()
    }

    /// Highest LSN a replica has reported for a collection.
    pub fn watermark(&self, collection: &str, replica_id: &str) -> Option<Lsn> {
        self.state
            .lock()
            .watermarks
            .get(&(collection.to_string(), replica_id.to_string()))
            .copied()
    }

    /// Every heartbeat received, in arrival order.
    pub fn heartbeats(&self) -> Vec<UpdateReplicaLsnRequest> {
        self.state.lock().heartbeats.clone()
    }

    /// Newest LSN.
    pub fn last_lsn(&self) -> Lsn {
        self.state.lock().last_lsn
    }

    /// Returns a record's fields.
    pub fn record(&self, collection: &str, id: &str) -> Option<JsonMap> {
        self.state
            .lock()
            .collections
            .get(collection)
            .and_then(|c| c.records.get(id).cloned())
    }

    /// Returns true if the collection exists.
    pub fn has_collection(&self, name: &str) -> bool {
        self.state.lock().collections.contains_key(name)
    }

    /// Returns true once the collection has been flushed.
    pub fn is_flushed(&self, name: &str) -> bool {
        self.state
            .lock()
            .collections
            .get(name)
            .is_some_and(|c| c.flushed)
    }

    /// `METHOD path` of every request received.
    pub fn requests(&self) -> Vec<String> {
        self.state.lock().requests.clone()
    }
}

struct FakeResponder {
    state: Arc<Mutex<FakeState>>,
}

impl Respond for FakeResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let mut state = self.state.lock();
        let method = request.method.as_str().to_string();
        let path = request.url.path().to_string();
        state.requests.push(format!("{method} {path}"));

        if let Some((status, body)) = state.failures.pop_front() {
            return ResponseTemplate::new(status).set_body_string(body);
        }

        let segments: Vec<String> = path
            .trim_matches('/')
            .split('/')
            .map(|s| {
                urlencoding::decode(s)
                    .map(|d| d.into_owned())
                    .unwrap_or_else(|_| s.to_string())
            })
            .collect();
        let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
        let query: HashMap<String, String> = request.url.query_pairs().into_owned().collect();

        route(&mut state, &method, &segments, &query, &request.body)
    }
}

fn route(
    state: &mut FakeState,
    method: &str,
    segments: &[&str],
    query: &HashMap<String, String>,
    body: &[u8],
) -> ResponseTemplate {
    match (method, segments) {
        ("GET", ["health"]) => ok_json(json!({ "success": true, "version": FAKE_VERSION })),

        ("GET", ["api", "collections", "v1"]) => list_collections(state),
        ("POST", ["api", "collections", "v1"]) => add_collection(state, body),
        ("POST", ["api", "collections", "v1", "record"]) => insert_record(state, body),
        ("POST", ["api", "collections", "v1", "import"]) => {
            ok_json(json!({ "success": true, "message": "imported" }))
        }
        ("DELETE", ["api", "collections", "v1", name]) => drop_collection(state, name),
        ("DELETE", ["api", "collections", "v1", name, id]) => delete_record(state, name, id),
        ("POST", ["api", "collections", "v1", name, "export"]) => export(state, name),
        ("POST", ["api", "collections", "v1", name, action]) => lifecycle(state, name, action),
        ("PUT", ["api", "collections", "v1", old, "rename", new]) => rename(state, old, new),
        ("PUT", ["api", "collections", "v1", name, "reindex"]) => lifecycle(state, name, "reindex"),

        ("POST", ["api", "data", "v1", "search"]) => search(state, body),
        ("GET", ["api", "data", "v1", "ingest", "stats"]) => ingest_stats(state),
        ("POST", ["api", "data", "v1", "storage", "upload"]) => {
            envelope(200, true, "file uploaded")
        }
        ("GET", ["api", "data", "v1", "ingest", "sources"]) => {
            ok_json(json!({ "success": true, "data": ["file", "mongodb"] }))
        }

        ("GET", ["api", "oplog", "v1"]) => get_oplog(state, query),
        ("GET", ["api", "oplog", "v1", "status"]) => oplog_status(state, query),
        ("POST", ["api", "oplog", "v1", "heartbeat"]) => heartbeat(state, body),
        ("POST", ["api", "oplog", "v1", "register"]) => register(state, body),
        ("POST", ["api", "oplog", "v1", "unregister"]) => unregister(state, body),

        _ => ResponseTemplate::new(404).set_body_string("404 page not found"),
    }
}

fn ok_json(value: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(value)
}

fn envelope(status: u16, success: bool, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(json!({ "success": success, "message": message }))
}

fn not_found(name: &str) -> ResponseTemplate {
    envelope(404, false, &format!("collection {name} not found"))
}

fn bad_request(message: &str) -> ResponseTemplate {
    envelope(400, false, message)
}

fn parse<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, ResponseTemplate> {
    serde_json::from_slice(body).map_err(|e| bad_request(&format!("invalid body: {e}")))
}

fn upsert(state: &mut FakeState, collection: &str, id: &str, fields: JsonMap) {
    let existed = state
        .collections
        .get(collection)
        .is_some_and(|c| c.records.contains_key(id));
    let op = if existed { OpType::Update } else { OpType::Insert };
    let entry = state.append(collection, id, op);
    entry.fields = Some(fields.clone());
    if let Some(c) = state.collections.get_mut(collection) {
        c.records.insert(id.to_string(), fields);
        c.flushed = false;
    }
}

fn list_collections(state: &FakeState) -> ResponseTemplate {
    let data: Vec<Value> = state
        .collections
        .iter()
        .map(|(name, c)| {
            let fields: BTreeSet<&String> = c.records.values().flat_map(|r| r.keys()).collect();
            json!({
                "name": name,
                "is_loaded": c.loaded,
                "fields": fields,
                "searchable_fields": fields,
                "has_metadata_enabled": false,
                "no_reference_storage": false,
                "storage_type": 1,
                "reference_storage_type": 1
            })
        })
        .collect();
    ok_json(json!({ "success": true, "message": "", "data": data, "metadata_info": [] }))
}

fn add_collection(state: &mut FakeState, body: &[u8]) -> ResponseTemplate {
    let request: Map<String, Value> = match parse(body) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let Some(name) = request.get("name").and_then(Value::as_str).filter(|n| !n.is_empty()) else {
        return bad_request("collection name is required");
    };
    if state.collections.contains_key(name) {
        return envelope(409, false, &format!("collection {name} already exists"));
    }
    state.collections.insert(
        name.to_string(),
        FakeCollection {
            loaded: true,
            ..Default::default()
        },
    );
    envelope(200, true, "collection created")
}

fn insert_record(state: &mut FakeState, body: &[u8]) -> ResponseTemplate {
    let request: Map<String, Value> = match parse(body) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let collection = request
        .get("collection")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    if !state.collections.contains_key(&collection) {
        return not_found(&collection);
    }
    let id = match request.get("id").and_then(Value::as_str) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => {
            state.next_id += 1;
            format!("gen-{}", state.next_id)
        }
    };
    let fields = request
        .get("record")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    upsert(state, &collection, &id, fields.clone());
    ok_json(json!({
        "success": true,
        "message": "record inserted",
        "record": { "id": id, "expiry": request.get("expiry").cloned().unwrap_or(json!(0)), "fields": fields }
    }))
}

fn drop_collection(state: &mut FakeState, name: &str) -> ResponseTemplate {
    if state.collections.remove(name).is_none() {
        return not_found(name);
    }
    state.append(name, "", OpType::DropCollection);
    envelope(200, true, "collection dropped")
}

fn delete_record(state: &mut FakeState, name: &str, id: &str) -> ResponseTemplate {
    let Some(collection) = state.collections.get_mut(name) else {
        return not_found(name);
    };
    if collection.records.remove(id).is_none() {
        return envelope(404, false, &format!("record {id} not found"));
    }
    state.append(name, id, OpType::Delete);
    envelope(200, true, "record deleted")
}

fn lifecycle(state: &mut FakeState, name: &str, action: &str) -> ResponseTemplate {
    let Some(collection) = state.collections.get_mut(name) else {
        return not_found(name);
    };
    match action {
        "flush" => collection.flushed = true,
        "load" => collection.loaded = true,
        "unload" => collection.loaded = false,
        "expiry-cleanup" | "reindex" => {}
        _ => return ResponseTemplate::new(404).set_body_string("404 page not found"),
    }
    envelope(200, true, &format!("{action} completed"))
}

fn rename(state: &mut FakeState, old: &str, new: &str) -> ResponseTemplate {
    if state.collections.contains_key(new) {
        return envelope(409, false, &format!("collection {new} already exists"));
    }
    let Some(collection) = state.collections.remove(old) else {
        return not_found(old);
    };
    state.collections.insert(new.to_string(), collection);
    state.append(old, "", OpType::RenameCollection).new_name = Some(new.to_string());
    envelope(200, true, "collection renamed")
}

fn export(state: &FakeState, name: &str) -> ResponseTemplate {
    let Some(collection) = state.collections.get(name) else {
        return not_found(name);
    };
    let mut out = String::new();
    for (id, fields) in &collection.records {
        out.push_str(&json!({ "id": id, "fields": fields }).to_string());
        out.push('\n');
    }
    ResponseTemplate::new(200).set_body_raw(out.into_bytes(), "application/octet-stream")
}

fn search(state: &FakeState, body: &[u8]) -> ResponseTemplate {
    let request: SearchRequest = match parse(body) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let Some(collection) = state.collections.get(&request.collection) else {
        return not_found(&request.collection);
    };
    let needle = request.query.to_lowercase();
    let limit = request.limit.filter(|l| *l > 0).unwrap_or(10) as usize;

    let hits: Vec<Value> = collection
        .records
        .iter()
        .filter(|(_, fields)| {
            fields.iter().any(|(key, value)| {
                let searched = request
                    .fields
                    .as_ref()
                    .map_or(true, |wanted| wanted.iter().any(|f| f == key));
                searched
                    && value
                        .as_str()
                        .is_some_and(|text| text.to_lowercase().contains(&needle))
            })
        })
        .take(limit)
        .map(|(id, fields)| {
            let mut hit = fields.clone();
            hit.insert("id".into(), json!(id));
            hit.insert("dist".into(), json!(0.0));
            Value::Object(hit)
        })
        .collect();
    ok_json(json!({ "success": true, "message": "", "data": hits }))
}

fn ingest_stats(state: &FakeState) -> ResponseTemplate {
    let mut out = String::new();
    for line in &state.ingest_events {
        out.push_str(line);
        out.push_str("\n\n");
    }
    ResponseTemplate::new(200).set_body_raw(out.into_bytes(), "text/event-stream")
}

fn get_oplog(state: &FakeState, query: &HashMap<String, String>) -> ResponseTemplate {
    let Some(after_lsn) = query.get("after_lsn").and_then(|v| v.parse::<Lsn>().ok()) else {
        return bad_request("after_lsn is required");
    };
    let collection = query.get("collection").map(String::as_str).unwrap_or("");
    let limit = query
        .get("limit")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(100);

    let entries: Vec<&OplogEntry> = state
        .oplog
        .iter()
        .filter(|e| e.lsn > after_lsn && (collection.is_empty() || e.collection == collection))
        .take(limit)
        .collect();
    ok_json(json!({
        "success": true,
        "message": "",
        "count": entries.len(),
        "entries": entries,
        "last_lsn": state.last_lsn
    }))
}

fn oplog_status(state: &FakeState, query: &HashMap<String, String>) -> ResponseTemplate {
    let collection = query.get("collection").map(String::as_str).unwrap_or("");
    ok_json(json!({
        "success": true,
        "message": "",
        "last_lsn": state.last_lsn,
        "retention_lsn": state.retention_lsn(collection),
        "replica_count": state.replicas.len()
    }))
}

fn heartbeat(state: &mut FakeState, body: &[u8]) -> ResponseTemplate {
    let request: UpdateReplicaLsnRequest = match parse(body) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    if !state.replicas.contains(&request.replica_id) {
        return envelope(200, false, "replica not registered");
    }
    let key = (request.collection.clone(), request.replica_id.clone());
    let mark = state.watermarks.entry(key).or_insert(0);
    *mark = (*mark).max(request.lsn);
    state.heartbeats.push(request);
    envelope(200, true, "heartbeat recorded")
}

fn register(state: &mut FakeState, body: &[u8]) -> ResponseTemplate {
    let request: RegisterReplicaRequest = match parse(body) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    state.replicas.insert(request.replica_id);
    envelope(200, true, "replica registered")
}

fn unregister(state: &mut FakeState, body: &[u8]) -> ResponseTemplate {
    let request: UnregisterReplicaRequest = match parse(body) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    state.replicas.remove(&request.replica_id);
    state.watermarks.retain(|(_, id), _| id != &request.replica_id);
    envelope(200, true, "replica unregistered")
}
