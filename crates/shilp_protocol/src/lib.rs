//! # Shilp Protocol
//!
//! Wire types for the Shilp HTTP API.
//!
//! This crate provides:
//! - Request and response models for every endpoint group
//!   (collections, data, debug, health, oplog, discovery)
//! - `OplogEntry` and the typed [`Change`] view used by replicas
//! - Ordering checks for fetched oplog batches
//!
//! This is a pure protocol crate with no I/O operations.
//!
//! ## Envelope
//!
//! Every JSON response carries `success` and `message`. Data-bearing
//! responses add a `data` field or a domain-specific one (`entries`,
//! `last_lsn`, `record`, ...). Missing envelope fields decode to their
//! defaults.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod collection;
mod data;
mod debug;
mod discovery;
mod error;
mod oplog;
mod response;

pub use collection::{
    AddCollectionRequest, AttrType, Collection, InsertRecordRequest, InsertRecordResponse,
    ListCollectionsResponse, MetadataColumnSchema, MetadataSupportInfo, RecordData,
    StorageBackendType,
};
pub use data::{
    CompoundFilter, CompoundSort, EmbeddingModel, EmbeddingProvider, FileReaderOptions,
    FilterExpression, FilterOp, IngestRequest, IngestResponse, IngestSourceType,
    ListEmbeddingModelsResponse, ListIngestionSourcesResponse, ListStorageResponse,
    ReadDocumentResponse, SearchRequest, SearchResponse, SortExpression, SortOrder, StorageItem,
    StorageListing,
};
pub use debug::{
    DebugDistance, DebugDistanceResponse, DebugLevelInfo, DebugLevelsResponse, DebugNeighbor,
    DebugNodeInfo, DebugNodeInfoResponse, DebugNodesAtLevelResponse, DebugReferenceNode,
    DebugReferenceNodeResponse, DebugVectorNode,
};
pub use discovery::{
    DiscoveryStats, ProxyStats, RegisterToDiscoveryRequest, RegistryStatus, ReplicaNode,
    ReplicaType, SyncStatus, UpdateSyncStatusRequest,
};
pub use error::{ProtocolError, ProtocolResult};
pub use oplog::{
    Change, GetOplogResponse, Lsn, OpType, OplogEntry, OplogStatusResponse, Record,
    RegisterReplicaRequest, UnregisterReplicaRequest, UpdateReplicaLsnRequest,
    UpdateReplicaLsnResponse,
};
pub use response::{GenericResponse, HealthResponse};

/// Free-form JSON object used for documents, filters and metadata.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;
