//! Collection and record models.

use crate::error::ProtocolError;
use crate::JsonMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Type of a metadata attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum AttrType {
    /// 64-bit signed integer.
    Int64,
    /// 64-bit float.
    Float64,
    /// UTF-8 string.
    String,
    /// Boolean.
    Bool,
}

impl TryFrom<i64> for AttrType {
    type Error = ProtocolError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(AttrType::Int64),
            1 => Ok(AttrType::Float64),
            2 => Ok(AttrType::String),
            3 => Ok(AttrType::Bool),
            _ => Err(ProtocolError::UnknownEnumValue {
                kind: "AttrType",
                value,
            }),
        }
    }
}

impl From<AttrType> for i64 {
    fn from(value: AttrType) -> Self {
        match value {
            AttrType::Int64 => 0,
            AttrType::Float64 => 1,
            AttrType::String => 2,
            AttrType::Bool => 3,
        }
    }
}

/// Storage backend used for a collection's primary or reference storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum StorageBackendType {
    /// No storage configured.
    DoesNotExist,
    /// Local file storage.
    File,
    /// S3-compatible object storage.
    S3,
}

impl TryFrom<i64> for StorageBackendType {
    type Error = ProtocolError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(StorageBackendType::DoesNotExist),
            1 => Ok(StorageBackendType::File),
            2 => Ok(StorageBackendType::S3),
            _ => Err(ProtocolError::UnknownEnumValue {
                kind: "StorageBackendType",
                value,
            }),
        }
    }
}

impl From<StorageBackendType> for i64 {
    fn from(value: StorageBackendType) -> Self {
        match value {
            StorageBackendType::DoesNotExist => -1,
            StorageBackendType::File => 1,
            StorageBackendType::S3 => 2,
        }
    }
}

/// Schema of one metadata column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataColumnSchema {
    /// Column name.
    pub name: String,
    /// Column type.
    #[serde(rename = "type")]
    pub attr_type: AttrType,
}

/// A collection as reported by `GET /api/collections/v1/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    /// Collection name.
    pub name: String,
    /// Whether the collection is currently loaded in memory.
    #[serde(default)]
    pub is_loaded: bool,
    /// All fields stored for records.
    #[serde(default)]
    pub fields: Vec<String>,
    /// Fields indexed for vector search.
    #[serde(default)]
    pub searchable_fields: Vec<String>,
    /// Metadata columns, if metadata storage is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Vec<MetadataColumnSchema>>,
    /// Whether metadata storage is enabled.
    #[serde(default)]
    pub has_metadata_enabled: bool,
    /// Whether reference storage is disabled.
    #[serde(default)]
    pub no_reference_storage: bool,
    /// Primary storage backend.
    pub storage_type: StorageBackendType,
    /// Reference storage backend.
    pub reference_storage_type: StorageBackendType,
}

/// Metadata support advertised per storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataSupportInfo {
    /// Whether the backend supports metadata columns.
    pub support_metadata: bool,
    /// Backend display name.
    pub name: String,
    /// Backend type.
    #[serde(rename = "type")]
    pub backend: StorageBackendType,
    /// Whether this backend is the server default.
    #[serde(default)]
    pub is_default: bool,
}

/// Response of `GET /api/collections/v1/`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListCollectionsResponse {
    /// Success flag.
    #[serde(default)]
    pub success: bool,
    /// Status message.
    #[serde(default)]
    pub message: String,
    /// Collections on the server.
    #[serde(default)]
    pub data: Vec<Collection>,
    /// Metadata support per storage backend.
    #[serde(default)]
    pub metadata_info: Vec<MetadataSupportInfo>,
}

/// Body of `POST /api/collections/v1/`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddCollectionRequest {
    /// Collection name.
    pub name: String,
    /// Disable reference storage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_reference_storage: Option<bool>,
    /// Enable metadata storage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_metadata_storage: Option<bool>,
    /// Primary storage backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_type: Option<StorageBackendType>,
    /// Reference storage backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_storage_type: Option<StorageBackendType>,
}

impl AddCollectionRequest {
    /// Creates a request with server defaults for everything but the name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Sets both primary and reference storage backends.
    pub fn with_storage(mut self, storage: StorageBackendType, reference: StorageBackendType) -> Self {
        self.storage_type = Some(storage);
        self.reference_storage_type = Some(reference);
        self
    }

    /// Disables reference storage.
    pub fn without_reference_storage(mut self) -> Self {
        self.no_reference_storage = Some(true);
        self
    }

    /// Enables metadata storage.
    pub fn with_metadata_storage(mut self) -> Self {
        self.has_metadata_storage = Some(true);
        self
    }
}

/// A stored record as echoed back by insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordData {
    /// Record ID.
    pub id: String,
    /// Expiry as a unix timestamp, 0 for none.
    #[serde(default)]
    pub expiry: i64,
    /// Record fields.
    #[serde(default)]
    pub fields: JsonMap,
    /// Fields stored as keywords.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword_fields: Option<HashMap<String, bool>>,
    /// Metadata field types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_fields: Option<HashMap<String, i64>>,
}

/// Body of `POST /api/collections/v1/record`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsertRecordRequest {
    /// Target collection.
    pub collection: String,
    /// Expiry as a unix timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry: Option<i64>,
    /// Record ID; the server assigns one if absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Document body.
    pub record: JsonMap,
    /// Metadata field types.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_fields: Option<HashMap<String, AttrType>>,
    /// Embedding provider override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_provider: Option<String>,
    /// Fields to embed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
    /// Fields stored as keywords.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword_fields: Option<Vec<String>>,
    /// Embedding model override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl InsertRecordRequest {
    /// Creates an insert request for `record` into `collection`.
    pub fn new(collection: impl Into<String>, record: JsonMap) -> Self {
        Self {
            collection: collection.into(),
            record,
            ..Default::default()
        }
    }

    /// Sets the record ID.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the fields to embed.
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the expiry timestamp.
    pub fn with_expiry(mut self, expiry: i64) -> Self {
        self.expiry = Some(expiry);
        self
    }
}

/// Response of `POST /api/collections/v1/record`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsertRecordResponse {
    /// Success flag.
    #[serde(default)]
    pub success: bool,
    /// Status message.
    #[serde(default)]
    pub message: String,
    /// The stored record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<RecordData>,
    /// Remaining record quota, if the server enforces one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_records: Option<i64>,
}
