//! Ingestion, search, storage and embedding models.

use crate::collection::AttrType;
use crate::error::ProtocolError;
use crate::JsonMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Where ingested data comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestSourceType {
    /// An uploaded file (CSV, JSON lines, ...).
    #[default]
    File,
    /// A MongoDB collection.
    MongoDb,
}

impl IngestSourceType {
    /// Returns the wire name of the source.
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestSourceType::File => "file",
            IngestSourceType::MongoDb => "mongodb",
        }
    }
}

impl fmt::Display for IngestSourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of `POST /api/data/v1/ingest`.
///
/// Use either `file_path` or the MongoDB settings as the source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestRequest {
    /// Path of an uploaded file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    /// Source kind.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_type: Option<IngestSourceType>,
    /// MongoDB database.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_name: Option<String>,
    /// MongoDB collection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mongo_collection: Option<String>,
    /// MongoDB query document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<JsonMap>,
    /// MongoDB cursor batch size.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mongo_fetch_batch_size: Option<u32>,
    /// Target Shilp collection.
    pub collection_name: String,
    /// Fields stored as keywords.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword_fields: Option<Vec<String>>,
    /// Metadata field types.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_fields: Option<HashMap<String, AttrType>>,
    /// Fields to embed.
    pub fields: Vec<String>,
    /// Source field used as record ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_field: Option<String>,
    /// Source field used as record expiry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_field: Option<String>,
    /// Embedding provider override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_provider: Option<String>,
    /// Embedding model override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    /// Records per ingestion batch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingestion_batch_size: Option<u32>,
}

impl IngestRequest {
    /// Ingest an uploaded file into `collection`, embedding `fields`.
    pub fn from_file(
        collection: impl Into<String>,
        file_path: impl Into<String>,
        fields: Vec<String>,
    ) -> Self {
        Self {
            file_path: Some(file_path.into()),
            source_type: Some(IngestSourceType::File),
            collection_name: collection.into(),
            fields,
            ..Default::default()
        }
    }

    /// Ingest a MongoDB collection into `collection`, embedding `fields`.
    pub fn from_mongo(
        collection: impl Into<String>,
        database: impl Into<String>,
        mongo_collection: impl Into<String>,
        fields: Vec<String>,
    ) -> Self {
        Self {
            source_type: Some(IngestSourceType::MongoDb),
            database_name: Some(database.into()),
            mongo_collection: Some(mongo_collection.into()),
            collection_name: collection.into(),
            fields,
            ..Default::default()
        }
    }
}

/// Response of `POST /api/data/v1/ingest`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestResponse {
    /// Success flag.
    #[serde(default)]
    pub success: bool,
    /// Status message.
    #[serde(default)]
    pub message: String,
    /// Per-batch details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

/// Response of `GET /api/data/v1/ingest/sources`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListIngestionSourcesResponse {
    /// Success flag.
    #[serde(default)]
    pub success: bool,
    /// Status message.
    #[serde(default)]
    pub message: String,
    /// Enabled sources.
    #[serde(default)]
    pub data: Option<Vec<IngestSourceType>>,
}

/// Options for previewing a stored document.
///
/// `limit` and `skip` are signed so callers can pass through unchecked
/// input; negative values are rejected before any request is sent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileReaderOptions {
    /// Source kind, `file` if unset.
    pub source: Option<IngestSourceType>,
    /// MongoDB filter document (ignored for file sources).
    pub mongo_filter: Option<JsonMap>,
    /// Rows to skip.
    pub skip: Option<i64>,
    /// Rows to return.
    pub limit: Option<i64>,
}

impl FileReaderOptions {
    /// Options for a MongoDB source.
    pub fn mongo() -> Self {
        Self {
            source: Some(IngestSourceType::MongoDb),
            ..Default::default()
        }
    }

    /// Sets the row limit.
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the number of rows to skip.
    pub fn with_skip(mut self, skip: i64) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Sets the MongoDB filter.
    pub fn with_mongo_filter(mut self, filter: JsonMap) -> Self {
        self.mongo_filter = Some(filter);
        self
    }
}

/// Comparison operator in a metadata filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum FilterOp {
    /// `==`
    Equals,
    /// `!=`
    NotEquals,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanOrEqual,
    /// `<`
    LessThan,
    /// `<=`
    LessThanOrEqual,
    /// Member of `values`.
    In,
    /// Not a member of `values`.
    NotIn,
}

impl TryFrom<i64> for FilterOp {
    type Error = ProtocolError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => FilterOp::Equals,
            1 => FilterOp::NotEquals,
            2 => FilterOp::GreaterThan,
            3 => FilterOp::GreaterThanOrEqual,
            4 => FilterOp::LessThan,
            5 => FilterOp::LessThanOrEqual,
            6 => FilterOp::In,
            7 => FilterOp::NotIn,
            _ => {
                return Err(ProtocolError::UnknownEnumValue {
                    kind: "FilterOp",
                    value,
                })
            }
        })
    }
}

impl From<FilterOp> for i64 {
    fn from(value: FilterOp) -> Self {
        value as i64
    }
}

/// A single metadata filter clause.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterExpression {
    /// Metadata attribute name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    /// Operator.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op: Option<FilterOp>,
    /// Operand for scalar operators.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    /// Operands for `In` / `NotIn`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<serde_json::Value>>,
}

impl FilterExpression {
    /// A scalar comparison clause.
    pub fn compare(attribute: impl Into<String>, op: FilterOp, value: serde_json::Value) -> Self {
        Self {
            attribute: Some(attribute.into()),
            op: Some(op),
            value: Some(value),
            values: None,
        }
    }

    /// A set-membership clause.
    pub fn one_of(attribute: impl Into<String>, values: Vec<serde_json::Value>) -> Self {
        Self {
            attribute: Some(attribute.into()),
            op: Some(FilterOp::In),
            value: None,
            values: Some(values),
        }
    }
}

/// Conjunction of filter clauses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompoundFilter {
    /// Clauses that must all hold.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub and: Option<Vec<FilterExpression>>,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum SortOrder {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

impl TryFrom<i64> for SortOrder {
    type Error = ProtocolError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SortOrder::Ascending),
            1 => Ok(SortOrder::Descending),
            _ => Err(ProtocolError::UnknownEnumValue {
                kind: "SortOrder",
                value,
            }),
        }
    }
}

impl From<SortOrder> for i64 {
    fn from(value: SortOrder) -> Self {
        value as i64
    }
}

/// Sort by one metadata attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortExpression {
    /// Attribute name.
    pub attribute: String,
    /// Direction.
    pub order: SortOrder,
}

/// Ordered list of sort keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompoundSort {
    /// Sort keys, most significant first.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sorts: Option<Vec<SortExpression>>,
}

/// Body of `POST /api/data/v1/search`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Collection to search.
    pub collection: String,
    /// Query text.
    pub query: String,
    /// Fields to search, all searchable fields if unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
    /// Maximum number of results.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    /// Per-field score weights.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weights: Option<HashMap<String, f64>>,
    /// Distance cutoff.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_distance: Option<f64>,
    /// Metadata filters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<CompoundFilter>,
    /// Metadata sort.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<CompoundSort>,
}

impl SearchRequest {
    /// Creates a search over all searchable fields.
    pub fn new(collection: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            query: query.into(),
            ..Default::default()
        }
    }

    /// Restricts the search to `fields`.
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the result limit.
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets a score weight for one field.
    pub fn with_weight(mut self, field: impl Into<String>, weight: f64) -> Self {
        self.weights
            .get_or_insert_with(HashMap::new)
            .insert(field.into(), weight);
        self
    }

    /// Adds a filter clause.
    pub fn with_filter(mut self, clause: FilterExpression) -> Self {
        self.filters
            .get_or_insert_with(CompoundFilter::default)
            .and
            .get_or_insert_with(Vec::new)
            .push(clause);
        self
    }

    /// Adds a sort key.
    pub fn with_sort(mut self, attribute: impl Into<String>, order: SortOrder) -> Self {
        self.sort
            .get_or_insert_with(CompoundSort::default)
            .sorts
            .get_or_insert_with(Vec::new)
            .push(SortExpression {
                attribute: attribute.into(),
                order,
            });
        self
    }
}

/// Response of `POST /api/data/v1/search`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Success flag.
    #[serde(default)]
    pub success: bool,
    /// Status message.
    #[serde(default)]
    pub message: String,
    /// Matching documents, best first.
    #[serde(default)]
    pub data: Vec<JsonMap>,
}

impl SearchResponse {
    /// Returns the `id` of each hit that has one.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.data
            .iter()
            .filter_map(|hit| hit.get("id").and_then(|v| v.as_str()))
    }
}

/// Entry in an uploads listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageItem {
    /// File, directory, database or collection name.
    pub name: String,
    /// Whether the item can be listed further.
    #[serde(rename = "isDir", default)]
    pub is_dir: bool,
}

/// Payload of a storage listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageListing {
    /// Listed items.
    #[serde(default)]
    pub items: Vec<StorageItem>,
}

/// Response of `GET /api/data/v1/storage/list`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListStorageResponse {
    /// Success flag.
    #[serde(default)]
    pub success: bool,
    /// Status message.
    #[serde(default)]
    pub message: String,
    /// Listing.
    #[serde(default)]
    pub data: StorageListing,
}

/// Response of `GET /api/data/v1/storage/read`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadDocumentResponse {
    /// Success flag.
    #[serde(default)]
    pub success: bool,
    /// Status message.
    #[serde(default)]
    pub message: String,
    /// Preview rows.
    #[serde(default)]
    pub data: Vec<JsonMap>,
}

/// An embedding model offered by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingModel {
    /// Model name.
    pub name: String,
    /// Whether this is the provider's default model.
    #[serde(default)]
    pub is_default: bool,
}

/// An embedding provider and its models.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingProvider {
    /// Provider name.
    pub name: String,
    /// Whether this is the server default provider.
    #[serde(default)]
    pub is_default: bool,
    /// Models offered.
    #[serde(default)]
    pub models: Vec<EmbeddingModel>,
}

/// Response of `GET /api/data/v1/embedding/models`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListEmbeddingModelsResponse {
    /// Success flag.
    #[serde(default)]
    pub success: bool,
    /// Status message.
    #[serde(default)]
    pub message: String,
    /// Providers.
    #[serde(default)]
    pub data: Vec<EmbeddingProvider>,
    /// Whether embeddings can be computed by registered TEI services.
    #[serde(default)]
    pub supports_distributed_embedding: bool,
}
