//! Ingestion, search and storage endpoints.

use crate::error::{ClientError, ClientResult};
use crate::stream::IngestStatsStream;
use crate::transport::{ApiRequest, Transport};
use reqwest::Method;
use shilp_protocol::{
    FileReaderOptions, GenericResponse, IngestRequest, IngestResponse, IngestSourceType,
    ListEmbeddingModelsResponse, ListIngestionSourcesResponse, ListStorageResponse,
    ReadDocumentResponse, SearchRequest, SearchResponse,
};
use std::path::Path;

const BASE: &str = "/api/data/v1";

/// Data endpoints, borrowed from a [`ShilpClient`](crate::ShilpClient).
#[derive(Debug, Clone, Copy)]
pub struct DataApi<'a> {
    transport: &'a Transport,
}

impl<'a> DataApi<'a> {
    pub(crate) fn new(transport: &'a Transport) -> Self {
        Self { transport }
    }

    /// Starts a bulk ingestion from a file or MongoDB source.
    pub async fn ingest(&self, request: &IngestRequest) -> ClientResult<IngestResponse> {
        self.transport
            .request(ApiRequest::post(format!("{BASE}/ingest")).json(request)?)
            .await
    }

    /// Runs a search query.
    pub async fn search(&self, request: &SearchRequest) -> ClientResult<SearchResponse> {
        self.transport
            .request(ApiRequest::post(format!("{BASE}/search")).json(request)?)
            .await
    }

    /// Lists uploaded files, or MongoDB databases and collections.
    ///
    /// For MongoDB an empty path lists databases and a database path lists
    /// its collections.
    pub async fn list_storage(
        &self,
        path: Option<&str>,
        source: Option<IngestSourceType>,
    ) -> ClientResult<ListStorageResponse> {
        let mut request = ApiRequest::get(format!("{BASE}/storage/list"));
        if let Some(path) = path.filter(|p| !p.is_empty()) {
            request = request.query("path", path);
        }
        if let Some(source) = source {
            request = request.query("source", source);
        }
        self.transport.request(request).await
    }

    /// Lists the ingestion sources the server supports.
    pub async fn list_ingest_sources(&self) -> ClientResult<ListIngestionSourcesResponse> {
        self.transport
            .request(ApiRequest::get(format!("{BASE}/ingest/sources")))
            .await
    }

    /// Previews the first rows of a stored file or MongoDB collection.
    ///
    /// For MongoDB sources `path` is `database/collection`. Invalid
    /// arguments fail with [`ClientError::Validation`] before any request
    /// is sent.
    pub async fn read_document(
        &self,
        path: &str,
        options: &FileReaderOptions,
    ) -> ClientResult<ReadDocumentResponse> {
        let request = read_document_request(path, options)?;
        self.transport.request(request).await
    }

    /// Uploads a file to storage for later ingestion.
    pub async fn upload_file(&self, file_path: impl AsRef<Path>) -> ClientResult<GenericResponse> {
        self.transport
            .upload_file(Method::POST, &format!("{BASE}/storage/upload"), file_path.as_ref())
            .await?;
        Ok(GenericResponse::ok("Upload completed"))
    }

    /// Opens the ingestion statistics event stream for a collection.
    pub async fn stream_ingest_stats(&self, collection: &str) -> ClientResult<IngestStatsStream> {
        let request = ApiRequest::get(format!("{BASE}/ingest/stats")).query("collection", collection);
        let bytes = self.transport.request_stream(request).await?;
        Ok(IngestStatsStream::new(bytes))
    }

    /// Lists embedding providers and their models.
    pub async fn list_embedding_models(&self) -> ClientResult<ListEmbeddingModelsResponse> {
        self.transport
            .request(ApiRequest::get(format!("{BASE}/embedding/models")))
            .await
    }
}

fn read_document_request(path: &str, options: &FileReaderOptions) -> ClientResult<ApiRequest> {
    if path.is_empty() {
        return Err(ClientError::Validation("path cannot be empty".into()));
    }

    let rows = options.limit.unwrap_or(0);
    if rows < 0 {
        return Err(ClientError::Validation("rows cannot be negative".into()));
    }

    let skip = options.skip.unwrap_or(0);
    if skip < 0 {
        return Err(ClientError::Validation("skip cannot be negative".into()));
    }

    let source = options.source.unwrap_or_default();
    if source == IngestSourceType::MongoDb && path.matches('/').count() != 1 {
        return Err(ClientError::Validation(
            "for mongodb source, path must be in the format 'database/collection'".into(),
        ));
    }

    let mut request = ApiRequest::get(format!("{BASE}/storage/read"))
        .query("path", path)
        .query("source", source);
    if rows > 0 {
        request = request.query("rows", rows);
    }
    if skip > 0 {
        request = request.query("skip", skip);
    }
    if source == IngestSourceType::MongoDb {
        if let Some(filter) = &options.mongo_filter {
            request = request.query("mongo_filter", serde_json::Value::Object(filter.clone()));
        }
    }
    Ok(request)
}
