//! Collection management endpoints.

use crate::error::{ClientError, ClientResult};
use crate::stream::ByteStream;
use crate::transport::{segment, ApiRequest, Transport};
use reqwest::Method;
use shilp_protocol::{
    AddCollectionRequest, GenericResponse, InsertRecordRequest, InsertRecordResponse,
    ListCollectionsResponse,
};
use std::path::Path;

const BASE: &str = "/api/collections/v1";

/// Collection endpoints, borrowed from a [`ShilpClient`](crate::ShilpClient).
#[derive(Debug, Clone, Copy)]
pub struct CollectionsApi<'a> {
    transport: &'a Transport,
}

impl<'a> CollectionsApi<'a> {
    pub(crate) fn new(transport: &'a Transport) -> Self {
        Self { transport }
    }

    /// Lists all collections.
    pub async fn list(&self) -> ClientResult<ListCollectionsResponse> {
        self.transport.request(ApiRequest::get(format!("{BASE}/"))).await
    }

    /// Creates a collection.
    pub async fn add(&self, request: &AddCollectionRequest) -> ClientResult<GenericResponse> {
        self.transport
            .request(ApiRequest::post(format!("{BASE}/")).json(request)?)
            .await
    }

    /// Deletes one record.
    ///
    /// A client-error status with a JSON envelope (e.g. unknown record) is
    /// returned as `success: false`.
    pub async fn delete_record(&self, collection: &str, id: &str) -> ClientResult<GenericResponse> {
        let path = format!("{BASE}/{}/{}", segment(collection), segment(id));
        envelope_on_client_error(self.transport.request(ApiRequest::delete(path)).await)
    }

    /// Removes expired records.
    pub async fn expiry_cleanup(&self, collection: &str) -> ClientResult<GenericResponse> {
        self.post_action(collection, "expiry-cleanup").await
    }

    /// Drops a collection.
    ///
    /// Dropping a collection that does not exist yields `success: false`
    /// rather than an error, whether the server reports it with a 2xx or a
    /// 4xx status.
    pub async fn drop(&self, collection: &str) -> ClientResult<GenericResponse> {
        let path = format!("{BASE}/{}", segment(collection));
        envelope_on_client_error(self.transport.request(ApiRequest::delete(path)).await)
    }

    /// Flushes a collection to disk.
    pub async fn flush(&self, collection: &str) -> ClientResult<GenericResponse> {
        self.post_action(collection, "flush").await
    }

    /// Loads a collection into memory.
    pub async fn load(&self, collection: &str) -> ClientResult<GenericResponse> {
        self.post_action(collection, "load").await
    }

    /// Unloads a collection from memory.
    pub async fn unload(&self, collection: &str) -> ClientResult<GenericResponse> {
        self.post_action(collection, "unload").await
    }

    /// Exports a collection as a file download.
    ///
    /// The returned stream holds the connection until drained or closed.
    pub async fn export(&self, collection: &str) -> ClientResult<ByteStream> {
        let path = format!("{BASE}/{}/export", segment(collection));
        self.transport.request_stream(ApiRequest::post(path)).await
    }

    /// Imports a collection from a previously exported file.
    pub async fn import(&self, file_path: impl AsRef<Path>) -> ClientResult<GenericResponse> {
        self.transport
            .upload_file(Method::POST, &format!("{BASE}/import"), file_path.as_ref())
            .await?;
        Ok(GenericResponse::ok("Import completed"))
    }

    /// Renames a collection.
    pub async fn rename(&self, old_name: &str, new_name: &str) -> ClientResult<GenericResponse> {
        let path = format!("{BASE}/{}/rename/{}", segment(old_name), segment(new_name));
        self.transport.request(ApiRequest::put(path)).await
    }

    /// Rebuilds a collection's index.
    pub async fn reindex(&self, collection: &str) -> ClientResult<GenericResponse> {
        let path = format!("{BASE}/{}/reindex", segment(collection));
        self.transport.request(ApiRequest::put(path)).await
    }

    /// Inserts one record.
    pub async fn insert_record(
        &self,
        request: &InsertRecordRequest,
    ) -> ClientResult<InsertRecordResponse> {
        self.transport
            .request(ApiRequest::post(format!("{BASE}/record")).json(request)?)
            .await
    }

    async fn post_action(&self, collection: &str, action: &str) -> ClientResult<GenericResponse> {
        let path = format!("{BASE}/{}/{action}", segment(collection));
        self.transport.request(ApiRequest::post(path)).await
    }
}

fn envelope_on_client_error(
    result: ClientResult<GenericResponse>,
) -> ClientResult<GenericResponse> {
    match result {
        Err(e @ ClientError::Api { status, .. }) if (400..500).contains(&status) => {
            match e.envelope() {
                Some(envelope) if !envelope.success => Ok(envelope),
                _ => Err(e),
            }
        }
        other => other,
    }
}
