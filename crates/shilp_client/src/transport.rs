//! HTTP transport shared by every endpoint group.
//!
//! One [`Transport`] owns a base URL, a pooled `reqwest::Client` and the
//! request timeout. It performs exactly one exchange per call and never
//! retries; retry policy belongs to the caller.

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::stream::ByteStream;
use reqwest::header::{HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::borrow::Cow;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

const JSON: &str = "application/json";

/// A request relative to the transport's base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Vec<u8>>,
}

impl ApiRequest {
    /// Creates a request.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    /// `GET path`
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// `POST path`
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// `PUT path`
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    /// `DELETE path`
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Appends a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Sets a JSON body.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> ClientResult<Self> {
        let bytes = serde_json::to_vec(body)
            .map_err(|e| ClientError::Validation(format!("failed to encode request body: {e}")))?;
        self.body = Some(bytes);
        Ok(self)
    }

    /// Returns the method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the relative path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the query parameters in insertion order.
    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.query
    }
}

/// Percent-encodes one path segment.
pub fn segment(value: &str) -> Cow<'_, str> {
    urlencoding::encode(value)
}

/// HTTP transport bound to one server.
#[derive(Clone)]
pub struct Transport {
    base_url: String,
    http: reqwest::Client,
    timeout: Duration,
}

impl Transport {
    /// Creates a transport from configuration.
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let http = match &config.http_client {
            Some(client) => client.clone(),
            None => {
                let mut builder = reqwest::Client::builder().user_agent(config.user_agent.clone());
                if let Some(timeout) = config.connect_timeout {
                    builder = builder.connect_timeout(timeout);
                }
                if let Some(idle) = config.pool_idle_timeout {
                    builder = builder.pool_idle_timeout(idle);
                }
                builder.build().map_err(|e| {
                    ClientError::Validation(format!("failed to create HTTP client: {e}"))
                })?
            }
        };

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
            timeout: config.timeout,
        })
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sends a request and decodes the JSON response.
    ///
    /// An empty body decodes as `{}`.
    pub async fn request<T: DeserializeOwned>(&self, request: ApiRequest) -> ClientResult<T> {
        let builder = self.builder(&request).timeout(self.timeout);
        let response = self.execute(&request, builder).await?;
        let bytes = response.bytes().await.map_err(|e| {
            warn!(path = %request.path, error = %e, "failed to read response body");
            ClientError::from(e)
        })?;
        decode(&bytes)
    }

    /// Uploads a local file as multipart form data (field `file`).
    pub async fn upload_file(
        &self,
        method: Method,
        path: &str,
        file_path: &Path,
    ) -> ClientResult<()> {
        let file = tokio::fs::File::open(file_path).await?;
        let len = file.metadata().await?.len();
        let file_name = file_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        let part = Part::stream_with_length(Body::from(file), len).file_name(file_name);
        let form = Form::new().part("file", part);

        let request = ApiRequest::new(method, path);
        let builder = self
            .http
            .request(request.method.clone(), self.url(&request.path))
            .header(ACCEPT, HeaderValue::from_static(JSON))
            .multipart(form)
            .timeout(self.timeout);

        debug!(path = %path, bytes = len, "uploading file");
        self.execute(&request, builder).await?;
        Ok(())
    }

    /// Sends a request and returns the live response body.
    ///
    /// The timeout covers the exchange up to the response headers; the body
    /// is read for as long as the caller keeps pulling.
    pub async fn request_stream(&self, request: ApiRequest) -> ClientResult<ByteStream> {
        let builder = self.builder(&request);
        let response = tokio::time::timeout(self.timeout, self.execute(&request, builder))
            .await
            .map_err(|_| {
                warn!(path = %request.path, "stream request timed out");
                ClientError::timeout(format!("no response within {:?}", self.timeout))
            })??;
        Ok(ByteStream::from_response(response))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn builder(&self, request: &ApiRequest) -> RequestBuilder {
        let mut builder = self
            .http
            .request(request.method.clone(), self.url(&request.path))
            .header(ACCEPT, HeaderValue::from_static(JSON))
            .header(CONTENT_TYPE, HeaderValue::from_static(JSON));
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        builder
    }

    async fn execute(&self, request: &ApiRequest, builder: RequestBuilder) -> ClientResult<Response> {
        debug!(method = %request.method, path = %request.path, "sending request");

        let response = builder.send().await.map_err(|e| {
            warn!(method = %request.method, path = %request.path, error = %e, "request failed");
            ClientError::from(e)
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let bytes = response.bytes().await?;
        let body = String::from_utf8_lossy(&bytes).into_owned();
        warn!(
            method = %request.method,
            path = %request.path,
            status = status.as_u16(),
            "server returned error status"
        );
        Err(ClientError::Api {
            status: status.as_u16(),
            body,
        })
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> ClientResult<T> {
    let bytes: &[u8] = if bytes.iter().all(u8::is_ascii_whitespace) {
        b"{}"
    } else {
        bytes
    };
    Ok(serde_json::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shilp_protocol::{GenericResponse, HealthResponse};

    #[test]
    fn empty_body_decodes_as_empty_object() {
        let resp: GenericResponse = decode(b"").unwrap();
        assert!(!resp.success);
        assert!(resp.message.is_empty());

        let resp: HealthResponse = decode(b"  \n").unwrap();
        assert!(resp.version.is_empty());
    }

    #[test]
    fn invalid_json_is_decode_error() {
        let err = decode::<GenericResponse>(b"<html>").unwrap_err();
        assert!(matches!(err, ClientError::Decode(_)));
    }

    #[test]
    fn segments_are_encoded() {
        assert_eq!(segment("my docs/v1"), "my%20docs%2Fv1");
        assert_eq!(segment("plain"), "plain");
    }

    #[test]
    fn request_builder() {
        let req = ApiRequest::get("/api/oplog/v1/")
            .query("after_lsn", 10)
            .query("limit", 5);
        assert_eq!(req.method(), &Method::GET);
        assert_eq!(req.path(), "/api/oplog/v1/");
        assert_eq!(
            req.query_pairs(),
            &[
                ("after_lsn".to_string(), "10".to_string()),
                ("limit".to_string(), "5".to_string())
            ]
        );
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let transport = Transport::new(&ClientConfig::new("http://localhost:3000/")).unwrap();
        assert_eq!(transport.base_url(), "http://localhost:3000");
        assert_eq!(transport.url("/health"), "http://localhost:3000/health");
    }
}
