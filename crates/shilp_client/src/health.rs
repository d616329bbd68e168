//! Liveness endpoint.

use crate::error::ClientResult;
use crate::transport::{ApiRequest, Transport};
use shilp_protocol::HealthResponse;

/// Health endpoint, borrowed from a [`ShilpClient`](crate::ShilpClient).
#[derive(Debug, Clone, Copy)]
pub struct HealthApi<'a> {
    transport: &'a Transport,
}

impl<'a> HealthApi<'a> {
    pub(crate) fn new(transport: &'a Transport) -> Self {
        Self { transport }
    }

    /// `GET /health`: liveness and server version.
    pub async fn check(&self) -> ClientResult<HealthResponse> {
        self.transport.request(ApiRequest::get("/health")).await
    }
}
