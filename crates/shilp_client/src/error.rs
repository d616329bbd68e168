//! Error types for the Shilp client.

use shilp_protocol::{GenericResponse, Lsn, ProtocolError};
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur while talking to a Shilp server.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Connection failure or timeout. Never retried by the transport.
    #[error("request failed: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the request timed out.
        timeout: bool,
    },

    /// The server answered with a non-success status.
    #[error("API error: {body} (status: {status})")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// The response body was not the JSON that was expected.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// A local precondition failed; no request was sent.
    #[error("invalid argument: {0}")]
    Validation(String),

    /// A heartbeat tried to move a replica's watermark backwards.
    #[error(
        "lsn regression for replica {replica_id} on collection {collection:?}: \
         {attempted} is below last reported {last}"
    )]
    LsnRegression {
        /// Collection the watermark belongs to.
        collection: String,
        /// Replica ID.
        replica_id: String,
        /// Highest LSN already reported.
        last: Lsn,
        /// LSN the caller tried to report.
        attempted: Lsn,
    },

    /// The server's response broke the oplog contract.
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolError),

    /// The server answered `success: false`.
    #[error("server rejected request: {0}")]
    Rejected(String),

    /// A replica applier failed to apply entries.
    #[error("apply failed: {0}")]
    Apply(String),

    /// Invalid replica state transition.
    #[error("invalid state transition from {from} to {to}")]
    InvalidState {
        /// Current state.
        from: String,
        /// Attempted operation.
        to: String,
    },

    /// The request or stream was cancelled by the caller.
    #[error("request cancelled")]
    Cancelled,

    /// Local file error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Creates a transport error that is not a timeout.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            timeout: false,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            timeout: true,
        }
    }

    /// Returns the HTTP status for API errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns true for connection failures and timeouts.
    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Transport { .. })
    }

    /// Returns true for errors raised before any request was sent.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ClientError::Validation(_) | ClientError::LsnRegression { .. }
        )
    }

    /// Returns true if a caller-side retry may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Transport { .. } => true,
            ClientError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Parses the body of an API error as the standard response envelope.
    ///
    /// Servers usually report failures as `{success: false, message}` even
    /// on error statuses.
    pub fn envelope(&self) -> Option<GenericResponse> {
        match self {
            ClientError::Api { body, .. } => serde_json::from_str(body).ok(),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() {
            ClientError::Validation(e.to_string())
        } else if e.is_timeout() {
            ClientError::timeout(e.to_string())
        } else {
            ClientError::transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Decode(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(ClientError::transport("connection refused").is_retryable());
        assert!(ClientError::timeout("Request timeout").is_retryable());
        assert!(ClientError::Api {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(!ClientError::Api {
            status: 404,
            body: String::new()
        }
        .is_retryable());
        assert!(!ClientError::Validation("path cannot be empty".into()).is_retryable());
        assert!(!ClientError::Cancelled.is_retryable());
    }

    #[test]
    fn api_error_display_carries_body_and_status() {
        let err = ClientError::Api {
            status: 500,
            body: "internal error".into(),
        };
        assert_eq!(err.to_string(), "API error: internal error (status: 500)");
        assert_eq!(err.status(), Some(500));
        assert!(err.envelope().is_none());
    }

    #[test]
    fn envelope_from_json_body() {
        let err = ClientError::Api {
            status: 404,
            body: r#"{"success":false,"message":"collection not found"}"#.into(),
        };
        let envelope = err.envelope().unwrap();
        assert!(!envelope.success);
        assert_eq!(envelope.message, "collection not found");
    }

    #[test]
    fn regression_is_validation() {
        let err = ClientError::LsnRegression {
            collection: "docs".into(),
            replica_id: "r1".into(),
            last: 10,
            attempted: 4,
        };
        assert!(err.is_validation());
        assert!(err.to_string().contains("10"));
    }
}
