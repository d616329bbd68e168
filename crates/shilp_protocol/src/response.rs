//! Common response envelopes.

use serde::{Deserialize, Serialize};

/// Generic `{success, message}` response returned by mutating endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericResponse {
    /// Whether the server applied the request.
    #[serde(default)]
    pub success: bool,
    /// Human-readable status message.
    #[serde(default)]
    pub message: String,
}

impl GenericResponse {
    /// Creates a successful response with the given message.
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    /// Creates a failed response with the given message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Response of `GET /health`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Liveness flag.
    #[serde(default)]
    pub success: bool,
    /// Server build version.
    #[serde(default)]
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generic_response_defaults_missing_fields() {
        let resp: GenericResponse = serde_json::from_str("{}").unwrap();
        assert!(!resp.success);
        assert!(resp.message.is_empty());

        let resp: GenericResponse =
            serde_json::from_str(r#"{"success":false,"message":"collection not found"}"#).unwrap();
        assert_eq!(resp, GenericResponse::failed("collection not found"));
    }

    #[test]
    fn health_response() {
        let resp: HealthResponse =
            serde_json::from_str(r#"{"success":true,"version":"1.4.2"}"#).unwrap();
        assert!(resp.success);
        assert_eq!(resp.version, "1.4.2");
    }
}
