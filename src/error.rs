//! Error types for the relay server.
//!
//! Every failure a client can observe maps to one `RelayError` variant and
//! is served as a JSON body of the form `{"error": "...", "details": "..."}`
//! with the matching status code. The `error` strings are part of the wire
//! contract; clients match on them.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Relay error type.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The socket-listing command could not be spawned or exited non-zero.
    #[error("Failed to execute command: {0}")]
    ScanFailed(String),

    /// The socket-listing command did not finish within the scan deadline.
    #[error("Scan timed out: {0}")]
    ScanTimeout(String),

    /// The port path parameter did not parse as a port number.
    #[error("Invalid port number")]
    InvalidPort,

    /// The upstream agent could not be reached or the call failed in transit.
    #[error("Proxy request failed: {0}")]
    Upstream(String),

    /// No route matched the request.
    #[error("Route not found")]
    RouteNotFound,
}

impl RelayError {
    /// Get the HTTP status code for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::ScanFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ScanTimeout(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidPort => StatusCode::BAD_REQUEST,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::RouteNotFound => StatusCode::NOT_FOUND,
        }
    }

    /// Client-visible error string (the `error` field of the JSON body).
    pub fn message(&self) -> &'static str {
        match self {
            Self::ScanFailed(_) => "Failed to execute command",
            Self::ScanTimeout(_) => "Scan timed out",
            Self::InvalidPort => "Invalid port number",
            Self::Upstream(_) => "Proxy request failed",
            Self::RouteNotFound => "Route not found",
        }
    }

    fn details(&self) -> Option<&str> {
        match self {
            Self::ScanFailed(details) | Self::ScanTimeout(details) | Self::Upstream(details) => {
                Some(details)
            }
            Self::InvalidPort | Self::RouteNotFound => None,
        }
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message(),
            details: self.details().map(str::to_string),
        };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            RelayError::ScanFailed("netstat: no".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            RelayError::ScanTimeout("5s elapsed".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(RelayError::InvalidPort.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            RelayError::Upstream("connection refused".into()).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(RelayError::RouteNotFound.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_client_visible_strings() {
        assert_eq!(RelayError::InvalidPort.message(), "Invalid port number");
        assert_eq!(RelayError::RouteNotFound.message(), "Route not found");
        assert_eq!(
            RelayError::ScanFailed(String::new()).message(),
            "Failed to execute command"
        );
        assert_eq!(
            RelayError::Upstream(String::new()).message(),
            "Proxy request failed"
        );
    }

    #[tokio::test]
    async fn test_body_shape() {
        let response = RelayError::Upstream("connection refused".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Proxy request failed");
        assert_eq!(body["details"], "connection refused");

        // Variants without details omit the field entirely.
        let response = RelayError::RouteNotFound.into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Route not found");
        assert!(body.get("details").is_none());
    }
}
