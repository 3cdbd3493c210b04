//! # Reverse Proxy Dispatcher
//!
//! Forwards arbitrary HTTP requests to an agent on `localhost:<port>` and
//! relays the response nearly verbatim.
//!
//! ## Forwarding rules
//!
//! - Target is `http://localhost:<port>/<path>` plus the original query
//!   string; the root route lands on the agent's `/`.
//! - Request headers are copied minus `host` and `connection`; the framing
//!   pair (`content-length`, `transfer-encoding`) is recomputed for the new
//!   hop by the client.
//! - Bodies ride only on POST/PUT/PATCH/DELETE. Declared JSON is parsed and
//!   reserialized, declared text passes through as UTF-8, anything else as
//!   raw bytes.
//! - Response headers are copied minus `connection`, `content-encoding`,
//!   `transfer-encoding` (the body arrives here already decoded) and
//!   `content-length` (recomputed from the relayed bytes).
//! - The upstream status code is relayed verbatim.

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, Method, Uri};
use axum::response::Response;
use tracing::{debug, info, warn};

use crate::AppState;
use crate::error::RelayError;

/// Request headers never copied upstream.
const REQUEST_SKIP: [&str; 4] = ["host", "connection", "content-length", "transfer-encoding"];

/// Response headers never copied back.
const RESPONSE_SKIP: [&str; 4] = [
    "connection",
    "content-encoding",
    "transfer-encoding",
    "content-length",
];

/// Methods whose bodies are forwarded.
const BODY_METHODS: [Method; 4] = [Method::POST, Method::PUT, Method::PATCH, Method::DELETE];

/// `ANY /opencode/{port}` - proxy to the agent's root path.
pub async fn proxy_root(
    State(state): State<Arc<AppState>>,
    Path(port): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, RelayError> {
    forward(&state, &port, "", &method, &uri, &headers, body).await
}

/// `ANY /opencode/{port}/{*path}` - proxy to a sub-path of the agent.
pub async fn proxy_path(
    State(state): State<Arc<AppState>>,
    Path((port, path)): Path<(String, String)>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, RelayError> {
    forward(&state, &port, &path, &method, &uri, &headers, body).await
}

async fn forward(
    state: &AppState,
    port_param: &str,
    path: &str,
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Response, RelayError> {
    info!(%method, port = port_param, path, "proxy request");

    let port: u16 = port_param.parse().map_err(|_| {
        warn!(port = port_param, "invalid proxy port");
        RelayError::InvalidPort
    })?;

    let target = upstream_url(port, path, uri.query());
    debug!(url = %target, "forwarding upstream");

    let outbound_body = request_body(method, headers, body);
    let mut request = state
        .http
        .request(method.clone(), target.as_str())
        .headers(forward_headers(headers, &REQUEST_SKIP));
    if let Some(bytes) = outbound_body {
        request = request.body(bytes);
    }

    let upstream = request.send().await.map_err(|e| {
        warn!(url = %target, error = %e, "proxy request failed");
        RelayError::Upstream(e.to_string())
    })?;

    let status = upstream.status();
    let relayed_headers = forward_headers(upstream.headers(), &RESPONSE_SKIP);
    let bytes = upstream.bytes().await.map_err(|e| {
        warn!(url = %target, error = %e, "upstream body read failed");
        RelayError::Upstream(e.to_string())
    })?;
    info!(%status, bytes = bytes.len(), "upstream response");

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    *response.headers_mut() = relayed_headers;
    Ok(response)
}

/// Build the upstream URL. An empty path still carries the trailing slash,
/// so `/opencode/4096` lands on the agent's `/`.
fn upstream_url(port: u16, path: &str, query: Option<&str>) -> String {
    match query {
        Some(query) => format!("http://localhost:{}/{}?{}", port, path, query),
        None => format!("http://localhost:{}/{}", port, path),
    }
}

/// Copy a header map minus the given skip list. Multi-valued headers keep
/// all their values.
fn forward_headers(headers: &HeaderMap, skip: &[&str]) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if !skip.contains(&name.as_str()) {
            out.append(name, value.clone());
        }
    }
    out
}

/// Decide what body, if any, goes upstream.
///
/// A declared JSON body is parsed and reserialized so the upstream always
/// sees one canonical encoding; bytes that fail to parse pass through
/// untouched and the upstream owns validation. Declared text passes through
/// as UTF-8, lossily repaired when it is not valid UTF-8.
fn request_body(method: &Method, headers: &HeaderMap, body: Bytes) -> Option<Bytes> {
    if !BODY_METHODS.contains(method) {
        return None;
    }

    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    if content_type.contains("application/json") {
        match serde_json::from_slice::<serde_json::Value>(&body) {
            Ok(value) => Some(serde_json::to_vec(&value).map(Bytes::from).unwrap_or(body)),
            Err(_) => Some(body),
        }
    } else if content_type.contains("text/") {
        match std::str::from_utf8(&body) {
            Ok(_) => Some(body),
            Err(_) => Some(Bytes::from(String::from_utf8_lossy(&body).into_owned())),
        }
    } else {
        Some(body)
    }
}
