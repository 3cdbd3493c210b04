//! # opencode-relay
//!
//! A LAN relay that lets a phone discover and talk to opencode dev servers
//! running on this host.
//!
//! This server provides:
//! - Liveness checking for the relay itself
//! - Port discovery by scanning the OS socket table for agent processes
//! - A transparent reverse proxy to any discovered agent by port
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐      ┌──────────────┐      ┌───────────────────┐
//! │  Mobile app  │─────▶│  Axum HTTP   │─────▶│  opencode agents  │
//! │  (LAN)       │      │  relay       │      │  localhost:<port> │
//! └──────────────┘      └──────┬───────┘      └───────────────────┘
//!                              │
//!                              ▼
//!                       ┌──────────────┐
//!                       │ PortScanner  │
//!                       │ (netstat)    │
//!                       └──────────────┘
//! ```
//!
//! ## API Endpoints
//!
//! - `GET /ping` - Relay health check
//! - `GET /ports` - Discover agent ports from the socket table
//! - `ANY /opencode/{port}` - Proxy to the agent's root
//! - `ANY /opencode/{port}/{*path}` - Proxy to a sub-path of the agent

mod config;
mod error;
mod proxy;
mod scanner;

use axum::{
    Router,
    extract::{DefaultBodyLimit, Request, State},
    http::Uri,
    middleware::{self, Next},
    response::{Json, Response},
    routing::{any, get},
};
use serde::Serialize;
use std::{collections::BTreeSet, net::SocketAddr, sync::Arc};
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::error::RelayError;
use crate::scanner::PortScanner;

// ============================================================================
// Application State
// ============================================================================

/// Shared state: the scanner configuration and the one upstream HTTP client.
/// Read-only after startup; the relay holds nothing across requests.
pub struct AppState {
    pub scanner: PortScanner,
    pub http: reqwest::Client,
}

// ============================================================================
// Health & Discovery Handlers
// ============================================================================

#[derive(Debug, Serialize)]
struct PingResponse {
    ok: bool,
}

/// `GET /ping` - liveness check. If this handler runs at all, the relay is
/// up; there is no failure path.
async fn ping() -> Json<PingResponse> {
    Json(PingResponse { ok: true })
}

#[derive(Debug, Serialize)]
struct PortsResponse {
    ports: BTreeSet<u16>,
}

/// `GET /ports` - scan the socket table for agent ports. Every call runs a
/// fresh scan; nothing is cached.
async fn ports(State(state): State<Arc<AppState>>) -> Result<Json<PortsResponse>, RelayError> {
    let ports = state.scanner.discover_ports().await?;
    Ok(Json(PortsResponse { ports }))
}

/// Fallback for unknown paths and for known paths hit with a method they
/// do not serve.
async fn route_not_found(uri: Uri) -> RelayError {
    tracing::warn!(path = uri.path(), "no route");
    RelayError::RouteNotFound
}

// ============================================================================
// Request Logging Middleware
// ============================================================================

/// Log every request before dispatch and the resulting status after.
async fn log_request(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    tracing::info!(%method, path, "request");
    let response = next.run(req).await;
    tracing::info!(%method, path, status = response.status().as_u16(), "response");
    response
}

// ============================================================================
// Router & Startup
// ============================================================================

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/ports", get(ports))
        .route("/opencode/{port}", any(proxy::proxy_root))
        .route("/opencode/{port}/{*path}", any(proxy::proxy_path))
        .fallback(route_not_found)
        .method_not_allowed_fallback(route_not_found)
        // Bodies buffer in full; axum's built-in 2MB cap would turn large
        // agent payloads into bare 413s outside the JSON error contract.
        .layer(DefaultBodyLimit::disable())
        .layer(CorsLayer::permissive())
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("opencode_relay=info".parse().unwrap())
                .add_directive("tower_http=info".parse().unwrap()),
        )
        .init();

    let config = Config::from_env();

    let http = reqwest::Client::builder()
        .timeout(config.proxy_timeout)
        .build()
        .unwrap();
    let scanner = PortScanner::new(
        scanner::native_format(),
        config.process_name.clone(),
        config.scan_timeout,
    );

    let state = Arc::new(AppState { scanner, http });
    let app = build_router(state);

    let addr = SocketAddr::new(config.bind, config.port);
    tracing::info!(
        "opencode-relay v{} listening on {}",
        env!("CARGO_PKG_VERSION"),
        addr
    );
    tracing::info!("GET /ping - health check");
    tracing::info!("GET /ports - discover {} ports", config.process_name);
    tracing::info!("ANY /opencode/{{port}} - proxy to localhost:{{port}}/");
    tracing::info!("ANY /opencode/{{port}}/{{path}} - proxy to localhost:{{port}}/{{path}}");

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

// ============================================================================
// End-to-end tests: real listeners, real scans, stub agents
// ============================================================================
