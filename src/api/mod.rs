//! HTTP/JSON API Layer
//!
//! Provides REST-like endpoints following gRPC path conventions.
//! The web client calls these endpoints via JSON-over-HTTP transport.
//!
//! ## Architecture
//! ```text
//! Web Client (Next.js front end, JSON mode)
//!       ↓ HTTP POST, JSON body
//! Axum Router (port 50051)
//!       ↓
//! ProgressionService Handlers
//!       ↓
//! ProgressionEngine (catalog + ProgressionStore)
//! ```
//!
//! ## Endpoint Convention
//! All endpoints follow gRPC path pattern: `POST /cultivation.<Service>/<Method>`
//! Example: `POST /cultivation.ProgressionService/AwardXp`

pub mod progression;

use axum::{middleware, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::engine::ProgressionEngine;
use crate::metrics::ServerMetrics;

/// Shared state available to all API handlers
#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<ProgressionEngine>,
    /// Server-wide metrics (lock-free atomics)
    pub metrics: Arc<ServerMetrics>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Build the full API router with all service endpoints
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(crate::metrics::prometheus_handler))
        .route("/metrics/json", get(crate::metrics::json_metrics_handler))
        .merge(progression::routes())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            crate::metrics::metrics_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        // The study app's browser front end calls us cross-origin
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP API server on the given port (blocks until shutdown)
pub async fn start_api_server(
    engine: Arc<ProgressionEngine>,
    port: u16,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let metrics = ServerMetrics::new();
    let state = ApiState { engine, metrics };
    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("API server listening on {}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
