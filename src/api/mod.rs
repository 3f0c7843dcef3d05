// HTTP surface: WebSocket routes plus health and metrics.

pub mod ws;

use axum::{response::IntoResponse, routing::get, Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::controller::Controller;
use crate::metrics;
use crate::rate_limit::RateLimiter;
use crate::registry::ConnectionRegistry;

// ── Shared application state ─────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ConnectionRegistry>,
    pub controller: Arc<Controller>,
    pub rate_limiter: RateLimiter,
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "arena-backend" }))
}

async fn metrics_handler() -> impl IntoResponse {
    let body = metrics::gather_metrics();
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        body,
    )
}

// ── Router ────────────────────────────────────────────────────────────

pub fn router(
    registry: Arc<ConnectionRegistry>,
    controller: Arc<Controller>,
    rate_limiter: RateLimiter,
) -> Router {
    let state = AppState {
        registry,
        controller,
        rate_limiter,
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        // Bot-facing WebSocket
        .route("/ws", get(ws::ws_bot))
        // Spectator WebSocket
        .route("/spectate", get(ws::ws_spectate))
        .with_state(state)
}
