use axum::{Json, extract::State, response::IntoResponse};

use crate::AppState;
use crate::metrics;

/// Health check endpoint - returns server status
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.metrics.snapshot();

    Json(metrics::HealthStatus {
        status: "healthy".to_string(),
        rooms: state.registry.len().await,
        sessions: snapshot.sessions.active,
        uptime_secs: snapshot.uptime_secs,
    })
}

/// Liveness probe - returns 200 if the server is running
pub async fn health_live_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "alive" }))
}

/// Metrics endpoint - server counters plus the engine's room statistics
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(metrics::MetricsReport {
        server: state.metrics.snapshot(),
        hubs: state.registry.stats(),
    })
}
