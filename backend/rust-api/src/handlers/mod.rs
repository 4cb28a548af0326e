use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;

use crate::metrics;
use crate::services::AppState;

pub mod learners;

pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let source = state.facade.source();

    let (status_code, status, dependency) = match source.ping().await {
        Ok(()) => (
            StatusCode::OK,
            "healthy",
            json!({ "status": "healthy", "message": "Attempt source reachable" }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "degraded",
            json!({ "status": "unhealthy", "error": e.to_string() }),
        ),
    };

    let mut dependencies = serde_json::Map::new();
    dependencies.insert(source.name().to_string(), dependency);

    (
        status_code,
        Json(json!({
            "status": status,
            "service": "progress-metrics-api",
            "version": env!("CARGO_PKG_VERSION"),
            "dependencies": dependencies
        })),
    )
}

pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::render_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to render metrics: {}", e),
        ),
    }
}
