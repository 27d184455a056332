//! Health check endpoints.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use crate::state::AppState;

/// Registers health check routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/healthcheck", get(health_check))
}

/// Reports that the service is up, with its environment and version.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "available",
        "environment": state.config.environment,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
