//! HTTP route definitions and handlers.
//!
//! This module organizes all HTTP endpoints into logical groups:
//! movies, users, tokens and health checks.

mod health_routes;
mod movie_routes;
mod token_routes;
mod user_routes;

use std::time::Instant;

use axum::extract::{DefaultBodyLimit, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::Router;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::state::AppState;

pub use movie_routes::EXPECTED_VERSION;

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 1_048_576;

/// Creates the application router with all configured routes.
///
/// Combines all route modules into a single router and attaches
/// the application state for access in handlers.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(movie_routes::routes())
        .merge(user_routes::routes())
        .merge(token_routes::routes())
        .merge(health_routes::routes())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

/// One span per request, tagged with a fresh request id.
async fn log_requests(request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4();
    let span = info_span!(
        "request",
        %request_id,
        method = %request.method(),
        path = %request.uri().path(),
    );

    async move {
        let started = Instant::now();
        let response = next.run(request).await;
        info!(
            status = response.status().as_u16(),
            latency_ms = started.elapsed().as_millis() as u64,
            "Request completed."
        );
        response
    }
    .instrument(span)
    .await
}
