//! Inbound API surface
//!
//! The webhook transport and signature verification live upstream; what
//! arrives here is already normalized.

use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

pub mod handlers;

pub use handlers::{ApiError, AppState};

/// Build the application router
pub fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/api/v1/assistant/query", post(handlers::handle_query))
        .route("/api/v1/events", post(handlers::handle_event))
        .route("/api/v1/instructions", post(handlers::create_instruction))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
