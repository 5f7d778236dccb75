//! Route definitions for web server.

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use super::api;
use super::state::AppState;

/// Largest accepted request body. Pasted screenshots arrive as data URIs.
pub const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Create the full app router.
pub fn create_app_router(state: AppState) -> Router {
    Router::new()
        // Operator page
        .route("/", get(api::index))
        .route("/index.html", get(api::index))

        // Submission and kill switch
        .route("/message", post(api::submit_message))
        .route("/kill", post(api::kill))

        .route("/health", get(api::health_check))
        .fallback(api::not_found)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
