//! Static operator page, health check and fallback.

use axum::{extract::State, http::StatusCode, response::Html, Json};
use serde::Serialize;

use super::{failure, ApiResponse};
use crate::core::QueueStats;
use crate::web::state::AppState;

const INDEX_HTML: &str = include_str!("../../../assets/index.html");

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    #[serde(flatten)]
    pub queue: QueueStats,
}

/// Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        queue: state.queue.stats(),
    })
}

pub async fn not_found() -> ApiResponse {
    failure(StatusCode::NOT_FOUND, "Not found")
}
