//! API endpoints module.

pub mod control;
pub mod message;
pub mod ui;

use axum::{http::StatusCode, Json};
use serde_json::{json, Value};

pub use control::kill;
pub use message::{submit_message, SubmitRequest};
pub use ui::{health_check, index, not_found};

/// Status plus JSON body, the shape every endpoint answers with.
pub type ApiResponse = (StatusCode, Json<Value>);

pub fn success() -> ApiResponse {
    (StatusCode::OK, Json(json!({ "success": true })))
}

pub fn failure(status: StatusCode, error: impl Into<String>) -> ApiResponse {
    (status, Json(json!({ "error": error.into() })))
}
