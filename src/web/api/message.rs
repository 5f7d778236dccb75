//! Submission endpoint: normalize the operator's payload and hand it to the queue.

use axum::{body::Bytes, extract::State, http::StatusCode};
use serde::Deserialize;
use serde_json::Value;

use super::{failure, success, ApiResponse};
use crate::core::{Delivery, Message};
use crate::web::state::AppState;

/// Body of `POST /message`.
#[derive(Deserialize, Debug, Default)]
pub struct SubmitRequest {
    /// Text typed by the operator. Missing or null means empty.
    #[serde(default)]
    pub content: Option<String>,
    /// Encoded image, usually a data URI, passed through untouched.
    #[serde(default)]
    pub image: Option<String>,
}

impl SubmitRequest {
    pub fn into_message(self) -> Message {
        Message::compose(
            self.content.as_deref().unwrap_or_default(),
            self.image.as_deref(),
        )
    }
}

/// Only a JSON object is a submission. Serde would otherwise map an array
/// onto the fields in order.
fn parse_request(body: &[u8]) -> Result<SubmitRequest, String> {
    let value: Value = serde_json::from_slice(body).map_err(|e| e.to_string())?;
    if !value.is_object() {
        return Err("request body must be a JSON object".to_string());
    }
    serde_json::from_value(value).map_err(|e| e.to_string())
}

/// Accept a message. The body is parsed as JSON whatever the content type.
pub async fn submit_message(State(state): State<AppState>, body: Bytes) -> ApiResponse {
    let request = match parse_request(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!("Rejected malformed submission: {}", e);
            return failure(StatusCode::BAD_REQUEST, e);
        }
    };

    let message = request.into_message();
    let bytes = message.len();
    let has_image = message.has_image();

    match state.queue.submit(message) {
        Ok(Delivery::HandedOff { waiter }) => {
            tracing::info!(bytes, has_image, waiter, "Message delivered to waiting agent");
            success()
        }
        Ok(Delivery::Queued { depth }) => {
            tracing::info!(bytes, has_image, depth, "Message queued");
            success()
        }
        Err(e) => {
            tracing::warn!("Submission refused: {}", e);
            failure(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
    }
}
