//! Kill switch endpoint.

use axum::extract::State;

use super::{success, ApiResponse};
use crate::web::state::AppState;

/// Acknowledge, then let process control tear the process down after its
/// delay. Pending messages and waiters are abandoned.
pub async fn kill(State(state): State<AppState>) -> ApiResponse {
    let stats = state.queue.stats();
    tracing::warn!(
        pending = stats.pending,
        waiters = stats.waiters,
        "Kill requested from web UI"
    );
    state.control.kill();
    success()
}
