//! Status-event intake for senders other than the Slack socket.
//!
//! Events are queued on the dispatcher exactly like Socket Mode events, so
//! the response only means "accepted", never "applied".

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;

use crate::services::presence::StatusEvent;
use crate::state::AppState;

/// `POST /api/events/status`
///
/// # Errors
///
/// Returns `400` when the event has no user ID.
pub async fn post_status(State(state): State<AppState>, Json(event): Json<StatusEvent>) -> Result<StatusCode, StatusCode> {
    if state.dispatcher.on_status_event(event) {
        Ok(StatusCode::ACCEPTED)
    } else {
        Err(StatusCode::BAD_REQUEST)
    }
}

#[cfg(test)]
#[path = "events_test.rs"]
mod tests;
