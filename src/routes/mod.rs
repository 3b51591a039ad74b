//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! One Axum router serves the dashboard websocket, the read-only dashboard
//! API, and the status-event intake used by non-Slack senders. Every route
//! shares `AppState`.

pub mod events;
pub mod people;
pub mod ws;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Full application router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/ws", get(ws::handle_ws))
        .route("/api/users", get(people::list_users))
        .route("/api/users/{id}/entries", get(people::list_entries))
        .route("/api/analytics", get(people::analytics))
        .route("/api/reports/weekly", get(people::weekly_reports))
        .route("/api/events/status", post(events::post_status))
        .route("/healthz", get(healthz))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
