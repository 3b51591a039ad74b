//! WebSocket handler — live-dashboard subscriber.
//!
//! DESIGN
//! ======
//! On upgrade, the connection registers a bounded queue with the hub and
//! enters a `select!` loop:
//! - Hub payloads → forwarded to the client as text frames
//! - Client frames → only refresh liveness; their content is ignored
//! - Heartbeat tick → ping, or drop the client if it has gone quiet
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → register with the hub (which sends `initial_data`)
//! 2. Forward hub payloads until the client leaves, goes stale, or the hub
//!    drops our queue (slow consumer or shutdown)
//! 3. Unregister

use axum::body::Bytes;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::services::hub::{Payload, SUBSCRIBER_QUEUE_CAPACITY, Subscriber};
use crate::state::AppState;

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, state))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState) {
    let conn_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::channel::<Payload>(SUBSCRIBER_QUEUE_CAPACITY);
    state.hub.register(Subscriber { id: conn_id, tx }).await;
    info!(%conn_id, "ws: dashboard connected");

    let heartbeat = state.config.heartbeat;
    let mut ping = tokio::time::interval_at(Instant::now() + heartbeat.interval, heartbeat.interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                last_seen = Instant::now();
                if let Message::Close(_) = msg {
                    break;
                }
            }
            payload = rx.recv() => {
                let Some(payload) = payload else {
                    // Hub dropped this subscriber.
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                };
                if socket.send(Message::Text(payload.as_ref().into())).await.is_err() {
                    break;
                }
            }
            _ = ping.tick() => {
                if is_stale(last_seen, Instant::now(), heartbeat.timeout) {
                    warn!(%conn_id, "ws: heartbeat timed out");
                    break;
                }
                if socket.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
                debug!(%conn_id, "ws: ping");
            }
        }
    }

    state.hub.unregister(conn_id).await;
    info!(%conn_id, "ws: dashboard disconnected");
}

/// True once nothing has arrived from the client for longer than `timeout`.
fn is_stale(last_seen: Instant, now: Instant, timeout: Duration) -> bool {
    now.saturating_duration_since(last_seen) > timeout
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
