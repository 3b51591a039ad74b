//! Slack Socket Mode loop.
//!
//! DESIGN
//! ======
//! One long-lived task owns the connection:
//! 1. `apps.connections.open` → fresh `wss://` URL
//! 2. connect with `tokio-tungstenite`
//! 3. for each text frame: parse envelope, ack by `envelope_id`, route
//! 4. on `disconnect` reconnect immediately; on errors back off 1s → 30s
//!
//! Acks are sent before routing so Slack never redelivers an envelope we
//! already accepted. Status changes go to the dispatcher with presence left
//! unknown; the tracker asks the directory for presence inside the person's
//! worker, which keeps one person's events in order.
//!
//! Envelope parsing is pure (`parse_envelope`) and unit tested.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::client::SlackClient;
use super::{SlackError, SlackUser};
use crate::services::dispatch::EventDispatcher;
use crate::services::presence::{Presence, StatusEvent};

const MIN_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

// =============================================================================
// ENVELOPES
// =============================================================================

/// What one Socket Mode frame asks us to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Hello,
    /// Server is rotating the connection.
    Disconnect(String),
    StatusChanged(StatusEvent),
    /// Anything else; carries a description for logging.
    Ignored(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Present on every envelope that must be acknowledged.
    pub envelope_id: Option<String>,
    pub inbound: Inbound,
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    envelope_id: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    payload: Option<RawPayload>,
}

#[derive(Deserialize)]
struct RawPayload {
    #[serde(default)]
    event: Option<RawEvent>,
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    user: Option<SlackUser>,
}

/// Decode one Socket Mode text frame.
///
/// # Errors
///
/// Returns an error if the frame is not a JSON envelope.
pub fn parse_envelope(text: &str) -> Result<Envelope, SlackError> {
    let raw: RawEnvelope = serde_json::from_str(text)?;
    let inbound = match raw.kind.as_str() {
        "hello" => Inbound::Hello,
        "disconnect" => Inbound::Disconnect(raw.reason.unwrap_or_default()),
        "events_api" => match raw.payload.and_then(|p| p.event) {
            Some(RawEvent { kind, user: Some(user) }) if kind == "user_status_changed" => {
                Inbound::StatusChanged(StatusEvent {
                    external_user_id: user.id,
                    emoji: user.profile.status_emoji,
                    text: user.profile.status_text,
                    presence: Presence::Unknown,
                    profile: None,
                })
            }
            Some(event) => Inbound::Ignored(format!("event {}", event.kind)),
            None => Inbound::Ignored("events_api without event".into()),
        },
        other => Inbound::Ignored(other.to_string()),
    };
    Ok(Envelope { envelope_id: raw.envelope_id, inbound })
}

/// Acknowledgement frame for an envelope.
#[must_use]
pub fn ack_payload(envelope_id: &str) -> String {
    serde_json::json!({ "envelope_id": envelope_id }).to_string()
}

/// Next reconnect delay after a failure.
#[must_use]
pub fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(MAX_BACKOFF)
}

// =============================================================================
// LOOP
// =============================================================================

enum SessionEnd {
    Shutdown,
    Reconnect,
}

/// Spawn the Socket Mode task. It runs until `shutdown` flips.
#[must_use]
pub fn spawn_socket_mode(
    client: Arc<SlackClient>,
    dispatcher: EventDispatcher,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut backoff = MIN_BACKOFF;
        loop {
            if *shutdown.borrow() {
                break;
            }
            match run_session(&client, &dispatcher, &mut shutdown).await {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::Reconnect) => {
                    backoff = MIN_BACKOFF;
                    info!("slack: reconnecting");
                }
                Err(e) => {
                    warn!(error = %e, backoff_secs = backoff.as_secs(), "slack: socket session failed");
                    tokio::select! {
                        () = tokio::time::sleep(backoff) => {}
                        _ = shutdown.changed() => break,
                    }
                    backoff = next_backoff(backoff);
                }
            }
        }
        info!("slack: socket mode stopped");
    })
}

async fn run_session(
    client: &SlackClient,
    dispatcher: &EventDispatcher,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<SessionEnd, SlackError> {
    let url = client.open_socket_url().await?;
    let (stream, _) = connect_async(url.as_str())
        .await
        .map_err(|e| SlackError::Socket(e.to_string()))?;
    let (mut sink, mut stream) = stream.split();
    info!("slack: socket connected");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                let _ = sink.send(Message::Close(None)).await;
                return Ok(SessionEnd::Shutdown);
            }
            msg = stream.next() => {
                let Some(msg) = msg else {
                    return Err(SlackError::Socket("stream ended".into()));
                };
                let text = match msg.map_err(|e| SlackError::Socket(e.to_string()))? {
                    Message::Text(text) => text,
                    Message::Close(frame) => {
                        return Err(SlackError::Socket(format!("closed by server: {frame:?}")));
                    }
                    _ => continue,
                };

                let envelope = match parse_envelope(&text) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        warn!(error = %e, "slack: unparseable envelope");
                        continue;
                    }
                };
                if let Some(id) = &envelope.envelope_id {
                    sink.send(Message::Text(ack_payload(id).into()))
                        .await
                        .map_err(|e| SlackError::Socket(e.to_string()))?;
                }

                match envelope.inbound {
                    Inbound::Hello => info!("slack: socket mode ready"),
                    Inbound::Disconnect(reason) => {
                        info!(reason, "slack: server requested disconnect");
                        return Ok(SessionEnd::Reconnect);
                    }
                    Inbound::StatusChanged(event) => {
                        debug!(user = %event.external_user_id, text = %event.text, emoji = %event.emoji, "slack: status changed");
                        dispatcher.on_status_event(event);
                    }
                    Inbound::Ignored(what) => debug!(what, "slack: envelope ignored"),
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "socket_test.rs"]
mod tests;
