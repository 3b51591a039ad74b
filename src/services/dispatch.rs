//! Event dispatcher — per-person sequential queues in front of the tracker.
//!
//! DESIGN
//! ======
//! Each person with pending events gets one worker task fed by an unbounded
//! channel. Events for the same person are handled strictly in arrival order;
//! different people proceed in parallel.
//!
//! A worker retires after `idle` without events. Retirement re-checks its
//! queue while holding the map lock, and senders only enqueue under that same
//! lock, so an event can never land in a queue whose worker is gone.
//!
//! The map lock is a `std::sync::Mutex` held only for map bookkeeping, never
//! across an await.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::services::presence::{PresenceTracker, StatusEvent};

pub const DEFAULT_IDLE: Duration = Duration::from_secs(60);

type Queues = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<StatusEvent>>>>;

#[derive(Clone)]
pub struct EventDispatcher {
    tracker: Arc<PresenceTracker>,
    queues: Queues,
    idle: Duration,
}

impl EventDispatcher {
    #[must_use]
    pub fn new(tracker: PresenceTracker, idle: Duration) -> Self {
        Self { tracker: Arc::new(tracker), queues: Arc::new(Mutex::new(HashMap::new())), idle }
    }

    #[must_use]
    pub fn tracker(&self) -> &PresenceTracker {
        &self.tracker
    }

    /// Queue an event behind any earlier events for the same person.
    ///
    /// Returns `false` when the event is malformed and was dropped.
    pub fn on_status_event(&self, event: StatusEvent) -> bool {
        let user = event.external_user_id.trim().to_string();
        if user.is_empty() {
            warn!("dispatch: event without user id; dropping");
            return false;
        }

        let mut queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        let mut event = event;
        if let Some(tx) = queues.get(&user) {
            match tx.send(event) {
                Ok(()) => return true,
                // Worker exited without retiring (panicked handler). Replace it.
                Err(mpsc::error::SendError(returned)) => {
                    warn!(user, "dispatch: worker gone; respawning");
                    event = returned;
                    queues.remove(&user);
                }
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        if tx.send(event).is_err() {
            return false;
        }
        queues.insert(user.clone(), tx);
        drop(queues);

        debug!(user, "dispatch: worker started");
        tokio::spawn(run_worker(user, rx, self.tracker.clone(), self.queues.clone(), self.idle));
        true
    }

    /// Number of people with a live worker.
    #[cfg(test)]
    #[must_use]
    pub fn active_workers(&self) -> usize {
        self.queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

async fn run_worker(
    user: String,
    mut rx: mpsc::UnboundedReceiver<StatusEvent>,
    tracker: Arc<PresenceTracker>,
    queues: Queues,
    idle: Duration,
) {
    loop {
        match tokio::time::timeout(idle, rx.recv()).await {
            Ok(Some(event)) => {
                let outcome = tracker.handle(&event).await;
                debug!(user, ?outcome, "dispatch: event handled");
            }
            Ok(None) => break,
            Err(_) => {
                let mut queues = queues.lock().unwrap_or_else(PoisonError::into_inner);
                if rx.is_empty() {
                    queues.remove(&user);
                    break;
                }
            }
        }
    }
    debug!(user, "dispatch: worker retired");
}

#[cfg(test)]
#[path = "dispatch_test.rs"]
mod tests;
