//! Fan-out hub — owns live dashboard subscribers and broadcasts to them.
//!
//! DESIGN
//! ======
//! One run loop (`HubLoop`) owns the subscriber map. Everything else talks to
//! it through a cloneable `Hub` handle over two channels:
//! - a command channel for register / unregister / shutdown
//! - a bounded broadcast queue of pre-encoded payloads
//!
//! The loop is the only writer to the subscriber map, so no lock guards it.
//! Commands are polled first (`biased`) so a fresh subscriber is in the map
//! before any payload queued after its registration is fanned out.
//!
//! BACKPRESSURE
//! ============
//! `broadcast` never blocks: a full queue drops the payload with a warning.
//! Fan-out uses `try_send` into each subscriber's own bounded channel; a
//! subscriber whose channel is full or closed is removed. Dropping its sender
//! ends the socket task's receive loop, which closes the connection.
//!
//! Initial snapshots are built off the loop in a spawned task bounded by a
//! timeout, so a slow store read never stalls fan-out.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::message::{DashboardMessage, Snapshot};
use crate::services::analytics::DEFAULT_REQUIRED_WEEKLY_HOURS;
use crate::store::{RecordStore, StoreError};

pub const DEFAULT_QUEUE_CAPACITY: usize = 256;
pub const DEFAULT_SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(5);
/// Per-subscriber outbound buffer.
pub const SUBSCRIBER_QUEUE_CAPACITY: usize = 64;
const COMMAND_QUEUE_CAPACITY: usize = 64;

/// Identifies one live subscriber connection.
pub type ConnId = Uuid;

/// Encoded payload shared by every subscriber.
pub type Payload = Arc<str>;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Copy)]
pub struct HubConfig {
    /// Bounded broadcast queue capacity.
    pub queue_capacity: usize,
    /// Upper bound on building and delivering an initial snapshot.
    pub snapshot_timeout: Duration,
    /// Per-person weekly target behind the completion figures in snapshots.
    pub required_weekly_hours: f64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            snapshot_timeout: DEFAULT_SNAPSHOT_TIMEOUT,
            required_weekly_hours: DEFAULT_REQUIRED_WEEKLY_HOURS,
        }
    }
}

/// A registered connection: its ID and the channel its socket task drains.
pub struct Subscriber {
    pub id: ConnId,
    pub tx: mpsc::Sender<Payload>,
}

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("broadcast queue full")]
    QueueFull,
    #[error("hub is shut down")]
    Closed,
    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("snapshot failed: {0}")]
    Store(#[from] StoreError),
}

enum Command {
    Register(Subscriber),
    Unregister(ConnId),
    Shutdown,
}

// =============================================================================
// HANDLE
// =============================================================================

/// Cloneable handle to the hub loop.
#[derive(Clone)]
pub struct Hub {
    commands: mpsc::Sender<Command>,
    broadcasts: mpsc::Sender<Payload>,
    subscribers: Arc<AtomicUsize>,
    store: Arc<dyn RecordStore>,
    required_weekly_hours: f64,
}

impl Hub {
    /// Build a handle and its loop without starting it.
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>, config: HubConfig) -> (Self, HubLoop) {
        let (commands, command_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let (broadcasts, broadcast_rx) = mpsc::channel(config.queue_capacity.max(1));
        let subscribers = Arc::new(AtomicUsize::new(0));

        let hub = Self {
            commands,
            broadcasts,
            subscribers: subscribers.clone(),
            store: store.clone(),
            required_weekly_hours: config.required_weekly_hours,
        };
        let run_loop = HubLoop {
            commands: command_rx,
            broadcasts: broadcast_rx,
            subscribers: HashMap::new(),
            count: subscribers,
            store,
            snapshot_timeout: config.snapshot_timeout,
            required_weekly_hours: config.required_weekly_hours,
        };
        (hub, run_loop)
    }

    /// Build a hub and spawn its loop.
    #[must_use]
    pub fn spawn(store: Arc<dyn RecordStore>, config: HubConfig) -> (Self, JoinHandle<()>) {
        let (hub, run_loop) = Self::new(store, config);
        info!(queue_capacity = config.queue_capacity, "hub: started");
        (hub, tokio::spawn(run_loop.run()))
    }

    /// Add a subscriber. It receives `initial_data` shortly after.
    pub async fn register(&self, subscriber: Subscriber) {
        let id = subscriber.id;
        if self
            .commands
            .send(Command::Register(subscriber))
            .await
            .is_err()
        {
            warn!(conn_id = %id, "hub: register after shutdown");
        }
    }

    /// Remove a subscriber. Unknown IDs are ignored.
    pub async fn unregister(&self, id: ConnId) {
        if self
            .commands
            .send(Command::Unregister(id))
            .await
            .is_err()
        {
            debug!(conn_id = %id, "hub: unregister after shutdown");
        }
    }

    /// Stop the loop and close every subscriber.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }

    /// Live subscriber count as last published by the loop.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.load(Ordering::Relaxed)
    }

    /// Encode and enqueue a message for every subscriber. Never blocks.
    ///
    /// # Errors
    ///
    /// Returns `QueueFull` when the broadcast queue is at capacity (the
    /// message is dropped), `Closed` after shutdown, or `Encode` if the
    /// message cannot be serialized.
    pub fn broadcast(&self, message: &DashboardMessage) -> Result<(), HubError> {
        let payload: Payload = Arc::from(message.encode()?);
        match self.broadcasts.try_send(payload) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!(kind = message.kind(), "hub: broadcast queue full; dropping message");
                Err(HubError::QueueFull)
            }
            Err(TrySendError::Closed(_)) => {
                warn!(kind = message.kind(), "hub: broadcast queue closed; dropping message");
                Err(HubError::Closed)
            }
        }
    }

    /// Current dashboard state from the store.
    ///
    /// # Errors
    ///
    /// Returns the store error if summaries cannot be loaded.
    pub async fn snapshot(&self) -> Result<Snapshot, StoreError> {
        load_snapshot(self.store.as_ref(), self.required_weekly_hours).await
    }

    /// Broadcast one person's refreshed summary.
    pub async fn publish_person(&self, person_id: Uuid) {
        let summary = match self
            .store
            .summary_for_person(person_id, OffsetDateTime::now_utc())
            .await
        {
            Ok(Some(summary)) => summary,
            Ok(None) => {
                debug!(%person_id, "hub: no active summary; skipping update");
                return;
            }
            Err(e) => {
                error!(%person_id, error = %e, "hub: failed to load summary");
                return;
            }
        };
        let _ = self.broadcast(&DashboardMessage::SingleUserUpdate { user: summary });
    }

    /// Broadcast the full person list and analytics.
    pub async fn publish_full_update(&self) {
        match self.snapshot().await {
            Ok(snapshot) => {
                let _ = self.broadcast(&DashboardMessage::UserUpdate(snapshot));
            }
            Err(e) => error!(error = %e, "hub: failed to build full update"),
        }
    }
}

async fn load_snapshot(store: &dyn RecordStore, required_weekly_hours: f64) -> Result<Snapshot, StoreError> {
    let users = store
        .summary_for_all_active_people(OffsetDateTime::now_utc())
        .await?;
    Ok(Snapshot::from_summaries(users, required_weekly_hours))
}

// =============================================================================
// LOOP
// =============================================================================

/// The hub's run loop. Owns the subscriber map.
pub struct HubLoop {
    commands: mpsc::Receiver<Command>,
    broadcasts: mpsc::Receiver<Payload>,
    subscribers: HashMap<ConnId, mpsc::Sender<Payload>>,
    count: Arc<AtomicUsize>,
    store: Arc<dyn RecordStore>,
    snapshot_timeout: Duration,
    required_weekly_hours: f64,
}

impl HubLoop {
    /// Run until shutdown or until every handle is dropped.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                cmd = self.commands.recv() => match cmd {
                    Some(Command::Register(sub)) => self.add(sub),
                    Some(Command::Unregister(id)) => self.remove(id),
                    Some(Command::Shutdown) | None => break,
                },
                Some(payload) = self.broadcasts.recv() => self.fan_out(&payload),
            }
        }

        let closed = self.subscribers.len();
        self.subscribers.clear();
        self.publish_count();
        info!(closed, "hub: stopped");
    }

    fn add(&mut self, sub: Subscriber) {
        let Subscriber { id, tx } = sub;
        self.subscribers.insert(id, tx.clone());
        self.publish_count();
        info!(conn_id = %id, subscribers = self.subscribers.len(), "hub: subscriber registered");

        let store = self.store.clone();
        let limit = self.snapshot_timeout;
        let required = self.required_weekly_hours;
        tokio::spawn(async move {
            match tokio::time::timeout(limit, send_initial(store.as_ref(), required, &tx)).await {
                Ok(Ok(())) => debug!(conn_id = %id, "hub: initial data sent"),
                Ok(Err(e)) => error!(conn_id = %id, error = %e, "hub: initial data failed"),
                Err(_) => warn!(conn_id = %id, "hub: initial data timed out"),
            }
        });
    }

    fn remove(&mut self, id: ConnId) {
        if self.subscribers.remove(&id).is_some() {
            self.publish_count();
            info!(conn_id = %id, subscribers = self.subscribers.len(), "hub: subscriber unregistered");
        }
    }

    fn fan_out(&mut self, payload: &Payload) {
        let mut failed = Vec::new();
        for (id, tx) in &self.subscribers {
            match tx.try_send(payload.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(conn_id = %id, "hub: subscriber queue full; dropping subscriber");
                    failed.push(*id);
                }
                Err(TrySendError::Closed(_)) => failed.push(*id),
            }
        }
        for id in failed {
            self.remove(id);
        }
    }

    fn publish_count(&self) {
        self.count.store(self.subscribers.len(), Ordering::Relaxed);
    }
}

async fn send_initial(
    store: &dyn RecordStore,
    required_weekly_hours: f64,
    tx: &mpsc::Sender<Payload>,
) -> Result<(), HubError> {
    let snapshot = load_snapshot(store, required_weekly_hours).await?;
    let payload: Payload = Arc::from(DashboardMessage::InitialData(snapshot).encode()?);
    tx.send(payload).await.map_err(|_| HubError::Closed)
}

#[cfg(test)]
#[path = "hub_test.rs"]
mod tests;
