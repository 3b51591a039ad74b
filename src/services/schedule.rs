//! Periodic background tasks.
//!
//! Two independent timers, each stopped by the shared shutdown signal:
//! - duration refresh: recompute open entries, push one update per person
//! - full update: push the whole dashboard while anyone is watching

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::services::hub::Hub;
use crate::services::ledger::Ledger;

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_FULL_UPDATE_INTERVAL: Duration = Duration::from_secs(30);

/// Refresh open-entry durations every `interval`.
#[must_use]
pub fn spawn_duration_refresh(
    ledger: Ledger,
    hub: Hub,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    info!(interval_secs = interval.as_secs(), "duration refresh configured");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // First tick completes immediately; skip it.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let refreshed = ledger.refresh_open_durations().await;
                    for person_id in &refreshed {
                        hub.publish_person(*person_id).await;
                    }
                    debug!(refreshed = refreshed.len(), "duration refresh tick");
                }
                _ = shutdown.changed() => break,
            }
        }
        info!("duration refresh stopped");
    })
}

/// Broadcast a full `user_update` every `interval` while subscribers exist.
#[must_use]
pub fn spawn_full_updates(hub: Hub, interval: Duration, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    info!(interval_secs = interval.as_secs(), "full dashboard updates configured");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if hub.subscriber_count() > 0 {
                        hub.publish_full_update().await;
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        info!("full dashboard updates stopped");
    })
}

#[cfg(test)]
#[path = "schedule_test.rs"]
mod tests;
