//! Time-entry ledger — start, end, and refresh working intervals.
//!
//! DESIGN
//! ======
//! The ledger owns the "at most one open entry per person" rule. Starting an
//! entry always force-closes whatever is already open first, so an
//! out-of-order or duplicated start can never leave two open intervals.
//!
//! ERROR HANDLING
//! ==============
//! Store failures are logged and swallowed. A failed ledger write must not
//! take down event processing: the caller gets `None` (or an empty list) and
//! carries on.

use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::store::{NewTimeEntry, RecordStore, StoreError, TimeEntry};

/// Status label stored on entries opened by a working verdict.
pub const WORKING_STATUS: &str = "Working";

/// Whole seconds between `start` and `now`, never negative.
#[must_use]
pub fn elapsed_secs(start: OffsetDateTime, now: OffsetDateTime) -> i64 {
    (now - start).whole_seconds().max(0)
}

#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn RecordStore>,
}

impl Ledger {
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Close any open entry for the person, then open a new one at `now`.
    pub async fn start_entry(
        &self,
        person_id: Uuid,
        status: &str,
        text: &str,
        emoji: &str,
        now: OffsetDateTime,
    ) -> Option<TimeEntry> {
        match self.try_start(person_id, status, text, emoji, now).await {
            Ok(entry) => {
                info!(%person_id, entry_id = %entry.id, status, text, emoji, "ledger: entry started");
                Some(entry)
            }
            Err(e) => {
                error!(%person_id, error = %e, "ledger: failed to start entry");
                None
            }
        }
    }

    /// Close the open entry at `now`, if any. No open entry is a no-op.
    pub async fn end_entry(&self, person_id: Uuid, now: OffsetDateTime) -> Option<TimeEntry> {
        match self.try_close_open(person_id, now).await {
            Ok(Some(entry)) => {
                info!(%person_id, entry_id = %entry.id, duration_secs = entry.duration_secs, "ledger: entry closed");
                Some(entry)
            }
            Ok(None) => {
                debug!(%person_id, "ledger: no open entry to close");
                None
            }
            Err(e) => {
                error!(%person_id, error = %e, "ledger: failed to close entry");
                None
            }
        }
    }

    /// Recompute and persist the duration of every open entry without
    /// closing it. Returns the people whose entries were refreshed; an entry
    /// closed between listing and writing keeps its final duration and is
    /// left out.
    pub async fn refresh_open_durations(&self) -> Vec<Uuid> {
        self.refresh_open_durations_at(OffsetDateTime::now_utc())
            .await
    }

    /// [`Self::refresh_open_durations`] with an explicit clock reading.
    pub async fn refresh_open_durations_at(&self, now: OffsetDateTime) -> Vec<Uuid> {
        let open = match self.store.list_open_time_entries().await {
            Ok(entries) => entries,
            Err(e) => {
                error!(error = %e, "ledger: failed to list open entries");
                return Vec::new();
            }
        };

        let mut refreshed = Vec::with_capacity(open.len());
        for entry in &open {
            // Rows imported without a start carry the epoch; nothing to measure.
            if entry.start_time == OffsetDateTime::UNIX_EPOCH {
                continue;
            }
            let duration = elapsed_secs(entry.start_time, now);
            match self.store.update_entry_duration(entry.id, duration, now).await {
                Ok(true) => refreshed.push(entry.person_id),
                Ok(false) => {
                    debug!(person_id = %entry.person_id, entry_id = %entry.id, "ledger: entry closed before refresh");
                }
                Err(e) => {
                    error!(person_id = %entry.person_id, entry_id = %entry.id, error = %e, "ledger: duration refresh failed");
                }
            }
        }

        debug!(open = open.len(), refreshed = refreshed.len(), "ledger: refreshed open durations");
        refreshed
    }

    async fn try_start(
        &self,
        person_id: Uuid,
        status: &str,
        text: &str,
        emoji: &str,
        now: OffsetDateTime,
    ) -> Result<TimeEntry, StoreError> {
        if let Some(closed) = self.try_close_open(person_id, now).await? {
            debug!(%person_id, entry_id = %closed.id, "ledger: force-closed previous entry");
        }

        self.store
            .create_time_entry(NewTimeEntry {
                person_id,
                start_time: now,
                status: status.to_string(),
                status_text: text.to_string(),
                status_emoji: emoji.to_string(),
            })
            .await
    }

    async fn try_close_open(&self, person_id: Uuid, now: OffsetDateTime) -> Result<Option<TimeEntry>, StoreError> {
        let Some(mut entry) = self.store.open_time_entry(person_id).await? else {
            return Ok(None);
        };
        let duration = elapsed_secs(entry.start_time, now);
        self.store
            .close_time_entry(entry.id, now, duration)
            .await?;
        entry.end_time = Some(now);
        entry.duration_secs = duration;
        entry.updated_at = now;
        Ok(Some(entry))
    }
}

#[cfg(test)]
#[path = "ledger_test.rs"]
mod tests;
