//! Record store — the persistence seam behind the ledger and the hub.
//!
//! DESIGN
//! ======
//! Everything durable (people, time entries, status records) lives behind
//! the `RecordStore` trait. The presence pipeline only ever holds transient
//! copies of these rows while handling a single event, so the store is the
//! single source of truth for "is this person working right now".
//!
//! Two implementations ship with the crate:
//! - `PgStore`: `PostgreSQL` via `sqlx`, used whenever `DATABASE_URL` is set.
//! - `MemoryStore`: `RwLock`-guarded tables with identical semantics, used
//!   for local runs without a database and throughout the test suite.
//!
//! INVARIANTS
//! ==========
//! - At most one time entry per person has `end_time = NULL`. Postgres
//!   enforces this with a partial unique index; the memory store rejects
//!   the second open entry with `StoreError::OpenEntryExists`.
//! - Status records are append-only and ordered by insertion.
//! - A closed entry is final. Duration refreshes only touch open entries.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime, Time};
use uuid::Uuid;

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("person not found: {0}")]
    PersonNotFound(Uuid),
    #[error("time entry not found: {0}")]
    EntryNotFound(Uuid),
    #[error("person {0} already has an open time entry")]
    OpenEntryExists(Uuid),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

// =============================================================================
// ROWS
// =============================================================================

/// Profile fields supplied by the chat platform. Upserted on every event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonProfile {
    pub external_id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub real_name: String,
    #[serde(default)]
    pub avatar_url: String,
}

/// A tracked human, keyed by their chat-platform user ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: Uuid,
    pub external_id: String,
    pub name: String,
    pub email: String,
    pub real_name: String,
    pub avatar_url: String,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Person {
    /// Real name when the platform has one, otherwise the handle.
    #[must_use]
    pub fn display_name(&self) -> &str {
        if self.real_name.is_empty() { &self.name } else { &self.real_name }
    }
}

/// One continuous working interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeEntry {
    pub id: Uuid,
    pub person_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub end_time: Option<OffsetDateTime>,
    /// Seconds worked. Frozen on close, refreshed periodically while open.
    pub duration_secs: i64,
    pub status: String,
    pub status_text: String,
    pub status_emoji: String,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl TimeEntry {
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }
}

/// Fields for a freshly opened time entry.
#[derive(Debug, Clone)]
pub struct NewTimeEntry {
    pub person_id: Uuid,
    pub start_time: OffsetDateTime,
    pub status: String,
    pub status_text: String,
    pub status_emoji: String,
}

/// Immutable audit row for one distinct observed status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub id: Uuid,
    pub person_id: Uuid,
    pub emoji: String,
    pub text: String,
    pub is_working: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub recorded_at: OffsetDateTime,
}

impl StatusRecord {
    /// True when this record carries the same emoji and text.
    #[must_use]
    pub fn same_status(&self, emoji: &str, text: &str) -> bool {
        self.emoji == emoji && self.text == text
    }
}

// =============================================================================
// DERIVED VIEWS
// =============================================================================

/// Per-person dashboard row. Field names match the live-dashboard payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonSummary {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub avatar_url: String,
    /// Total seconds across every entry, open ones included.
    pub total_working_time: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub last_activity: OffsetDateTime,
    pub is_currently_working: bool,
    /// Status label of the most recently touched entry, empty if none.
    pub current_status: String,
    pub status_text: String,
    pub status_emoji: String,
    pub weekly_hours: f64,
    pub monthly_hours: f64,
}

/// Hours logged by one person in a Monday-aligned week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyReport {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    /// `YYYY-MM-DD`
    pub week_start: String,
    /// `YYYY-MM-DD`
    pub week_end: String,
    pub total_hours: f64,
    pub required_hours: f64,
    pub completion_rate: f64,
}

// =============================================================================
// PERIOD HELPERS
// =============================================================================

/// Lower bound for "weekly hours": the trailing seven days.
#[must_use]
pub fn trailing_week_start(now: OffsetDateTime) -> OffsetDateTime {
    now - Duration::days(7)
}

/// Lower bound for "monthly hours": midnight on the first of the month.
#[must_use]
pub fn month_start(now: OffsetDateTime) -> OffsetDateTime {
    now.replace_day(1)
        .unwrap_or(now)
        .replace_time(Time::MIDNIGHT)
}

/// Seconds to hours for dashboard display.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn secs_to_hours(secs: i64) -> f64 {
    secs as f64 / 3600.0
}

/// Completion percentage of `required` hours, zero when nothing is required.
#[must_use]
pub fn completion_rate(total_hours: f64, required_hours: f64) -> f64 {
    if required_hours <= 0.0 {
        return 0.0;
    }
    total_hours / required_hours * 100.0
}

// =============================================================================
// TRAIT
// =============================================================================

/// Operations the presence pipeline needs from durable storage.
///
/// Implementations must be safe to call concurrently from many tasks; callers
/// never hold an in-process lock across these calls.
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert or refresh a person by external ID.
    async fn upsert_person(&self, profile: &PersonProfile) -> Result<Person, StoreError>;

    /// Append one status record.
    async fn append_status_record(
        &self,
        person_id: Uuid,
        emoji: &str,
        text: &str,
        is_working: bool,
        at: OffsetDateTime,
    ) -> Result<StatusRecord, StoreError>;

    /// Most recently appended status record for a person.
    async fn latest_status_record(&self, person_id: Uuid) -> Result<Option<StatusRecord>, StoreError>;

    /// The person's open time entry, if any.
    async fn open_time_entry(&self, person_id: Uuid) -> Result<Option<TimeEntry>, StoreError>;

    /// Set the end time and freeze the duration of an entry.
    async fn close_time_entry(&self, entry_id: Uuid, end_time: OffsetDateTime, duration_secs: i64)
    -> Result<(), StoreError>;

    /// Open a new time entry.
    async fn create_time_entry(&self, entry: NewTimeEntry) -> Result<TimeEntry, StoreError>;

    /// Every open entry across all people.
    async fn list_open_time_entries(&self) -> Result<Vec<TimeEntry>, StoreError>;

    /// Persist a recomputed duration on an entry that is still open.
    ///
    /// Returns `false` without writing when the entry was closed in the
    /// meantime, so a stale refresh never overwrites the final duration.
    ///
    /// # Errors
    ///
    /// `StoreError::EntryNotFound` when no entry has this id.
    async fn update_entry_duration(
        &self,
        entry_id: Uuid,
        duration_secs: i64,
        now: OffsetDateTime,
    ) -> Result<bool, StoreError>;

    /// Most recent entries for one person, newest first.
    async fn time_entries_for_person(&self, person_id: Uuid, limit: i64) -> Result<Vec<TimeEntry>, StoreError>;

    /// Dashboard row for one active person. `None` if unknown or inactive.
    async fn summary_for_person(&self, person_id: Uuid, now: OffsetDateTime)
    -> Result<Option<PersonSummary>, StoreError>;

    /// Dashboard rows for every active person, ordered by display name.
    async fn summary_for_all_active_people(&self, now: OffsetDateTime) -> Result<Vec<PersonSummary>, StoreError>;

    /// Weekly totals for every active person for the week starting `week_start`.
    async fn weekly_reports(&self, week_start: time::Date, required_hours: f64)
    -> Result<Vec<WeeklyReport>, StoreError>;
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
