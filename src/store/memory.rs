//! In-process record store.
//!
//! DESIGN
//! ======
//! Mirrors the Postgres schema with plain vectors and maps behind a single
//! `tokio::sync::RwLock`. Every trait call takes the lock once, does its work
//! synchronously, and releases it before returning, so no lock is ever held
//! across an await point owned by the caller.
//!
//! Used when the service starts without `DATABASE_URL`, and by tests that
//! need real store semantics without a live database.

use std::collections::HashMap;

use time::{Duration, OffsetDateTime, Time};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    NewTimeEntry, Person, PersonProfile, PersonSummary, RecordStore, StatusRecord, StoreError, TimeEntry,
    WeeklyReport, completion_rate, month_start, secs_to_hours, trailing_week_start,
};

#[derive(Default)]
struct Tables {
    people: HashMap<Uuid, Person>,
    by_external_id: HashMap<String, Uuid>,
    /// Insertion order is significant: the last record per person is "latest".
    statuses: Vec<StatusRecord>,
    entries: Vec<TimeEntry>,
}

impl Tables {
    fn entries_for(&self, person_id: Uuid) -> impl Iterator<Item = &TimeEntry> {
        self.entries.iter().filter(move |e| e.person_id == person_id)
    }

    fn latest_status(&self, person_id: Uuid) -> Option<&StatusRecord> {
        self.statuses.iter().rev().find(|s| s.person_id == person_id)
    }

    fn summarize(&self, person: &Person, now: OffsetDateTime) -> PersonSummary {
        let week_floor = trailing_week_start(now);
        let month_floor = month_start(now);

        let mut total = 0_i64;
        let mut weekly = 0_i64;
        let mut monthly = 0_i64;
        let mut is_working = false;
        let mut latest_entry: Option<&TimeEntry> = None;

        for entry in self.entries_for(person.id) {
            total += entry.duration_secs;
            if entry.start_time >= week_floor {
                weekly += entry.duration_secs;
            }
            if entry.start_time >= month_floor {
                monthly += entry.duration_secs;
            }
            is_working |= entry.is_open();
            if latest_entry.is_none_or(|l| entry.updated_at >= l.updated_at) {
                latest_entry = Some(entry);
            }
        }

        let latest_status = self.latest_status(person.id);

        PersonSummary {
            user_id: person.id,
            name: person.display_name().to_string(),
            email: person.email.clone(),
            avatar_url: person.avatar_url.clone(),
            total_working_time: total,
            last_activity: latest_entry.map_or(person.created_at, |e| e.updated_at),
            is_currently_working: is_working,
            current_status: latest_entry.map(|e| e.status.clone()).unwrap_or_default(),
            status_text: latest_status.map(|s| s.text.clone()).unwrap_or_default(),
            status_emoji: latest_status.map(|s| s.emoji.clone()).unwrap_or_default(),
            weekly_hours: secs_to_hours(weekly),
            monthly_hours: secs_to_hours(monthly),
        }
    }
}

/// `RecordStore` backed by process memory. Cloning is not supported; share
/// it behind an `Arc` like any other store.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Inspection helpers for tests; not part of `RecordStore`.
#[cfg(test)]
impl MemoryStore {
    /// All status records for a person in insertion order.
    pub async fn status_history(&self, person_id: Uuid) -> Vec<StatusRecord> {
        let tables = self.tables.read().await;
        tables
            .statuses
            .iter()
            .filter(|s| s.person_id == person_id)
            .cloned()
            .collect()
    }

    /// All time entries for a person in creation order.
    pub async fn entries(&self, person_id: Uuid) -> Vec<TimeEntry> {
        let tables = self.tables.read().await;
        tables.entries_for(person_id).cloned().collect()
    }

    /// Look up a person by external platform ID.
    pub async fn person_by_external_id(&self, external_id: &str) -> Option<Person> {
        let tables = self.tables.read().await;
        let id = tables.by_external_id.get(external_id)?;
        tables.people.get(id).cloned()
    }

    /// Flip the active flag. Inactive people drop out of every summary.
    pub async fn set_active(&self, person_id: Uuid, active: bool) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let person = tables
            .people
            .get_mut(&person_id)
            .ok_or(StoreError::PersonNotFound(person_id))?;
        person.is_active = active;
        Ok(())
    }
}

#[async_trait::async_trait]
impl RecordStore for MemoryStore {
    async fn upsert_person(&self, profile: &PersonProfile) -> Result<Person, StoreError> {
        let now = OffsetDateTime::now_utc();
        let mut tables = self.tables.write().await;

        if let Some(id) = tables.by_external_id.get(&profile.external_id).copied() {
            let person = tables
                .people
                .get_mut(&id)
                .ok_or(StoreError::PersonNotFound(id))?;
            person.name.clone_from(&profile.name);
            person.email.clone_from(&profile.email);
            person.real_name.clone_from(&profile.real_name);
            person.avatar_url.clone_from(&profile.avatar_url);
            person.updated_at = now;
            return Ok(person.clone());
        }

        let person = Person {
            id: Uuid::new_v4(),
            external_id: profile.external_id.clone(),
            name: profile.name.clone(),
            email: profile.email.clone(),
            real_name: profile.real_name.clone(),
            avatar_url: profile.avatar_url.clone(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        tables
            .by_external_id
            .insert(person.external_id.clone(), person.id);
        tables.people.insert(person.id, person.clone());
        Ok(person)
    }

    async fn append_status_record(
        &self,
        person_id: Uuid,
        emoji: &str,
        text: &str,
        is_working: bool,
        at: OffsetDateTime,
    ) -> Result<StatusRecord, StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.people.contains_key(&person_id) {
            return Err(StoreError::PersonNotFound(person_id));
        }
        let record = StatusRecord {
            id: Uuid::new_v4(),
            person_id,
            emoji: emoji.to_string(),
            text: text.to_string(),
            is_working,
            recorded_at: at,
        };
        tables.statuses.push(record.clone());
        Ok(record)
    }

    async fn latest_status_record(&self, person_id: Uuid) -> Result<Option<StatusRecord>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.latest_status(person_id).cloned())
    }

    async fn open_time_entry(&self, person_id: Uuid) -> Result<Option<TimeEntry>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.entries_for(person_id).find(|e| e.is_open()).cloned())
    }

    async fn close_time_entry(
        &self,
        entry_id: Uuid,
        end_time: OffsetDateTime,
        duration_secs: i64,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let entry = tables
            .entries
            .iter_mut()
            .find(|e| e.id == entry_id)
            .ok_or(StoreError::EntryNotFound(entry_id))?;
        entry.end_time = Some(end_time);
        entry.duration_secs = duration_secs;
        entry.updated_at = end_time;
        Ok(())
    }

    async fn create_time_entry(&self, entry: NewTimeEntry) -> Result<TimeEntry, StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.people.contains_key(&entry.person_id) {
            return Err(StoreError::PersonNotFound(entry.person_id));
        }
        if tables.entries_for(entry.person_id).any(TimeEntry::is_open) {
            return Err(StoreError::OpenEntryExists(entry.person_id));
        }
        let row = TimeEntry {
            id: Uuid::new_v4(),
            person_id: entry.person_id,
            start_time: entry.start_time,
            end_time: None,
            duration_secs: 0,
            status: entry.status,
            status_text: entry.status_text,
            status_emoji: entry.status_emoji,
            updated_at: entry.start_time,
        };
        tables.entries.push(row.clone());
        Ok(row)
    }

    async fn list_open_time_entries(&self) -> Result<Vec<TimeEntry>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .entries
            .iter()
            .filter(|e| e.is_open())
            .cloned()
            .collect())
    }

    async fn update_entry_duration(
        &self,
        entry_id: Uuid,
        duration_secs: i64,
        now: OffsetDateTime,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let entry = tables
            .entries
            .iter_mut()
            .find(|e| e.id == entry_id)
            .ok_or(StoreError::EntryNotFound(entry_id))?;
        if !entry.is_open() {
            return Ok(false);
        }
        entry.duration_secs = duration_secs;
        entry.updated_at = now;
        Ok(true)
    }

    async fn time_entries_for_person(&self, person_id: Uuid, limit: i64) -> Result<Vec<TimeEntry>, StoreError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<TimeEntry> = tables.entries_for(person_id).cloned().collect();
        rows.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        rows.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(rows)
    }

    async fn summary_for_person(
        &self,
        person_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<Option<PersonSummary>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .people
            .get(&person_id)
            .filter(|p| p.is_active)
            .map(|p| tables.summarize(p, now)))
    }

    async fn summary_for_all_active_people(&self, now: OffsetDateTime) -> Result<Vec<PersonSummary>, StoreError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<PersonSummary> = tables
            .people
            .values()
            .filter(|p| p.is_active)
            .map(|p| tables.summarize(p, now))
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn weekly_reports(
        &self,
        week_start: time::Date,
        required_hours: f64,
    ) -> Result<Vec<WeeklyReport>, StoreError> {
        let from = week_start.with_time(Time::MIDNIGHT).assume_utc();
        let until = from + Duration::days(7);
        let week_end = week_start + Duration::days(6);

        let tables = self.tables.read().await;
        let mut rows: Vec<WeeklyReport> = tables
            .people
            .values()
            .filter(|p| p.is_active)
            .map(|p| {
                let secs: i64 = tables
                    .entries_for(p.id)
                    .filter(|e| e.start_time >= from && e.start_time < until)
                    .map(|e| e.duration_secs)
                    .sum();
                let total_hours = secs_to_hours(secs);
                WeeklyReport {
                    user_id: p.id,
                    name: p.display_name().to_string(),
                    email: p.email.clone(),
                    week_start: week_start.to_string(),
                    week_end: week_end.to_string(),
                    total_hours,
                    required_hours,
                    completion_rate: completion_rate(total_hours, required_hours),
                }
            })
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;
