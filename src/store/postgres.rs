//! `PostgreSQL` record store.
//!
//! Summaries are aggregated in SQL so the dashboard never pulls raw entry
//! history over the wire. The one-open-entry invariant is backed by the
//! `time_entries_one_open_per_person` partial unique index.

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use time::{Duration, OffsetDateTime, Time};
use uuid::Uuid;

use super::{
    NewTimeEntry, Person, PersonProfile, PersonSummary, RecordStore, StatusRecord, StoreError, TimeEntry,
    WeeklyReport, completion_rate, month_start, trailing_week_start,
};

const ENTRY_COLUMNS: &str =
    "id, person_id, start_time, end_time, duration_secs, status, status_text, status_emoji, updated_at";

const SUMMARY_SELECT: &str = r"
    SELECT
        p.id AS user_id,
        COALESCE(NULLIF(p.real_name, ''), p.name) AS name,
        p.email,
        p.avatar_url,
        COALESCE(SUM(te.duration_secs), 0)::BIGINT AS total_working_time,
        COALESCE(MAX(te.updated_at), p.created_at) AS last_activity,
        EXISTS(
            SELECT 1 FROM time_entries o
            WHERE o.person_id = p.id AND o.end_time IS NULL
        ) AS is_currently_working,
        COALESCE(cur.status, '') AS current_status,
        COALESCE(ls.text, '') AS status_text,
        COALESCE(ls.emoji, '') AS status_emoji,
        COALESCE(SUM(te.duration_secs) FILTER (WHERE te.start_time >= $1), 0)::FLOAT8 / 3600.0 AS weekly_hours,
        COALESCE(SUM(te.duration_secs) FILTER (WHERE te.start_time >= $2), 0)::FLOAT8 / 3600.0 AS monthly_hours
    FROM people p
    LEFT JOIN time_entries te ON te.person_id = p.id
    LEFT JOIN LATERAL (
        SELECT status FROM time_entries c
        WHERE c.person_id = p.id
        ORDER BY c.updated_at DESC
        LIMIT 1
    ) cur ON TRUE
    LEFT JOIN LATERAL (
        SELECT emoji, text FROM status_records s
        WHERE s.person_id = p.id
        ORDER BY s.seq DESC
        LIMIT 1
    ) ls ON TRUE
    WHERE p.is_active";

const SUMMARY_GROUP: &str = "GROUP BY p.id, cur.status, ls.text, ls.emoji";

/// `RecordStore` over a shared `sqlx` pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn person_from_row(row: &PgRow) -> Person {
    Person {
        id: row.get("id"),
        external_id: row.get("external_id"),
        name: row.get("name"),
        email: row.get("email"),
        real_name: row.get("real_name"),
        avatar_url: row.get("avatar_url"),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn entry_from_row(row: &PgRow) -> TimeEntry {
    TimeEntry {
        id: row.get("id"),
        person_id: row.get("person_id"),
        start_time: row.get("start_time"),
        end_time: row.get("end_time"),
        duration_secs: row.get("duration_secs"),
        status: row.get("status"),
        status_text: row.get("status_text"),
        status_emoji: row.get("status_emoji"),
        updated_at: row.get("updated_at"),
    }
}

fn status_from_row(row: &PgRow) -> StatusRecord {
    StatusRecord {
        id: row.get("id"),
        person_id: row.get("person_id"),
        emoji: row.get("emoji"),
        text: row.get("text"),
        is_working: row.get("is_working"),
        recorded_at: row.get("recorded_at"),
    }
}

fn summary_from_row(row: &PgRow) -> PersonSummary {
    PersonSummary {
        user_id: row.get("user_id"),
        name: row.get("name"),
        email: row.get("email"),
        avatar_url: row.get("avatar_url"),
        total_working_time: row.get("total_working_time"),
        last_activity: row.get("last_activity"),
        is_currently_working: row.get("is_currently_working"),
        current_status: row.get("current_status"),
        status_text: row.get("status_text"),
        status_emoji: row.get("status_emoji"),
        weekly_hours: row.get("weekly_hours"),
        monthly_hours: row.get("monthly_hours"),
    }
}

#[async_trait::async_trait]
impl RecordStore for PgStore {
    async fn upsert_person(&self, profile: &PersonProfile) -> Result<Person, StoreError> {
        let row = sqlx::query(
            r"INSERT INTO people (id, external_id, name, email, real_name, avatar_url)
              VALUES ($1, $2, $3, $4, $5, $6)
              ON CONFLICT (external_id) DO UPDATE
                  SET name = EXCLUDED.name,
                      email = EXCLUDED.email,
                      real_name = EXCLUDED.real_name,
                      avatar_url = EXCLUDED.avatar_url,
                      updated_at = now()
              RETURNING id, external_id, name, email, real_name, avatar_url, is_active, created_at, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(&profile.external_id)
        .bind(&profile.name)
        .bind(&profile.email)
        .bind(&profile.real_name)
        .bind(&profile.avatar_url)
        .fetch_one(&self.pool)
        .await?;
        Ok(person_from_row(&row))
    }

    async fn append_status_record(
        &self,
        person_id: Uuid,
        emoji: &str,
        text: &str,
        is_working: bool,
        at: OffsetDateTime,
    ) -> Result<StatusRecord, StoreError> {
        let row = sqlx::query(
            r"INSERT INTO status_records (id, person_id, emoji, text, is_working, recorded_at)
              VALUES ($1, $2, $3, $4, $5, $6)
              RETURNING id, person_id, emoji, text, is_working, recorded_at",
        )
        .bind(Uuid::new_v4())
        .bind(person_id)
        .bind(emoji)
        .bind(text)
        .bind(is_working)
        .bind(at)
        .fetch_one(&self.pool)
        .await?;
        Ok(status_from_row(&row))
    }

    async fn latest_status_record(&self, person_id: Uuid) -> Result<Option<StatusRecord>, StoreError> {
        let row = sqlx::query(
            r"SELECT id, person_id, emoji, text, is_working, recorded_at
              FROM status_records
              WHERE person_id = $1
              ORDER BY seq DESC
              LIMIT 1",
        )
        .bind(person_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(status_from_row))
    }

    async fn open_time_entry(&self, person_id: Uuid) -> Result<Option<TimeEntry>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM time_entries WHERE person_id = $1 AND end_time IS NULL LIMIT 1"
        ))
        .bind(person_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(entry_from_row))
    }

    async fn close_time_entry(
        &self,
        entry_id: Uuid,
        end_time: OffsetDateTime,
        duration_secs: i64,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r"UPDATE time_entries
              SET end_time = $2, duration_secs = $3, updated_at = $2
              WHERE id = $1",
        )
        .bind(entry_id)
        .bind(end_time)
        .bind(duration_secs)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::EntryNotFound(entry_id));
        }
        Ok(())
    }

    async fn create_time_entry(&self, entry: NewTimeEntry) -> Result<TimeEntry, StoreError> {
        let row = sqlx::query(&format!(
            r"INSERT INTO time_entries (id, person_id, start_time, status, status_text, status_emoji, updated_at)
              VALUES ($1, $2, $3, $4, $5, $6, $3)
              RETURNING {ENTRY_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(entry.person_id)
        .bind(entry.start_time)
        .bind(&entry.status)
        .bind(&entry.status_text)
        .bind(&entry.status_emoji)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::OpenEntryExists(entry.person_id),
            other => StoreError::Database(other),
        })?;
        Ok(entry_from_row(&row))
    }

    async fn list_open_time_entries(&self) -> Result<Vec<TimeEntry>, StoreError> {
        let rows = sqlx::query(&format!("SELECT {ENTRY_COLUMNS} FROM time_entries WHERE end_time IS NULL"))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(entry_from_row).collect())
    }

    async fn update_entry_duration(
        &self,
        entry_id: Uuid,
        duration_secs: i64,
        now: OffsetDateTime,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE time_entries SET duration_secs = $2, updated_at = $3 WHERE id = $1 AND end_time IS NULL",
        )
        .bind(entry_id)
        .bind(duration_secs)
        .bind(now)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() > 0 {
            return Ok(true);
        }

        // Nothing updated: either closed already or never existed.
        let exists: bool = sqlx::query("SELECT EXISTS(SELECT 1 FROM time_entries WHERE id = $1)")
            .bind(entry_id)
            .fetch_one(&self.pool)
            .await?
            .get(0);
        if exists { Ok(false) } else { Err(StoreError::EntryNotFound(entry_id)) }
    }

    async fn time_entries_for_person(&self, person_id: Uuid, limit: i64) -> Result<Vec<TimeEntry>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM time_entries WHERE person_id = $1 ORDER BY start_time DESC LIMIT $2"
        ))
        .bind(person_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(entry_from_row).collect())
    }

    async fn summary_for_person(
        &self,
        person_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<Option<PersonSummary>, StoreError> {
        let row = sqlx::query(&format!("{SUMMARY_SELECT} AND p.id = $3 {SUMMARY_GROUP}"))
            .bind(trailing_week_start(now))
            .bind(month_start(now))
            .bind(person_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(summary_from_row))
    }

    async fn summary_for_all_active_people(&self, now: OffsetDateTime) -> Result<Vec<PersonSummary>, StoreError> {
        let rows = sqlx::query(&format!("{SUMMARY_SELECT} {SUMMARY_GROUP} ORDER BY name"))
            .bind(trailing_week_start(now))
            .bind(month_start(now))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(summary_from_row).collect())
    }

    async fn weekly_reports(
        &self,
        week_start: time::Date,
        required_hours: f64,
    ) -> Result<Vec<WeeklyReport>, StoreError> {
        let from = week_start.with_time(Time::MIDNIGHT).assume_utc();
        let until = from + Duration::days(7);
        let week_end = week_start + Duration::days(6);

        let rows = sqlx::query(
            r"SELECT
                  p.id AS user_id,
                  COALESCE(NULLIF(p.real_name, ''), p.name) AS name,
                  p.email,
                  COALESCE(SUM(te.duration_secs), 0)::FLOAT8 / 3600.0 AS total_hours
              FROM people p
              LEFT JOIN time_entries te
                  ON te.person_id = p.id AND te.start_time >= $1 AND te.start_time < $2
              WHERE p.is_active
              GROUP BY p.id
              ORDER BY name",
        )
        .bind(from)
        .bind(until)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let total_hours: f64 = row.get("total_hours");
                WeeklyReport {
                    user_id: row.get("user_id"),
                    name: row.get("name"),
                    email: row.get("email"),
                    week_start: week_start.to_string(),
                    week_end: week_end.to_string(),
                    total_hours,
                    required_hours,
                    completion_rate: completion_rate(total_hours, required_hours),
                }
            })
            .collect())
    }
}

#[cfg(all(test, feature = "live-db-tests"))]
#[path = "postgres_test.rs"]
mod tests;
