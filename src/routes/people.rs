//! Dashboard read API — people, analytics, entries, weekly reports.
//!
//! Every handler reads straight from the record store; nothing here touches
//! the hub or the ledger.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime};
use tracing::error;
use uuid::Uuid;

use crate::services::analytics::Analytics;
use crate::state::AppState;
use crate::store::{PersonSummary, StoreError, TimeEntry, WeeklyReport};

const DEFAULT_ENTRY_LIMIT: i64 = 50;
const MAX_ENTRY_LIMIT: i64 = 500;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct UsersResponse {
    pub users: Vec<PersonSummary>,
}

#[derive(Debug, Deserialize)]
pub struct EntriesQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct WeekQuery {
    pub week: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WeeklyReportsResponse {
    pub week_start: String,
    pub week_end: String,
    pub reports: Vec<WeeklyReport>,
}

// =============================================================================
// HANDLERS
// =============================================================================

/// `GET /api/users`
///
/// # Errors
///
/// Returns `500` if the store query fails.
pub async fn list_users(State(state): State<AppState>) -> Result<Json<UsersResponse>, StatusCode> {
    let users = state
        .store
        .summary_for_all_active_people(OffsetDateTime::now_utc())
        .await
        .map_err(store_error_to_status)?;
    Ok(Json(UsersResponse { users }))
}

/// `GET /api/analytics`
///
/// # Errors
///
/// Returns `500` if the store query fails.
pub async fn analytics(State(state): State<AppState>) -> Result<Json<Analytics>, StatusCode> {
    let users = state
        .store
        .summary_for_all_active_people(OffsetDateTime::now_utc())
        .await
        .map_err(store_error_to_status)?;
    Ok(Json(Analytics::from_summaries(&users, state.config.required_weekly_hours)))
}

/// `GET /api/users/{id}/entries?limit=N`, newest first.
///
/// # Errors
///
/// Returns `500` if the store query fails.
pub async fn list_entries(
    State(state): State<AppState>,
    Path(person_id): Path<Uuid>,
    Query(query): Query<EntriesQuery>,
) -> Result<Json<Vec<TimeEntry>>, StatusCode> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_ENTRY_LIMIT)
        .clamp(1, MAX_ENTRY_LIMIT);
    let entries = state
        .store
        .time_entries_for_person(person_id, limit)
        .await
        .map_err(store_error_to_status)?;
    Ok(Json(entries))
}

/// `GET /api/reports/weekly?week=YYYY-MM-DD`
///
/// # Errors
///
/// Returns `400` for a malformed `week`, `500` if the store query fails.
pub async fn weekly_reports(
    State(state): State<AppState>,
    Query(query): Query<WeekQuery>,
) -> Result<Json<WeeklyReportsResponse>, StatusCode> {
    let today = OffsetDateTime::now_utc().date();
    let week_start = parse_week(query.week.as_deref(), today)?;
    let reports = state
        .store
        .weekly_reports(week_start, state.config.required_weekly_hours)
        .await
        .map_err(store_error_to_status)?;
    Ok(Json(WeeklyReportsResponse {
        week_start: week_start.to_string(),
        week_end: (week_start + Duration::days(6)).to_string(),
        reports,
    }))
}

// =============================================================================
// HELPERS
// =============================================================================

/// Monday of the week containing `raw` (or `today` when absent).
///
/// # Errors
///
/// Returns `400` unless `raw` is a `YYYY-MM-DD` date.
pub fn parse_week(raw: Option<&str>, today: Date) -> Result<Date, StatusCode> {
    let day = match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => Date::parse(raw, format_description!("[year]-[month]-[day]"))
            .map_err(|_| StatusCode::BAD_REQUEST)?,
        None => today,
    };
    Ok(monday_of(day))
}

fn monday_of(day: Date) -> Date {
    day - Duration::days(i64::from(day.weekday().number_days_from_monday()))
}

pub(crate) fn store_error_to_status(err: StoreError) -> StatusCode {
    match err {
        StoreError::PersonNotFound(_) | StoreError::EntryNotFound(_) => StatusCode::NOT_FOUND,
        StoreError::OpenEntryExists(_) => StatusCode::CONFLICT,
        StoreError::Database(e) => {
            error!(error = %e, "store query failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[cfg(test)]
#[path = "people_test.rs"]
mod tests;
