//! Dashboard analytics, recomputed from the full summary set on demand.

use serde::{Deserialize, Serialize};

use crate::store::{PersonSummary, completion_rate, secs_to_hours};

/// Default per-person weekly target, in hours.
pub const DEFAULT_REQUIRED_WEEKLY_HOURS: f64 = 20.0;
/// A month's target counts four working weeks.
const WEEKS_PER_MONTH: f64 = 4.0;

/// Team-wide totals shown above the person list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Analytics {
    pub total_users: usize,
    /// People with an open time entry right now.
    pub active_users: usize,
    /// All-time working hours across the team.
    pub total_working_time: f64,
    pub total_weekly_hours: f64,
    pub total_monthly_hours: f64,
    pub avg_weekly_hours: f64,
    pub avg_monthly_hours: f64,
    /// Weekly hours as a percentage of everyone's combined weekly target.
    pub weekly_completion: f64,
    /// Monthly hours as a percentage of everyone's combined monthly target.
    pub monthly_completion: f64,
}

impl Analytics {
    /// Aggregate `summaries` against a per-person weekly target.
    ///
    /// Completion figures are `0` when the combined target is zero, either
    /// because nobody is active or because the target itself is zero.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_summaries(summaries: &[PersonSummary], required_weekly_hours: f64) -> Self {
        let total_users = summaries.len();
        let active_users = summaries
            .iter()
            .filter(|s| s.is_currently_working)
            .count();
        let total_secs: i64 = summaries.iter().map(|s| s.total_working_time).sum();
        let total_weekly_hours: f64 = summaries.iter().map(|s| s.weekly_hours).sum();
        let total_monthly_hours: f64 = summaries.iter().map(|s| s.monthly_hours).sum();

        let n = total_users as f64;
        let (avg_weekly_hours, avg_monthly_hours) = if total_users == 0 {
            (0.0, 0.0)
        } else {
            (total_weekly_hours / n, total_monthly_hours / n)
        };

        let weekly_target = required_weekly_hours * n;
        let monthly_target = weekly_target * WEEKS_PER_MONTH;

        Self {
            total_users,
            active_users,
            total_working_time: secs_to_hours(total_secs),
            total_weekly_hours,
            total_monthly_hours,
            avg_weekly_hours,
            avg_monthly_hours,
            weekly_completion: completion_rate(total_weekly_hours, weekly_target),
            monthly_completion: completion_rate(total_monthly_hours, monthly_target),
        }
    }
}

#[cfg(test)]
#[path = "analytics_test.rs"]
mod tests;
