//! Dashboard wire messages.
//!
//! DESIGN
//! ======
//! Every payload pushed to a live-dashboard socket is a JSON object with a
//! `type` tag and a `data` body:
//!
//! ```text
//! {"type": "initial_data",       "data": {"users": [...], "analytics": {...}}}
//! {"type": "user_update",        "data": {"users": [...], "analytics": {...}}}
//! {"type": "single_user_update", "data": {"user": {...}}}
//! ```
//!
//! Payloads are serialized once by the hub and shared between subscribers
//! as `Arc<str>`.

use serde::{Deserialize, Serialize};

use crate::services::analytics::Analytics;
use crate::store::PersonSummary;

/// Full dashboard state: every active person plus team analytics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub users: Vec<PersonSummary>,
    pub analytics: Analytics,
}

impl Snapshot {
    #[must_use]
    pub fn from_summaries(users: Vec<PersonSummary>, required_weekly_hours: f64) -> Self {
        let analytics = Analytics::from_summaries(&users, required_weekly_hours);
        Self { users, analytics }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum DashboardMessage {
    /// Sent once to a newly registered subscriber.
    InitialData(Snapshot),
    /// One person's row changed.
    SingleUserUpdate { user: PersonSummary },
    /// Periodic full refresh.
    UserUpdate(Snapshot),
}

impl DashboardMessage {
    /// Wire tag, for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InitialData(_) => "initial_data",
            Self::SingleUserUpdate { .. } => "single_user_update",
            Self::UserUpdate(_) => "user_update",
        }
    }

    /// Encode for the socket.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
#[path = "message_test.rs"]
mod tests;
