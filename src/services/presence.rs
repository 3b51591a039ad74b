//! Presence state machine — turns raw status events into ledger transitions.
//!
//! DESIGN
//! ======
//! A person's state (unknown, neutral, working, not working, offline) is
//! never stored as a field. It is derived from their latest status record
//! plus whether they have an open time entry. Each event walks a fixed
//! pipeline:
//!
//! 1. resolve the profile (event payload, else the user directory)
//! 2. upsert the person
//! 3. resolve presence (event, else directory) and force offline people to
//!    the offline marker
//! 4. drop the event if (emoji, text) equals the latest record
//! 5. append a status record
//! 6. drive the ledger from the verdict
//! 7. tell the hub the person's summary changed
//!
//! ERROR HANDLING
//! ==============
//! Failures abandon only the current event. Every path returns an `Outcome`
//! so callers and tests can see what happened without scraping logs.
//!
//! ORDERING
//! ========
//! `handle` is not serialized internally. Callers that need per-person
//! ordering go through `EventDispatcher`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::services::classifier::{self, Verdict};
use crate::services::directory::UserDirectory;
use crate::services::hub::Hub;
use crate::services::ledger::{Ledger, WORKING_STATUS};
use crate::store::{PersonProfile, RecordStore};

// =============================================================================
// EVENTS
// =============================================================================

/// Presence as reported by the chat platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Active,
    Away,
    /// Not reported or not fetchable. Treated as online.
    #[default]
    Unknown,
}

impl Presence {
    /// Map a Slack presence string.
    #[must_use]
    pub fn from_slack(raw: &str) -> Self {
        match raw {
            "" => Self::Unknown,
            "active" => Self::Active,
            _ => Self::Away,
        }
    }

    #[must_use]
    pub fn is_online(self) -> bool {
        self != Self::Away
    }
}

/// One inbound status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub external_user_id: String,
    #[serde(default)]
    pub emoji: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub presence: Presence,
    /// Profile supplied by the sender. Skips the directory lookup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<PersonProfile>,
}

// =============================================================================
// OUTCOME
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No profile in the event and no directory, or the directory failed.
    LookupFailed,
    /// The profile has no email; the event is treated as malformed.
    MissingEmail,
    /// The person upsert or status append failed.
    StoreFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Skipped(SkipReason),
    /// Same (emoji, text) as the latest record. Nothing was written.
    Duplicate,
    Applied { person_id: Uuid, verdict: Verdict },
}

// =============================================================================
// TRACKER
// =============================================================================

#[derive(Clone)]
pub struct PresenceTracker {
    store: Arc<dyn RecordStore>,
    ledger: Ledger,
    hub: Hub,
    directory: Option<Arc<dyn UserDirectory>>,
}

impl PresenceTracker {
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>, hub: Hub, directory: Option<Arc<dyn UserDirectory>>) -> Self {
        let ledger = Ledger::new(store.clone());
        Self { store, ledger, hub, directory }
    }

    #[must_use]
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub async fn handle(&self, event: &StatusEvent) -> Outcome {
        self.handle_at(event, OffsetDateTime::now_utc()).await
    }

    /// [`Self::handle`] with an explicit clock reading.
    pub async fn handle_at(&self, event: &StatusEvent, now: OffsetDateTime) -> Outcome {
        let user = event.external_user_id.as_str();

        let profile = match self.resolve_profile(event).await {
            Some(profile) => profile,
            None => return Outcome::Skipped(SkipReason::LookupFailed),
        };
        if profile.email.trim().is_empty() {
            info!(user, "presence: profile has no email; skipping event");
            return Outcome::Skipped(SkipReason::MissingEmail);
        }

        let person = match self.store.upsert_person(&profile).await {
            Ok(person) => person,
            Err(e) => {
                error!(user, error = %e, "presence: person upsert failed");
                return Outcome::Skipped(SkipReason::StoreFailed);
            }
        };
        let person_id = person.id;
        let name = person.display_name();

        let presence = self.resolve_presence(event).await;
        let status = classifier::resolve(&event.emoji, &event.text, presence.is_online());

        match self.store.latest_status_record(person_id).await {
            Ok(Some(latest)) if latest.same_status(&status.emoji, &status.text) => {
                debug!(%person_id, name, emoji = %status.emoji, text = %status.text, "presence: status unchanged");
                return Outcome::Duplicate;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(%person_id, error = %e, "presence: latest status lookup failed; treating as first record");
            }
        }

        if let Err(e) = self
            .store
            .append_status_record(person_id, &status.emoji, &status.text, status.verdict.is_working(), now)
            .await
        {
            error!(%person_id, error = %e, "presence: status append failed");
            return Outcome::Skipped(SkipReason::StoreFailed);
        }

        match status.verdict {
            Verdict::Working => {
                info!(%person_id, name, emoji = %status.emoji, text = %status.text, "presence: started working");
                self.ledger
                    .start_entry(person_id, WORKING_STATUS, &status.text, &status.emoji, now)
                    .await;
            }
            Verdict::NotWorking => {
                if presence.is_online() {
                    info!(%person_id, name, emoji = %status.emoji, text = %status.text, "presence: stopped working");
                } else {
                    info!(%person_id, name, "presence: went offline");
                }
                self.ledger.end_entry(person_id, now).await;
            }
            Verdict::Neutral => {
                debug!(%person_id, name, emoji = %status.emoji, text = %status.text, "presence: neutral status");
            }
        }

        self.hub.publish_person(person_id).await;
        Outcome::Applied { person_id, verdict: status.verdict }
    }

    async fn resolve_profile(&self, event: &StatusEvent) -> Option<PersonProfile> {
        let user = event.external_user_id.as_str();
        if let Some(profile) = &event.profile {
            return Some(PersonProfile { external_id: user.to_string(), ..profile.clone() });
        }
        let Some(directory) = &self.directory else {
            warn!(user, "presence: no profile in event and no directory configured");
            return None;
        };
        match directory.profile(user).await {
            Ok(profile) => Some(profile),
            Err(e) => {
                error!(user, error = %e, "presence: profile lookup failed");
                None
            }
        }
    }

    /// Event presence when reported, else the directory's, else unknown.
    async fn resolve_presence(&self, event: &StatusEvent) -> Presence {
        if event.presence != Presence::Unknown {
            return event.presence;
        }
        let Some(directory) = &self.directory else {
            return Presence::Unknown;
        };
        directory
            .presence(&event.external_user_id)
            .await
            .unwrap_or_else(|e| {
                warn!(user = %event.external_user_id, error = %e, "presence: lookup failed; assuming online");
                Presence::Unknown
            })
    }
}

#[cfg(test)]
#[path = "presence_test.rs"]
mod tests;
