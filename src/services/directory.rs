//! User directory — resolves a chat-platform user ID to a profile.
//!
//! The presence tracker calls this for every event whose payload does not
//! already carry a profile, and for presence when the event left it unknown.
//! Both calls happen inside the person's worker, so lookups for one person
//! never reorder their events. The Slack client is the production
//! implementation; tests substitute their own.

use crate::services::presence::Presence;
use crate::store::PersonProfile;

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("user not found: {0}")]
    NotFound(String),
    #[error("directory lookup failed: {0}")]
    Lookup(String),
}

#[async_trait::async_trait]
pub trait UserDirectory: Send + Sync {
    /// Current profile for `external_id`.
    async fn profile(&self, external_id: &str) -> Result<PersonProfile, DirectoryError>;

    /// Current presence. Directories without presence report `Unknown`.
    async fn presence(&self, _external_id: &str) -> Result<Presence, DirectoryError> {
        Ok(Presence::Unknown)
    }
}
