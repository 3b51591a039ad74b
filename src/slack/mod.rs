//! Slack adapter — Web API client and Socket Mode event loop.
//!
//! SYSTEM CONTEXT
//! ==============
//! Slack is the inbound collaborator. `client` wraps the handful of Web API
//! methods the tracker needs and doubles as the `UserDirectory`; `socket`
//! keeps a Socket Mode connection open and feeds `user_status_changed`
//! events into the dispatcher.
//!
//! Wire types below are deliberately partial: unknown fields are ignored and
//! everything optional defaults, so Slack payload drift never fails a parse.

pub mod client;
pub mod socket;

use serde::Deserialize;

use crate::store::PersonProfile;

#[derive(Debug, thiserror::Error)]
pub enum SlackError {
    #[error("http client build failed: {0}")]
    HttpClientBuild(String),
    #[error("slack request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("slack api error: {0}")]
    Api(String),
    #[error("slack response parse failed: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("socket mode: {0}")]
    Socket(String),
}

/// `user` object from `users.info`, `users.list`, and status events.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlackUser {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub real_name: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub profile: SlackProfile,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlackProfile {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub real_name: String,
    #[serde(default)]
    pub image_192: String,
    #[serde(default)]
    pub status_text: String,
    #[serde(default)]
    pub status_emoji: String,
}

impl SlackUser {
    #[must_use]
    pub fn to_profile(&self) -> PersonProfile {
        let real_name = if self.real_name.is_empty() { &self.profile.real_name } else { &self.real_name };
        PersonProfile {
            external_id: self.id.clone(),
            name: self.name.clone(),
            email: self.profile.email.clone(),
            real_name: real_name.clone(),
            avatar_url: self.profile.image_192.clone(),
        }
    }

    /// Humans with an email; bots and deactivated accounts are not tracked.
    #[must_use]
    pub fn is_trackable(&self) -> bool {
        !self.is_bot && !self.deleted && !self.profile.email.is_empty()
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
