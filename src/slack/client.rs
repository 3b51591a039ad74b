//! Slack Web API client.
//!
//! Thin `reqwest` wrapper over four methods: `users.info`,
//! `users.getPresence`, `users.list`, and `apps.connections.open`. Response
//! parsing lives in pure `parse_*` functions for testability.

use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info};

use super::{SlackError, SlackUser};
use crate::config::SlackConfig;
use crate::services::directory::{DirectoryError, UserDirectory};
use crate::services::presence::Presence;
use crate::store::{PersonProfile, RecordStore};

const API_BASE: &str = "https://slack.com/api";
const REQUEST_TIMEOUT_SECS: u64 = 30;
const CONNECT_TIMEOUT_SECS: u64 = 10;
const USERS_PAGE_SIZE: &str = "200";

// =============================================================================
// CLIENT
// =============================================================================

pub struct SlackClient {
    http: reqwest::Client,
    bot_token: String,
    app_token: String,
}

impl SlackClient {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &SlackConfig) -> Result<Self, SlackError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| SlackError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, bot_token: config.bot_token.clone(), app_token: config.app_token.clone() })
    }

    /// Full user record for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-ok API response.
    pub async fn user_info(&self, user_id: &str) -> Result<SlackUser, SlackError> {
        let body = self.get("users.info", &[("user", user_id)]).await?;
        parse_user_info(&body)
    }

    /// Current presence for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-ok API response.
    pub async fn presence(&self, user_id: &str) -> Result<Presence, SlackError> {
        let body = self.get("users.getPresence", &[("user", user_id)]).await?;
        parse_presence(&body)
    }

    /// Every workspace member, following pagination cursors.
    ///
    /// # Errors
    ///
    /// Returns an error if any page fails.
    pub async fn list_users(&self) -> Result<Vec<SlackUser>, SlackError> {
        let mut users = Vec::new();
        let mut cursor = String::new();
        loop {
            let body = self
                .get("users.list", &[("limit", USERS_PAGE_SIZE), ("cursor", cursor.as_str())])
                .await?;
            let (page, next) = parse_user_page(&body)?;
            users.extend(page);
            match next {
                Some(next) => cursor = next,
                None => break,
            }
        }
        Ok(users)
    }

    /// A fresh Socket Mode websocket URL. Uses the app-level token.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-ok API response.
    pub async fn open_socket_url(&self) -> Result<String, SlackError> {
        let response = self
            .http
            .post(format!("{API_BASE}/apps.connections.open"))
            .bearer_auth(&self.app_token)
            .send()
            .await?;
        let body = read_body("apps.connections.open", response).await?;
        parse_socket_url(&body)
    }

    /// Upsert every trackable workspace member. Returns how many were stored.
    ///
    /// Per-user store failures are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error only if the member list cannot be fetched.
    pub async fn sync_users(&self, store: &dyn RecordStore) -> Result<usize, SlackError> {
        let users = self.list_users().await?;
        let mut synced = 0_usize;
        for user in users.iter().filter(|u| u.is_trackable()) {
            match store.upsert_person(&user.to_profile()).await {
                Ok(_) => synced += 1,
                Err(e) => error!(user = %user.id, error = %e, "slack: user sync failed"),
            }
        }
        info!(members = users.len(), synced, "slack: user sync complete");
        Ok(synced)
    }

    async fn get(&self, method: &str, query: &[(&str, &str)]) -> Result<String, SlackError> {
        debug!(method, "slack: api call");
        let response = self
            .http
            .get(format!("{API_BASE}/{method}"))
            .bearer_auth(&self.bot_token)
            .query(query)
            .send()
            .await?;
        read_body(method, response).await
    }
}

async fn read_body(method: &str, response: reqwest::Response) -> Result<String, SlackError> {
    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
        return Err(SlackError::Api(format!("{method}: http {}", status.as_u16())));
    }
    Ok(text)
}

#[async_trait::async_trait]
impl UserDirectory for SlackClient {
    async fn profile(&self, external_id: &str) -> Result<PersonProfile, DirectoryError> {
        match self.user_info(external_id).await {
            Ok(user) => Ok(user.to_profile()),
            Err(SlackError::Api(code)) if code == "user_not_found" => Err(DirectoryError::NotFound(external_id.to_string())),
            Err(e) => Err(DirectoryError::Lookup(e.to_string())),
        }
    }

    async fn presence(&self, external_id: &str) -> Result<Presence, DirectoryError> {
        SlackClient::presence(self, external_id)
            .await
            .map_err(|e| DirectoryError::Lookup(e.to_string()))
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Deserialize)]
struct ApiStatus {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct UserInfoResponse {
    user: SlackUser,
}

#[derive(Deserialize)]
struct PresenceResponse {
    #[serde(default)]
    presence: String,
}

#[derive(Deserialize)]
struct UsersListResponse {
    #[serde(default)]
    members: Vec<SlackUser>,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

#[derive(Deserialize)]
struct ConnectionsOpenResponse {
    url: String,
}

// =============================================================================
// PARSING
// =============================================================================

/// Check the `ok` flag, then decode the full body as `T`.
fn parse_ok<T: DeserializeOwned>(body: &str) -> Result<T, SlackError> {
    let status: ApiStatus = serde_json::from_str(body)?;
    if !status.ok {
        return Err(SlackError::Api(status.error.unwrap_or_else(|| "unknown_error".into())));
    }
    Ok(serde_json::from_str(body)?)
}

fn parse_user_info(body: &str) -> Result<SlackUser, SlackError> {
    parse_ok::<UserInfoResponse>(body).map(|r| r.user)
}

fn parse_presence(body: &str) -> Result<Presence, SlackError> {
    parse_ok::<PresenceResponse>(body).map(|r| Presence::from_slack(&r.presence))
}

/// One page of members plus the next cursor, `None` on the last page.
fn parse_user_page(body: &str) -> Result<(Vec<SlackUser>, Option<String>), SlackError> {
    let page: UsersListResponse = parse_ok(body)?;
    let next = page
        .response_metadata
        .map(|m| m.next_cursor)
        .filter(|c| !c.is_empty());
    Ok((page.members, next))
}

fn parse_socket_url(body: &str) -> Result<String, SlackError> {
    parse_ok::<ConnectionsOpenResponse>(body).map(|r| r.url)
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
