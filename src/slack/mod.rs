//! Slack Web API client: the identity and message lookups the correlator
//! needs, plus the Socket Mode handshake used by [`socket`].

pub mod socket;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::correlator::IdentityResolver;

pub const SLACK_API_BASE: &str = "https://slack.com/api";

#[derive(Clone)]
pub struct SlackClient {
    client: reqwest::Client,
    base_url: String,
    bot_token: String,
    app_token: Option<String>,
}

#[derive(Deserialize)]
struct UsersInfoResponse {
    ok: bool,
    error: Option<String>,
    user: Option<SlackUser>,
}

#[derive(Deserialize)]
struct SlackUser {
    profile: Option<SlackProfile>,
}

#[derive(Deserialize)]
struct SlackProfile {
    email: Option<String>,
}

#[derive(Deserialize)]
struct HistoryResponse {
    ok: bool,
    error: Option<String>,
    #[serde(default)]
    messages: Vec<HistoryMessage>,
}

#[derive(Deserialize)]
struct HistoryMessage {
    #[serde(default)]
    ts: String,
    #[serde(default)]
    attachments: Vec<Attachment>,
    metadata: Option<MessageMetadata>,
}

#[derive(Deserialize)]
struct Attachment {
    callback_id: Option<String>,
}

#[derive(Deserialize)]
struct MessageMetadata {
    event_payload: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct ConnectionsOpenResponse {
    ok: bool,
    error: Option<String>,
    url: Option<String>,
}

fn correlation_of(message: HistoryMessage) -> Option<String> {
    let from_attachment = message
        .attachments
        .into_iter()
        .filter_map(|a| a.callback_id)
        .find(|id| !id.trim().is_empty());
    if from_attachment.is_some() {
        return from_attachment;
    }
    message
        .metadata
        .and_then(|m| m.event_payload)
        .map(|payload| payload.to_string())
}

/// Slack answers 200 with `ok: false` on API errors.
fn check_ok(ok: bool, error: Option<String>, method: &str) -> Result<()> {
    if !ok {
        anyhow::bail!(
            "slack {} failed: {}",
            method,
            error.unwrap_or_else(|| "unknown_error".into())
        );
    }
    Ok(())
}

impl SlackClient {
    pub fn new(bot_token: impl Into<String>, app_token: Option<String>) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .context("failed to build slack HTTP client")?,
            base_url: SLACK_API_BASE.to_string(),
            bot_token: bot_token.into(),
            app_token,
        })
    }

    /// Point the client at another API root (tests, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    /// Email address on the user's profile.
    pub async fn user_email(&self, user_id: &str) -> Result<String> {
        let resp: UsersInfoResponse = self
            .client
            .get(self.url("users.info"))
            .bearer_auth(&self.bot_token)
            .query(&[("user", user_id)])
            .send()
            .await
            .context("failed to call users.info")?
            .error_for_status()?
            .json()
            .await
            .context("failed to decode users.info response")?;
        check_ok(resp.ok, resp.error, "users.info")?;

        resp.user
            .and_then(|u| u.profile)
            .and_then(|p| p.email)
            .filter(|e| !e.trim().is_empty())
            .with_context(|| format!("user {} has no email on their profile", user_id))
    }

    /// Correlation metadata of the message at `ts`: the first attachment's
    /// `callback_id`, else the message metadata payload as JSON.
    ///
    /// Only the message whose `ts` matches is considered. Thread replies are
    /// not in channel history, so a miss falls back to `conversations.replies`.
    pub async fn message_metadata(&self, channel: &str, ts: &str) -> Result<Option<String>> {
        let history = self
            .fetch_messages(
                "conversations.history",
                &[
                    ("channel", channel),
                    ("latest", ts),
                    ("inclusive", "true"),
                    ("limit", "1"),
                ],
            )
            .await?;
        if let Some(message) = history.into_iter().find(|m| m.ts == ts) {
            return Ok(correlation_of(message));
        }

        let replies = self
            .fetch_messages(
                "conversations.replies",
                &[
                    ("channel", channel),
                    ("ts", ts),
                    ("oldest", ts),
                    ("latest", ts),
                    ("inclusive", "true"),
                ],
            )
            .await?;
        match replies.into_iter().find(|m| m.ts == ts) {
            Some(message) => Ok(correlation_of(message)),
            None => {
                tracing::debug!(channel, ts, "reacted message not found in history or replies");
                Ok(None)
            }
        }
    }

    async fn fetch_messages(
        &self,
        method: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<HistoryMessage>> {
        let resp: HistoryResponse = self
            .client
            .get(self.url(method))
            .bearer_auth(&self.bot_token)
            .query(query)
            .send()
            .await
            .with_context(|| format!("failed to call {}", method))?
            .error_for_status()?
            .json()
            .await
            .with_context(|| format!("failed to decode {} response", method))?;
        check_ok(resp.ok, resp.error, method)?;
        Ok(resp.messages)
    }

    /// Ask for a Socket Mode WebSocket URL. Requires the app-level token.
    pub async fn open_socket_url(&self) -> Result<String> {
        let app_token = self
            .app_token
            .as_deref()
            .context("no slack app token configured")?;
        let resp: ConnectionsOpenResponse = self
            .client
            .post(self.url("apps.connections.open"))
            .bearer_auth(app_token)
            .send()
            .await
            .context("failed to call apps.connections.open")?
            .error_for_status()?
            .json()
            .await
            .context("failed to decode apps.connections.open response")?;
        check_ok(resp.ok, resp.error, "apps.connections.open")?;
        resp.url.context("apps.connections.open returned no url")
    }
}

#[async_trait]
impl IdentityResolver for SlackClient {
    async fn resolve(&self, user_id: &str) -> Result<String> {
        self.user_email(user_id).await
    }
}
