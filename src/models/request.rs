use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::decision::Decision;
use super::normalize_emoji;

/// A chat message an application is waiting on a decision for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackedRequest {
    pub id: String,
    pub application_name: String,
    pub valid_emojis: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Time-to-live in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_secs: Option<u64>,
    #[serde(default)]
    pub events: Vec<RequestEvent>,
}

/// A validated, decision-relevant reaction recorded against a request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestEvent {
    pub id: String,
    pub at: DateTime<Utc>,
    pub emoji: String,
    pub approver: String,
    pub decision: Decision,
}

impl TrackedRequest {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let secs = i64::try_from(self.expire_secs?).ok()?;
        self.created_at.checked_add_signed(Duration::seconds(secs))
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|at| now >= at)
    }

    pub fn is_valid_emoji(&self, emoji: &str) -> bool {
        self.valid_emojis.contains(&normalize_emoji(emoji))
    }

    /// Every recorded event is terminal; at most one exists.
    pub fn terminal_event(&self) -> Option<&RequestEvent> {
        self.events.first()
    }

    pub fn view(&self) -> RequestView {
        RequestView {
            id: self.id.clone(),
            application_name: self.application_name.clone(),
            valid_emojis: self.valid_emojis.clone(),
            callback_url: self.callback_url.clone(),
            created_at: self.created_at,
            expires_at: self.expires_at(),
            events: self.events.clone(),
        }
    }
}

/// Request as exposed by read endpoints: the auth token is withheld.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestView {
    pub id: String,
    pub application_name: String,
    pub valid_emojis: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub events: Vec<RequestEvent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewRequest {
    #[serde(default)]
    pub app_name: String,
    #[serde(default)]
    pub valid_emojis: Vec<String>,
    pub callback_url: Option<String>,
    pub auth_token: Option<String>,
    /// Seconds the request stays trackable.
    pub expire: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedRequest {
    pub message_id: String,
}
