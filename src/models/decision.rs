use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::application::Application;
use super::request::{RequestEvent, TrackedRequest};

/// Wire version of [`DecisionPayload`]. Bump on breaking field changes.
pub const PAYLOAD_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    pub fn is_approved(self) -> bool {
        matches!(self, Decision::Approved)
    }
}

/// Where a decision is delivered and which token authenticates it.
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackTarget {
    pub url: String,
    pub token: String,
}

impl CallbackTarget {
    /// Per-request overrides win; otherwise the application's values are used.
    pub fn resolve(request: &TrackedRequest, app: &Application) -> Self {
        Self {
            url: request
                .callback_url
                .clone()
                .unwrap_or_else(|| app.callback_url.clone()),
            token: request
                .auth_token
                .clone()
                .unwrap_or_else(|| app.token.clone()),
        }
    }
}

/// Body POSTed to an application's callback URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionPayload {
    pub version: u32,
    pub request_id: String,
    pub token: String,
    pub decider_identity: String,
    pub is_approved: bool,
    pub emoji_used: String,
    pub decided_at: DateTime<Utc>,
}

impl DecisionPayload {
    pub fn new(request_id: &str, target: &CallbackTarget, event: &RequestEvent) -> Self {
        Self {
            version: PAYLOAD_VERSION,
            request_id: request_id.to_string(),
            token: target.token.clone(),
            decider_identity: event.approver.clone(),
            is_approved: event.decision.is_approved(),
            emoji_used: event.emoji.clone(),
            decided_at: event.at,
        }
    }
}
