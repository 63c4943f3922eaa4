use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use super::apps::ApplicationTable;
use super::ids::{generate_unique_id, random_hex, ID_BYTES};
use crate::errors::AppError;
use crate::models::request::{NewRequest, RequestEvent, TrackedRequest};
use crate::models::{normalize_emoji, normalize_key, validate_callback_url};

/// Pending requests keyed by id.
///
/// Expired requests are invisible to every read (`get`, `iter_live`,
/// `is_valid_emoji`) even before the sweep removes them.
#[derive(Debug, Clone, Default)]
pub struct RequestTable {
    requests: BTreeMap<String, TrackedRequest>,
}

impl RequestTable {
    pub fn from_map(requests: BTreeMap<String, TrackedRequest>) -> Self {
        Self { requests }
    }

    pub fn as_map(&self) -> &BTreeMap<String, TrackedRequest> {
        &self.requests
    }

    pub fn create(
        &mut self,
        apps: &ApplicationTable,
        new: NewRequest,
        max_expire_secs: u64,
        now: DateTime<Utc>,
    ) -> Result<TrackedRequest, AppError> {
        let application_name = normalize_key(&new.app_name);
        if application_name.is_empty() {
            return Err(AppError::Validation("app_name is required".into()));
        }
        let valid_emojis: BTreeSet<String> = new
            .valid_emojis
            .iter()
            .map(|e| normalize_emoji(e))
            .filter(|e| !e.is_empty())
            .collect();
        if valid_emojis.is_empty() {
            return Err(AppError::Validation(
                "valid_emojis must list at least one emoji".into(),
            ));
        }
        let callback_url = new
            .callback_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .map(validate_callback_url)
            .transpose()?;
        let auth_token = new
            .auth_token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        if let Some(expire) = new.expire {
            if expire == 0 || expire > max_expire_secs {
                return Err(AppError::Validation(format!(
                    "expire must be between 1 and {} seconds",
                    max_expire_secs
                )));
            }
        }
        if !apps.contains(&application_name) {
            return Err(AppError::NotFound(format!(
                "application '{}'",
                application_name
            )));
        }

        let id = generate_unique_id(|| random_hex(ID_BYTES), |c| self.requests.contains_key(c))?;
        let request = TrackedRequest {
            id: id.clone(),
            application_name,
            valid_emojis,
            callback_url,
            auth_token,
            created_at: now,
            expire_secs: new.expire,
            events: Vec::new(),
        };
        self.requests.insert(id, request.clone());
        Ok(request)
    }

    pub fn get(&self, id: &str, now: DateTime<Utc>) -> Result<&TrackedRequest, AppError> {
        self.requests
            .get(id)
            .filter(|r| !r.is_expired(now))
            .ok_or_else(|| AppError::NotFound("request".into()))
    }

    pub fn iter_live(&self, now: DateTime<Utc>) -> impl Iterator<Item = &TrackedRequest> {
        self.requests.values().filter(move |r| !r.is_expired(now))
    }

    /// Not idempotent: removing an absent id is `NotFound`.
    pub fn delete(&mut self, id: &str) -> Result<TrackedRequest, AppError> {
        self.requests
            .remove(id)
            .ok_or_else(|| AppError::NotFound("request".into()))
    }

    pub fn is_valid_emoji(&self, id: &str, emoji: &str, now: DateTime<Utc>) -> bool {
        self.get(id, now)
            .map(|r| r.is_valid_emoji(emoji))
            .unwrap_or(false)
    }

    /// Append the terminal event. A request takes at most one.
    pub fn append_event(
        &mut self,
        id: &str,
        event: RequestEvent,
        now: DateTime<Utc>,
    ) -> Result<TrackedRequest, AppError> {
        let request = self
            .requests
            .get_mut(id)
            .filter(|r| !r.is_expired(now))
            .ok_or_else(|| AppError::NotFound("request".into()))?;
        if request.terminal_event().is_some() {
            return Err(AppError::AlreadyExists("decision for request".into()));
        }
        request.events.push(event);
        Ok(request.clone())
    }

    pub fn has_expired(&self, now: DateTime<Utc>) -> bool {
        self.requests.values().any(|r| r.is_expired(now))
    }

    /// Remove expired requests, returning their ids.
    pub fn sweep_expired(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let expired: Vec<String> = self
            .requests
            .values()
            .filter(|r| r.is_expired(now))
            .map(|r| r.id.clone())
            .collect();
        for id in &expired {
            self.requests.remove(id);
        }
        expired
    }

    /// Remove requests that already carry a terminal event, returning their ids.
    pub fn drop_decided(&mut self) -> Vec<String> {
        let decided: Vec<String> = self
            .requests
            .values()
            .filter(|r| r.terminal_event().is_some())
            .map(|r| r.id.clone())
            .collect();
        for id in &decided {
            self.requests.remove(id);
        }
        decided
    }
}
