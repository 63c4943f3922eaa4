//! Correlator: turns inbound reaction events into at-most-once decisions.
//!
//! Events are consumed one at a time in arrival order from a single channel,
//! so two reactions on the same request are never processed concurrently.
//! For each event:
//!
//! 1. Parse the correlation metadata embedded in the reacted message.
//! 2. Drop emojis that are not a decision signal.
//! 3. Resolve the pending request and its application.
//! 4. Resolve the reacting user and check they may decide.
//! 5. Record the terminal event, dispatch, and remove the request whatever
//!    the dispatch outcome.
//!
//! Nothing in here returns an error to the loop: every failure is logged
//! and the event dropped.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::authorizer::{can_decide, EmojiClass, EmojiPolicy};
use crate::errors::AppError;
use crate::models::decision::{CallbackTarget, Decision, DecisionPayload};
use crate::models::request::RequestEvent;
use crate::models::{normalize_emoji, normalize_key};
use crate::notification::callback::DecisionDispatcher;
use crate::redact::mask_id;
use crate::registry::Registry;

/// A decoded "reaction added" event from the chat platform.
#[derive(Debug, Clone, PartialEq)]
pub struct ReactionEvent {
    /// Chat-platform user id of the person who reacted.
    pub user_id: String,
    pub emoji: String,
    pub channel: Option<String>,
    pub message_ts: Option<String>,
    /// Correlation metadata embedded in the reacted message, if any.
    pub metadata: Option<String>,
}

/// The JSON object an application embeds in its chat message.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CorrelationMetadata {
    #[serde(alias = "message_id")]
    pub request_id: String,
    #[serde(default, alias = "app")]
    pub app_name: Option<String>,
}

impl CorrelationMetadata {
    pub fn parse(raw: &str) -> Option<Self> {
        let meta: CorrelationMetadata = serde_json::from_str(raw.trim()).ok()?;
        let request_id = meta.request_id.trim().to_string();
        if request_id.is_empty() {
            return None;
        }
        Some(Self {
            request_id,
            app_name: meta
                .app_name
                .map(|a| normalize_key(&a))
                .filter(|a| !a.is_empty()),
        })
    }
}

/// Maps a chat-platform user id to the identity approvers are listed by.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, user_id: &str) -> anyhow::Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// No metadata, or metadata that does not parse.
    Malformed,
    /// Not a decision emoji for this request.
    Ignored,
    /// Unknown, expired, or already resolved request id.
    UnknownRequest,
    /// The metadata names a different application than the request's owner.
    AppMismatch,
    /// The owning application was unregistered.
    OrphanedRequest,
    UnresolvedIdentity,
    Unauthorized,
    AlreadyDecided,
    /// The decision could not be persisted; the request stays pending.
    NotRecorded,
    Decided { decision: Decision, delivered: bool },
}

pub struct Correlator {
    registry: Arc<Registry>,
    policy: EmojiPolicy,
    resolver: Arc<dyn IdentityResolver>,
    dispatcher: Arc<dyn DecisionDispatcher>,
}

impl Correlator {
    pub fn new(
        registry: Arc<Registry>,
        policy: EmojiPolicy,
        resolver: Arc<dyn IdentityResolver>,
        dispatcher: Arc<dyn DecisionDispatcher>,
    ) -> Self {
        Self {
            registry,
            policy,
            resolver,
            dispatcher,
        }
    }

    /// Consume events until every sender is dropped.
    pub async fn run(self, mut events: mpsc::Receiver<ReactionEvent>) {
        info!("reaction consumer started");
        while let Some(event) = events.recv().await {
            let outcome = self.handle(event).await;
            debug!(?outcome, "reaction processed");
        }
        info!("reaction intake closed, consumer stopping");
    }

    pub async fn handle(&self, event: ReactionEvent) -> Outcome {
        let meta = match event.metadata.as_deref() {
            None => {
                debug!(channel = ?event.channel, "reaction on a message without correlation metadata");
                return Outcome::Malformed;
            }
            Some(raw) => match CorrelationMetadata::parse(raw) {
                Some(meta) => meta,
                None => {
                    info!(channel = ?event.channel, "dropping reaction with malformed correlation metadata");
                    return Outcome::Malformed;
                }
            },
        };
        let request_tag = mask_id(&meta.request_id);

        if self.policy.global_class(&event.emoji) == EmojiClass::Ignore {
            debug!(request = %request_tag, emoji = %event.emoji, "not a decision emoji");
            return Outcome::Ignored;
        }

        let request = match self.registry.get_request(&meta.request_id).await {
            Ok(request) => request,
            Err(_) => {
                info!(request = %request_tag, "reaction for unknown, expired or resolved request");
                return Outcome::UnknownRequest;
            }
        };

        let decision = match self.policy.classify_emoji(&request, &event.emoji).decision() {
            Some(decision) => decision,
            None => {
                debug!(request = %request_tag, emoji = %event.emoji, "emoji not valid for this request");
                return Outcome::Ignored;
            }
        };

        if let Some(hint) = &meta.app_name {
            if *hint != request.application_name {
                warn!(
                    request = %request_tag,
                    app = %request.application_name,
                    claimed_app = %hint,
                    "correlation metadata names a different application"
                );
                return Outcome::AppMismatch;
            }
        }

        let app = match self.registry.get_app(&request.application_name).await {
            Ok(app) => app,
            Err(_) => {
                warn!(
                    request = %request_tag,
                    app = %request.application_name,
                    "request belongs to an unregistered application"
                );
                return Outcome::OrphanedRequest;
            }
        };

        let identity = match self.resolver.resolve(&event.user_id).await {
            Ok(identity) => normalize_key(&identity),
            Err(e) => {
                warn!(request = %request_tag, user = %event.user_id, error = %e, "could not resolve reacting user");
                return Outcome::UnresolvedIdentity;
            }
        };
        if !can_decide(&app, &identity) {
            info!(
                request = %request_tag,
                app = %app.name,
                user = %event.user_id,
                "reaction from a user who is not an approver"
            );
            return Outcome::Unauthorized;
        }

        let recorded = RequestEvent {
            id: uuid::Uuid::new_v4().to_string(),
            at: Utc::now(),
            emoji: normalize_emoji(&event.emoji),
            approver: identity,
            decision,
        };
        if let Err(e) = self.registry.record_decision(&request.id, recorded.clone()).await {
            return match e {
                AppError::AlreadyExists(_) => {
                    info!(request = %request_tag, "request already decided");
                    Outcome::AlreadyDecided
                }
                AppError::NotFound(_) => {
                    info!(request = %request_tag, "request resolved concurrently");
                    Outcome::UnknownRequest
                }
                other => {
                    error!(request = %request_tag, error = %other, "could not record decision");
                    Outcome::NotRecorded
                }
            };
        }

        let target = CallbackTarget::resolve(&request, &app);
        let payload = DecisionPayload::new(&request.id, &target, &recorded);
        let delivered = match self.dispatcher.deliver(&target, &payload).await {
            Ok(()) => true,
            Err(e) => {
                error!(request = %request_tag, app = %app.name, error = %e, "decision delivery failed");
                false
            }
        };

        if let Err(e) = self.registry.delete_request(&request.id).await {
            warn!(request = %request_tag, error = %e, "could not remove decided request");
        }

        info!(
            request = %request_tag,
            app = %app.name,
            decision = ?decision,
            delivered,
            "decision resolved"
        );
        Outcome::Decided { decision, delivered }
    }
}
