//! Registry: the single owner of applications and pending requests.
//!
//! Both tables live behind one `RwLock` so that multi-step sequences
//! ("application exists, then insert request"; "append decision, then
//! remove") are atomic with respect to the management API and the reaction
//! consumer.
//!
//! Every mutation is applied to a copy of the tables, persisted through the
//! [`StateStore`], and only then committed. A failed save leaves memory and
//! disk agreeing on the previous state.

pub mod apps;
pub mod ids;
pub mod requests;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::errors::AppError;
use crate::models::application::{Application, ApplicationPatch, ApplicationView, NewApplication};
use crate::models::request::{NewRequest, RequestEvent, RequestView, TrackedRequest};
use crate::redact::mask_id;
use crate::store::{Snapshot, StateStore};

use apps::{tokens_match, ApplicationTable};
use requests::RequestTable;

#[derive(Debug, Clone, Default)]
struct Tables {
    apps: ApplicationTable,
    requests: RequestTable,
}

impl Tables {
    fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            apps: ApplicationTable::from_map(snapshot.apps),
            requests: RequestTable::from_map(snapshot.requests),
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            apps: self.apps.as_map().clone(),
            requests: self.requests.as_map().clone(),
            ..Snapshot::default()
        }
    }
}

pub struct Registry {
    tables: RwLock<Tables>,
    store: Arc<dyn StateStore>,
    max_expire_secs: u64,
}

impl Registry {
    /// An empty registry. Nothing is read from `store`.
    pub fn new(store: Arc<dyn StateStore>, max_expire_secs: u64) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            store,
            max_expire_secs,
        }
    }

    /// Load the last snapshot, discarding requests that were already decided
    /// (a crash between recording and removal) or that expired while down.
    pub async fn restore(store: Arc<dyn StateStore>, max_expire_secs: u64) -> anyhow::Result<Self> {
        let snapshot = store
            .load()
            .await
            .context("failed to load registry snapshot")?
            .unwrap_or_default();
        let mut tables = Tables::from_snapshot(snapshot);

        let decided = tables.requests.drop_decided();
        for id in &decided {
            tracing::info!(request = %mask_id(id), "dropping request decided before restart");
        }
        let expired = tables.requests.sweep_expired(Utc::now());
        for id in &expired {
            tracing::info!(request = %mask_id(id), "dropping request expired while down");
        }
        if !decided.is_empty() || !expired.is_empty() {
            store
                .save(&tables.snapshot())
                .await
                .context("failed to save pruned registry snapshot")?;
        }

        tracing::info!(
            apps = tables.apps.as_map().len(),
            requests = tables.requests.as_map().len(),
            "registry restored"
        );

        Ok(Self {
            tables: RwLock::new(tables),
            store,
            max_expire_secs,
        })
    }

    async fn mutate<T>(
        &self,
        f: impl FnOnce(&mut Tables) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let mut guard = self.tables.write().await;
        let mut next = guard.clone();
        let out = f(&mut next)?;
        self.store.save(&next.snapshot()).await?;
        *guard = next;
        Ok(out)
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.tables.read().await.snapshot()
    }

    // ── Applications ────────────────────────────────────────────

    pub async fn register_app(&self, new: NewApplication) -> Result<Application, AppError> {
        let app = self
            .mutate(|t| t.apps.register(new, Utc::now()))
            .await?;
        tracing::info!(app = %app.name, approvers = app.authorized_approvers.len(), "application registered");
        Ok(app)
    }

    pub async fn get_app(&self, name: &str) -> Result<Application, AppError> {
        self.tables.read().await.apps.get(name).cloned()
    }

    pub async fn list_apps(&self) -> BTreeMap<String, ApplicationView> {
        self.tables
            .read()
            .await
            .apps
            .iter()
            .map(|(name, app)| (name.clone(), app.view()))
            .collect()
    }

    pub async fn update_app(
        &self,
        name: &str,
        token: &str,
        patch: ApplicationPatch,
    ) -> Result<Application, AppError> {
        let app = self
            .mutate(|t| t.apps.update(name, token, patch))
            .await?;
        tracing::info!(app = %app.name, "application updated");
        Ok(app)
    }

    /// Pending requests of the application are left in place.
    pub async fn unregister_app(&self, name: &str, token: &str) -> Result<(), AppError> {
        let app = self
            .mutate(|t| t.apps.unregister(name, token))
            .await?;
        tracing::info!(app = %app.name, "application unregistered");
        Ok(())
    }

    pub async fn is_authorized_approver(&self, name: &str, identity: &str) -> bool {
        self.tables
            .read()
            .await
            .apps
            .is_authorized_approver(name, identity)
    }

    // ── Requests ────────────────────────────────────────────────

    pub async fn create_request(&self, new: NewRequest) -> Result<TrackedRequest, AppError> {
        let max_expire_secs = self.max_expire_secs;
        let request = self
            .mutate(|t| {
                t.requests
                    .create(&t.apps, new, max_expire_secs, Utc::now())
            })
            .await?;
        tracing::info!(
            request = %mask_id(&request.id),
            app = %request.application_name,
            "request registered"
        );
        Ok(request)
    }

    pub async fn get_request(&self, id: &str) -> Result<TrackedRequest, AppError> {
        self.tables
            .read()
            .await
            .requests
            .get(id, Utc::now())
            .cloned()
    }

    pub async fn list_requests(&self) -> BTreeMap<String, RequestView> {
        self.tables
            .read()
            .await
            .requests
            .iter_live(Utc::now())
            .map(|r| (r.id.clone(), r.view()))
            .collect()
    }

    pub async fn delete_request(&self, id: &str) -> Result<TrackedRequest, AppError> {
        self.mutate(|t| t.requests.delete(id)).await
    }

    /// Management-API delete: the caller must present the request's own auth
    /// token, or the owning application's token when the request has none.
    /// A request whose decision is already recorded belongs to the correlator
    /// and is refused with `AlreadyExists`.
    pub async fn delete_request_authorized(&self, id: &str, token: &str) -> Result<(), AppError> {
        self.mutate(|t| {
            let request = t.requests.get(id, Utc::now())?;
            let expected = match &request.auth_token {
                Some(own) => own.clone(),
                None => t
                    .apps
                    .get(&request.application_name)
                    .map(|app| app.token.clone())
                    .map_err(|_| AppError::Unauthorized)?,
            };
            if !tokens_match(&expected, token) {
                return Err(AppError::Unauthorized);
            }
            if request.terminal_event().is_some() {
                return Err(AppError::AlreadyExists("decision for request".into()));
            }
            t.requests.delete(id)
        })
        .await?;
        tracing::info!(request = %mask_id(id), "request deleted by owner");
        Ok(())
    }

    pub async fn is_valid_emoji(&self, id: &str, emoji: &str) -> bool {
        self.tables
            .read()
            .await
            .requests
            .is_valid_emoji(id, emoji, Utc::now())
    }

    /// Persist the terminal event before anything is dispatched.
    pub async fn record_decision(
        &self,
        id: &str,
        event: RequestEvent,
    ) -> Result<TrackedRequest, AppError> {
        self.mutate(|t| t.requests.append_event(id, event, Utc::now()))
            .await
    }

    pub async fn sweep_expired(&self) -> Result<Vec<String>, AppError> {
        self.sweep_expired_at(Utc::now()).await
    }

    pub async fn sweep_expired_at(&self, now: DateTime<Utc>) -> Result<Vec<String>, AppError> {
        if !self.tables.read().await.requests.has_expired(now) {
            return Ok(Vec::new());
        }
        self.mutate(|t| Ok(t.requests.sweep_expired(now))).await
    }
}
