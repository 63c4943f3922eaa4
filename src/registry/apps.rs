use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use subtle::ConstantTimeEq;

use super::ids::{random_hex, ID_BYTES};
use crate::errors::AppError;
use crate::models::application::{
    normalize_approvers, Application, ApplicationPatch, NewApplication,
};
use crate::models::{normalize_key, validate_callback_url};

/// Registered applications keyed by normalized name.
#[derive(Debug, Clone, Default)]
pub struct ApplicationTable {
    apps: BTreeMap<String, Application>,
}

impl ApplicationTable {
    pub fn from_map(apps: BTreeMap<String, Application>) -> Self {
        Self { apps }
    }

    pub fn as_map(&self) -> &BTreeMap<String, Application> {
        &self.apps
    }

    pub fn register(
        &mut self,
        new: NewApplication,
        now: DateTime<Utc>,
    ) -> Result<Application, AppError> {
        let name = normalize_key(&new.name);
        if name.is_empty() {
            return Err(AppError::Validation("name is required".into()));
        }
        let callback_url = validate_callback_url(&new.callback_url)?;
        let authorized_approvers = normalize_approvers(&new.authorized_approvers);
        if authorized_approvers.is_empty() {
            return Err(AppError::Validation(
                "authorized_approvers must list at least one approver".into(),
            ));
        }
        if self.apps.contains_key(&name) {
            return Err(AppError::AlreadyExists(format!("application '{}'", name)));
        }

        let app = Application {
            name: name.clone(),
            callback_url,
            authorized_approvers,
            token: random_hex(ID_BYTES),
            created_at: now,
        };
        self.apps.insert(name, app.clone());
        Ok(app)
    }

    pub fn get(&self, name: &str) -> Result<&Application, AppError> {
        let key = normalize_key(name);
        self.apps
            .get(&key)
            .ok_or_else(|| AppError::NotFound(format!("application '{}'", key)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.apps.contains_key(&normalize_key(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Application)> {
        self.apps.iter()
    }

    /// Presenting the application token proves ownership.
    pub fn authenticate(&self, name: &str, token: &str) -> Result<&Application, AppError> {
        let app = self.get(name)?;
        if !tokens_match(&app.token, token) {
            return Err(AppError::Unauthorized);
        }
        Ok(app)
    }

    pub fn update(
        &mut self,
        name: &str,
        token: &str,
        patch: ApplicationPatch,
    ) -> Result<Application, AppError> {
        self.authenticate(name, token)?;

        let callback_url = patch
            .callback_url
            .as_deref()
            .map(validate_callback_url)
            .transpose()?;
        let approvers = patch.authorized_approvers.map(normalize_approvers);
        if approvers.as_ref().is_some_and(|a| a.is_empty()) {
            return Err(AppError::Validation(
                "authorized_approvers must list at least one approver".into(),
            ));
        }

        let app = self
            .apps
            .get_mut(&normalize_key(name))
            .ok_or_else(|| AppError::NotFound(format!("application '{}'", normalize_key(name))))?;
        if let Some(url) = callback_url {
            app.callback_url = url;
        }
        if let Some(approvers) = approvers {
            app.authorized_approvers = approvers;
        }
        Ok(app.clone())
    }

    pub fn unregister(&mut self, name: &str, token: &str) -> Result<Application, AppError> {
        self.authenticate(name, token)?;
        let key = normalize_key(name);
        self.apps
            .remove(&key)
            .ok_or_else(|| AppError::NotFound(format!("application '{}'", key)))
    }

    /// Unknown applications authorize nobody.
    pub fn is_authorized_approver(&self, name: &str, identity: &str) -> bool {
        self.get(name)
            .map(|app| app.is_authorized_approver(identity))
            .unwrap_or(false)
    }
}

pub(crate) fn tokens_match(expected: &str, provided: &str) -> bool {
    !expected.is_empty() && bool::from(expected.as_bytes().ct_eq(provided.as_bytes()))
}
