use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::normalize_key;

/// A registered application that wants decisions on its messages.
///
/// `token` is the bearer credential for mutating the application. It is
/// persisted with the application but only ever returned to callers once,
/// in the registration response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Application {
    pub name: String,
    pub callback_url: String,
    pub authorized_approvers: BTreeSet<String>,
    pub token: String,
    pub created_at: DateTime<Utc>,
}

impl Application {
    pub fn is_authorized_approver(&self, identity: &str) -> bool {
        let identity = normalize_key(identity);
        !identity.is_empty() && self.authorized_approvers.contains(&identity)
    }

    pub fn view(&self) -> ApplicationView {
        ApplicationView {
            name: self.name.clone(),
            callback_url: self.callback_url.clone(),
            authorized_approvers: self.authorized_approvers.clone(),
            created_at: self.created_at,
        }
    }
}

/// Normalize a caller-supplied approver list, dropping blanks.
pub fn normalize_approvers<I, S>(raw: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    raw.into_iter()
        .map(|a| normalize_key(a.as_ref()))
        .filter(|a| !a.is_empty())
        .collect()
}

/// Application as exposed by read endpoints: no token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApplicationView {
    pub name: String,
    pub callback_url: String,
    pub authorized_approvers: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
}

/// Registration response; the only place a token leaves the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredApplication {
    #[serde(flatten)]
    pub application: ApplicationView,
    pub token: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewApplication {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub callback_url: String,
    #[serde(default)]
    pub authorized_approvers: Vec<String>,
}

/// Fields a token holder may change. Name and token are immutable.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApplicationPatch {
    pub callback_url: Option<String>,
    pub authorized_approvers: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acme() -> Application {
        Application {
            name: "acme".into(),
            callback_url: "https://acme.test/hook".into(),
            authorized_approvers: normalize_approvers(["Alice@X.com ", "carol@x.com"]),
            token: "00112233445566778899".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_is_authorized_approver_normalizes() {
        let app = acme();
        assert!(app.is_authorized_approver("alice@x.com"));
        assert!(app.is_authorized_approver("  ALICE@x.com"));
        assert!(!app.is_authorized_approver("bob@x.com"));
        assert!(!app.is_authorized_approver(""));
        assert!(!app.is_authorized_approver("   "));
    }

    #[test]
    fn test_normalize_approvers_drops_blanks_and_duplicates() {
        let set = normalize_approvers(["a@x.com", " A@X.COM", "", "  "]);
        assert_eq!(set.len(), 1);
        assert!(set.contains("a@x.com"));
    }

    #[test]
    fn test_view_omits_token() {
        let json = serde_json::to_value(acme().view()).unwrap();
        assert!(json.get("token").is_none());
        assert_eq!(json["name"], "acme");
    }

    #[test]
    fn test_registered_application_flattens() {
        let app = acme();
        let registered = RegisteredApplication {
            application: app.view(),
            token: app.token.clone(),
        };
        let json = serde_json::to_value(&registered).unwrap();
        assert_eq!(json["name"], "acme");
        assert_eq!(json["callback_url"], "https://acme.test/hook");
        assert_eq!(json["token"], "00112233445566778899");
    }
}
