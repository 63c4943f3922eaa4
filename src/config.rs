use std::time::Duration;

use crate::notification::callback::RetryPolicy;

pub const DEFAULT_APPROVE_EMOJIS: &str = "white_check_mark,heavy_check_mark,+1,thumbsup";
pub const DEFAULT_REJECT_EMOJIS: &str = "x,no_entry,-1,thumbsdown";

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub state_file: String,
    pub debug: bool,
    /// Emit JSON log lines instead of the human formatter.
    pub log_json: bool,
    /// Socket Mode credential (`xapp-…`). Unset disables reaction intake.
    pub slack_app_token: Option<String>,
    /// Web API credential (`xoxb-…`) for user and message lookups.
    pub slack_bot_token: Option<String>,
    pub approve_emojis: Vec<String>,
    pub reject_emojis: Vec<String>,
    /// Upper bound on a request's `expire`, in seconds.
    pub max_expire_secs: u64,
    pub sweep_interval: Duration,
    pub dispatch: RetryPolicy,
}

impl Config {
    /// Build from any key lookup; `load` passes the process environment.
    pub fn from_lookup<F>(get: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let parsed = |key: &str| get(key).and_then(|v| v.trim().parse::<u64>().ok());
        let flag = |key: &str| {
            get(key)
                .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
                .unwrap_or(false)
        };
        let secret = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let defaults = RetryPolicy::default();
        Config {
            host: get("REACTGATE_HOST").unwrap_or_else(|| "127.0.0.1".into()),
            port: get("REACTGATE_PORT")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(8080),
            state_file: get("REACTGATE_STATE_FILE")
                .unwrap_or_else(|| "reactgate-state.json".into()),
            debug: flag("REACTGATE_DEBUG"),
            log_json: flag("REACTGATE_LOG_JSON"),
            slack_app_token: secret("SLACK_APP_TOKEN"),
            slack_bot_token: secret("SLACK_BOT_TOKEN"),
            approve_emojis: split_list(
                &get("REACTGATE_APPROVE_EMOJIS").unwrap_or_else(|| DEFAULT_APPROVE_EMOJIS.into()),
            ),
            reject_emojis: split_list(
                &get("REACTGATE_REJECT_EMOJIS").unwrap_or_else(|| DEFAULT_REJECT_EMOJIS.into()),
            ),
            max_expire_secs: parsed("REACTGATE_MAX_EXPIRE_SECS")
                .filter(|v| *v > 0)
                .unwrap_or(86_400),
            sweep_interval: Duration::from_secs(
                parsed("REACTGATE_SWEEP_INTERVAL_SECS")
                    .filter(|v| *v > 0)
                    .unwrap_or(300),
            ),
            dispatch: RetryPolicy {
                max_attempts: parsed("REACTGATE_DISPATCH_ATTEMPTS")
                    .and_then(|v| u32::try_from(v).ok())
                    .filter(|v| *v > 0)
                    .unwrap_or(defaults.max_attempts),
                base_backoff: parsed("REACTGATE_DISPATCH_BACKOFF_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.base_backoff),
                max_backoff: defaults.max_backoff,
                timeout: parsed("REACTGATE_DISPATCH_TIMEOUT_SECS")
                    .filter(|v| *v > 0)
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.timeout),
            },
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

pub fn load() -> Config {
    dotenvy::dotenv().ok();
    Config::from_lookup(|key| std::env::var(key).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Config {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[]);
        assert_eq!(cfg.bind_addr(), "127.0.0.1:8080");
        assert_eq!(cfg.state_file, "reactgate-state.json");
        assert!(!cfg.debug);
        assert!(cfg.slack_app_token.is_none());
        assert!(cfg.approve_emojis.contains(&"white_check_mark".to_string()));
        assert!(cfg.reject_emojis.contains(&"x".to_string()));
        assert_eq!(cfg.max_expire_secs, 86_400);
        assert_eq!(cfg.sweep_interval, Duration::from_secs(300));
        assert_eq!(cfg.dispatch.max_attempts, 4);
    }

    #[test]
    fn test_overrides() {
        let cfg = config(&[
            ("REACTGATE_HOST", "0.0.0.0"),
            ("REACTGATE_PORT", "9000"),
            ("REACTGATE_DEBUG", "TRUE"),
            ("SLACK_APP_TOKEN", " xapp-1 "),
            ("REACTGATE_APPROVE_EMOJIS", "check, ok_hand ,,"),
            ("REACTGATE_DISPATCH_ATTEMPTS", "2"),
            ("REACTGATE_DISPATCH_BACKOFF_MS", "50"),
        ]);
        assert_eq!(cfg.bind_addr(), "0.0.0.0:9000");
        assert!(cfg.debug);
        assert_eq!(cfg.slack_app_token.as_deref(), Some("xapp-1"));
        assert_eq!(cfg.approve_emojis, vec!["check", "ok_hand"]);
        assert_eq!(cfg.dispatch.max_attempts, 2);
        assert_eq!(cfg.dispatch.base_backoff, Duration::from_millis(50));
    }

    #[test]
    fn test_garbage_falls_back_to_defaults() {
        let cfg = config(&[
            ("REACTGATE_PORT", "not-a-port"),
            ("REACTGATE_MAX_EXPIRE_SECS", "0"),
            ("REACTGATE_DISPATCH_ATTEMPTS", "-3"),
            ("SLACK_BOT_TOKEN", "   "),
        ]);
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.max_expire_secs, 86_400);
        assert_eq!(cfg.dispatch.max_attempts, 4);
        assert!(cfg.slack_bot_token.is_none());
    }
}
