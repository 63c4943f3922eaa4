use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, info, warn};

use crate::errors::AppError;
use crate::models::decision::{CallbackTarget, DecisionPayload};
use crate::redact::mask_id;

/// Delivers a final decision to the owning application.
#[async_trait]
pub trait DecisionDispatcher: Send + Sync {
    async fn deliver(
        &self,
        target: &CallbackTarget,
        payload: &DecisionPayload,
    ) -> Result<(), AppError>;
}

/// Retry budget for connection-level failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    /// Per-attempt HTTP timeout.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): base * 2^(retry-1), capped.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// Compute HMAC-SHA256 of `payload` keyed by `secret`, as `sha256=<hex>`.
pub fn hmac_sha256_hex(secret: &str, payload: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(payload);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// POSTs decisions as JSON.
///
/// - `X-Reactgate-Signature` carries an HMAC-SHA256 of the body keyed by the
///   same token that is inside the body.
/// - Connection failures are retried with exponential back-off up to
///   [`RetryPolicy::max_attempts`].
/// - Any answer other than 200/204 is final: `DispatchFailed { status }`.
#[derive(Clone)]
pub struct HttpDispatcher {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl HttpDispatcher {
    pub fn new(policy: RetryPolicy) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(policy.timeout)
            .user_agent(concat!("reactgate/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, policy })
    }
}

#[async_trait]
impl DecisionDispatcher for HttpDispatcher {
    async fn deliver(
        &self,
        target: &CallbackTarget,
        payload: &DecisionPayload,
    ) -> Result<(), AppError> {
        let body = serde_json::to_vec(payload)
            .map_err(|e| AppError::Transport(format!("payload encoding failed: {}", e)))?;
        let delivery_id = uuid::Uuid::new_v4().to_string();
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = hmac_sha256_hex(&target.token, &body);
        let request = mask_id(&payload.request_id);

        let mut last_error = String::new();
        for attempt in 1..=self.policy.max_attempts.max(1) {
            if attempt > 1 {
                let delay = self.policy.backoff(attempt - 1);
                debug!(
                    url = %target.url,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retrying decision delivery"
                );
                tokio::time::sleep(delay).await;
            }

            let result = self
                .client
                .post(&target.url)
                .header("content-type", "application/json")
                .header("x-reactgate-delivery-id", &delivery_id)
                .header("x-reactgate-timestamp", &timestamp)
                .header("x-reactgate-signature", &signature)
                .body(body.clone())
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().as_u16() == 200 || resp.status().as_u16() == 204 => {
                    info!(
                        url = %target.url,
                        request = %request,
                        delivery_id = %delivery_id,
                        attempt,
                        status = %resp.status(),
                        "decision delivered"
                    );
                    return Ok(());
                }
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    warn!(
                        url = %target.url,
                        request = %request,
                        delivery_id = %delivery_id,
                        attempt,
                        status,
                        "callback rejected decision"
                    );
                    return Err(AppError::DispatchFailed { status });
                }
                Err(e) => {
                    warn!(
                        url = %target.url,
                        request = %request,
                        delivery_id = %delivery_id,
                        attempt,
                        error = %e,
                        "callback request error"
                    );
                    last_error = e.to_string();
                }
            }
        }

        Err(AppError::Transport(format!(
            "{} unreachable after {} attempts: {}",
            target.url, self.policy.max_attempts, last_error
        )))
    }
}
