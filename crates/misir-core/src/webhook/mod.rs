//! Webhook dispatch.
//!
//! Fires outbound HTTP notifications for domain events (artifact capture,
//! drift detection, etc.) with HMAC-SHA256 request signing and exponential
//! backoff retry. Delivery runs on detached `tokio` tasks — dispatch never
//! blocks or fails the caller's request.

use std::time::Duration;

use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;

use crate::error::WebhookError;

type HmacSha256 = Hmac<Sha256>;

pub const MAX_RETRIES: u32 = 5;
pub const INITIAL_RETRY_DELAY_SECS: u64 = 1;
pub const MAX_RETRY_DELAY_SECS: u64 = 300;

/// A webhook destination: where to send events and how to sign them.
#[derive(Debug, Clone)]
pub struct WebhookSubscription {
    pub id: i64,
    pub target_url: String,
    pub secret: String,
    pub event_types: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookEnvelope<T: Serialize> {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub created_at: String,
    pub data: T,
}

fn sign(secret: &str, body: &str) -> Result<String, WebhookError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| WebhookError::Signing(e.to_string()))?;
    mac.update(body.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Backoff delay for a given retry attempt (0-indexed), capped at
/// [`MAX_RETRY_DELAY_SECS`].
pub fn backoff_delay(attempt: u32) -> Duration {
    let secs = INITIAL_RETRY_DELAY_SECS.saturating_mul(1u64 << attempt.min(20));
    Duration::from_secs(secs.min(MAX_RETRY_DELAY_SECS))
}

/// Delivers one event to one subscription with retry, honoring
/// [`MAX_RETRIES`] attempts total. Never panics or propagates a delivery
/// failure to the caller — failures are logged and, when exhausted,
/// reported via the returned `Err` so the caller can mark the delivery row
/// failed; callers that don't care can ignore it.
pub async fn deliver_with_retry<T: Serialize>(
    client: &reqwest::Client,
    subscription: &WebhookSubscription,
    event_id: &str,
    event_type: &str,
    created_at: &str,
    payload: &T,
) -> Result<(), WebhookError> {
    let envelope = WebhookEnvelope {
        id: event_id.to_string(),
        event_type: event_type.to_string(),
        created_at: created_at.to_string(),
        data: payload,
    };
    let body = serde_json::to_string(&envelope).map_err(|e| WebhookError::Signing(e.to_string()))?;
    let signature = sign(&subscription.secret, &body)?;

    let mut last_err = None;

    for attempt in 0..=MAX_RETRIES {
        let result = client
            .post(&subscription.target_url)
            .header("Content-Type", "application/json")
            .header("X-Misir-Signature", &signature)
            .header("X-Misir-Event", event_type)
            .header("User-Agent", format!("Misir-Webhook/{}", env!("CARGO_PKG_VERSION")))
            .header("X-Misir-Delivery-Attempt", attempt.to_string())
            .body(body.clone())
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => return Ok(()),
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), attempt, url = %subscription.target_url, "webhook delivery rejected");
                last_err = Some(WebhookError::Signing(format!("non-2xx status {}", resp.status())));
            }
            Err(e) => {
                tracing::warn!(error = %e, attempt, url = %subscription.target_url, "webhook delivery failed");
                last_err = Some(WebhookError::Request(e));
            }
        }

        if attempt < MAX_RETRIES {
            tokio::time::sleep(backoff_delay(attempt)).await;
        }
    }

    Err(last_err.unwrap_or_else(|| WebhookError::Signing("exhausted retries".into())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_delay_doubles_and_caps() {
        assert_eq!(backoff_delay(0), Duration::from_secs(1));
        assert_eq!(backoff_delay(1), Duration::from_secs(2));
        assert_eq!(backoff_delay(2), Duration::from_secs(4));
        assert_eq!(backoff_delay(3), Duration::from_secs(8));
        assert_eq!(backoff_delay(4), Duration::from_secs(16));
        assert_eq!(backoff_delay(20), Duration::from_secs(300));
    }

    #[test]
    fn sign_is_deterministic() {
        let a = sign("secret", "body").unwrap();
        let b = sign("secret", "body").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn sign_differs_by_secret() {
        let a = sign("secret-a", "body").unwrap();
        let b = sign("secret-b", "body").unwrap();
        assert_ne!(a, b);
    }
}
