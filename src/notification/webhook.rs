use anyhow::Result;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::models::notification::{Notification, Priority};

// ── Webhook Event Types ───────────────────────────────────────

/// A structured alert payload pushed to webhook endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookEvent {
    /// Event type identifier, always "deadline_alert" for now.
    pub event_type: String,
    /// ISO-8601 timestamp of when the alert was created.
    pub timestamp: String,
    pub notification_id: String,
    pub user_id: String,
    /// Alert details (category, source item, priority, text).
    pub details: serde_json::Value,
}

impl WebhookEvent {
    pub fn deadline_alert(notification: &Notification) -> Self {
        Self {
            event_type: "deadline_alert".to_string(),
            timestamp: notification.created_at.to_rfc3339(),
            notification_id: notification.id.to_string(),
            user_id: notification.user_id.to_string(),
            details: serde_json::json!({
                "type": notification.r#type.as_str(),
                "related_id": notification.related_id,
                "priority": notification.priority.as_str(),
                "title": notification.title,
                "message": notification.message,
            }),
        }
    }
}

// ── HMAC Signing ─────────────────────────────────────────────

/// Compute HMAC-SHA256 of `payload` using `secret`.
/// Returns lowercase hex digest (e.g. "sha256=<hex>").
fn hmac_sha256_hex(secret: &str, payload: &[u8]) -> Result<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("invalid webhook secret: {}", e))?;
    mac.update(payload);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

// ── Webhook Notifier ──────────────────────────────────────────

/// Pushes high-priority alerts to the configured URLs.
/// Supports:
/// - HMAC-SHA256 signing (X-Notifier-Signature header)
/// - Up to 3 retries with back-off (1s → 5s → 25s)
///
/// Delivery is best-effort; nothing waits on it.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    urls: Vec<String>,
    signing_secret: Option<String>,
    backoff_secs: Vec<u64>,
}

impl WebhookNotifier {
    pub fn new(urls: Vec<String>, signing_secret: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("Notifier-Webhook/1.0")
            .build()?;
        Ok(Self {
            client,
            urls,
            signing_secret,
            backoff_secs: vec![0, 1, 5, 25],
        })
    }

    /// Override the retry schedule (first entry is the initial attempt's delay).
    pub fn with_backoff(mut self, backoff_secs: Vec<u64>) -> Self {
        self.backoff_secs = backoff_secs;
        self
    }

    pub fn is_enabled(&self) -> bool {
        !self.urls.is_empty()
    }

    /// Only high-priority alerts leave the process.
    pub fn should_forward(&self, notification: &Notification) -> bool {
        self.is_enabled() && notification.priority == Priority::High
    }

    /// Send an event to a single URL with retry.
    /// Returns `Ok(())` if delivery succeeded on any attempt.
    pub async fn send(&self, url: &str, event: &WebhookEvent) -> Result<()> {
        let payload = serde_json::to_vec(event)
            .map_err(|e| anyhow::anyhow!("webhook serialize error: {}", e))?;
        let delivery_id = uuid::Uuid::new_v4().to_string();
        let signature = match self.signing_secret.as_deref() {
            Some(secret) => Some(hmac_sha256_hex(secret, &payload)?),
            None => None,
        };

        for (attempt, &delay) in self.backoff_secs.iter().enumerate() {
            if delay > 0 {
                debug!(
                    url,
                    attempt,
                    delay_secs = delay,
                    "retrying webhook delivery"
                );
                tokio::time::sleep(Duration::from_secs(delay)).await;
            }

            let mut req = self
                .client
                .post(url)
                .header("content-type", "application/json")
                .header("x-notifier-delivery-id", &delivery_id)
                .header("x-notifier-event", &event.event_type);

            if let Some(ref sig) = signature {
                req = req.header("x-notifier-signature", sig.as_str());
            }

            match req.body(payload.clone()).send().await {
                Ok(resp) if resp.status().is_success() => {
                    info!(
                        url,
                        notification_id = %event.notification_id,
                        delivery_id = %delivery_id,
                        attempt,
                        "webhook delivered"
                    );
                    return Ok(());
                }
                Ok(resp) => {
                    warn!(
                        url,
                        delivery_id = %delivery_id,
                        attempt,
                        status = %resp.status(),
                        "webhook delivery failed (non-2xx), will retry"
                    );
                }
                Err(e) => {
                    warn!(
                        url,
                        delivery_id = %delivery_id,
                        attempt,
                        error = %e,
                        "webhook request error, will retry"
                    );
                }
            }
        }

        Err(anyhow::anyhow!("webhook delivery failed after retries: {}", url))
    }

    /// Forward a notification to every configured URL (fire-and-forget).
    pub fn dispatch(&self, notification: &Notification) {
        if !self.should_forward(notification) {
            return;
        }

        let notifier = self.clone();
        let event = WebhookEvent::deadline_alert(notification);

        tokio::spawn(async move {
            for url in &notifier.urls {
                if let Err(e) = notifier.send(url, &event).await {
                    warn!(url, error = %e, "webhook dispatch ultimately failed");
                }
            }
        });
    }
}

// ── Tests ─────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::notification::NotificationType;
    use chrono::Utc;

    fn notification(priority: Priority) -> Notification {
        Notification {
            id: uuid::Uuid::new_v4(),
            user_id: uuid::Uuid::new_v4(),
            title: "Prazo de Tarefa".into(),
            message: "A tarefa \"Enviar contrato\" está atrasada!".into(),
            r#type: NotificationType::Task,
            related_id: "t1".into(),
            priority,
            is_read: false,
            dismissed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_deadline_alert_event_fields() {
        let n = notification(Priority::High);
        let event = WebhookEvent::deadline_alert(&n);
        assert_eq!(event.event_type, "deadline_alert");
        assert_eq!(event.notification_id, n.id.to_string());
        assert_eq!(event.details["type"], "task");
        assert_eq!(event.details["priority"], "high");
        assert_eq!(event.details["related_id"], "t1");
    }

    #[test]
    fn test_only_high_priority_is_forwarded() {
        let notifier = WebhookNotifier::new(vec!["http://localhost:9/hook".into()], None).unwrap();
        assert!(notifier.should_forward(&notification(Priority::High)));
        assert!(!notifier.should_forward(&notification(Priority::Medium)));

        let disabled = WebhookNotifier::new(vec![], None).unwrap();
        assert!(!disabled.should_forward(&notification(Priority::High)));
    }

    #[test]
    fn test_hmac_signature_deterministic() {
        let sig1 = hmac_sha256_hex("secret123", b"payload").unwrap();
        let sig2 = hmac_sha256_hex("secret123", b"payload").unwrap();
        assert_eq!(sig1, sig2);
        assert!(sig1.starts_with("sha256="));
        assert_ne!(sig1, hmac_sha256_hex("secret456", b"payload").unwrap());
    }
}
