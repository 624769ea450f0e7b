// Downstream webhook notifications, one per publish-queue item
//
// Strictly best-effort: a delivery failure is logged and never rolls back
// pipeline state. Retries are bounded with exponential backoff.

use crate::config::NotifierConfig;
use crate::errors::ExternalError;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Static credential header expected by the webhook target.
const CREDENTIAL_HEADER: &str = "x-webhook-key";

/// Delivery attempts per notification; sleeps of 2^attempt seconds between.
const MAX_ATTEMPTS: u32 = 3;

/// Preview length in characters.
const PREVIEW_CHARS: usize = 200;

/// Format the downstream target expects, e.g. "17-11-2025 02:30 PM".
const TARGET_TIME_FORMAT: &str = "%d-%m-%Y %I:%M %p";

#[derive(Debug, Serialize)]
struct NotificationPayload {
    sequence_id: String,
    preview: String,
    full_content: String,
    /// Empty when upload or scheduling failed; the notification still fires
    /// for audit completeness.
    public_url: String,
    target_time: String,
}

/// Client for the downstream notification webhook
pub struct NotificationClient {
    client: Client,
    webhook_url: String,
    api_key: String,
    target_tz: Tz,
    offset: chrono::Duration,
    sequence: AtomicU32,
}

impl NotificationClient {
    pub fn new(config: &NotifierConfig) -> Result<Self, ExternalError> {
        let target_tz: Tz = config
            .target_timezone
            .parse()
            .map_err(|e| ExternalError::RequestFailed(format!("invalid timezone: {}", e)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| {
                ExternalError::RequestFailed(format!("failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            webhook_url: config.webhook_url.clone(),
            api_key: config.api_key.clone(),
            target_tz,
            offset: chrono::Duration::minutes(config.offset_minutes),
            sequence: AtomicU32::new(0),
        })
    }

    /// Reset the sequence counter. Called at the start of each upload pass so
    /// sequence ids are per-batch.
    pub fn reset_sequence(&self) {
        self.sequence.store(0, Ordering::SeqCst);
        debug!("Notification sequence reset");
    }

    /// Deliver one notification. `public_locator` is empty when the item
    /// never reached the publish target.
    pub async fn send(
        &self,
        content: &str,
        public_locator: &str,
        scheduled_time: DateTime<Utc>,
    ) -> Result<(), ExternalError> {
        let sequence_id = format!("{:02}", self.sequence.fetch_add(1, Ordering::SeqCst) + 1);
        let payload = NotificationPayload {
            sequence_id: sequence_id.clone(),
            preview: preview(content),
            full_content: content.to_string(),
            public_url: public_locator.to_string(),
            target_time: self.target_time_string(scheduled_time),
        };

        let mut last_error = ExternalError::RequestFailed("no attempts made".to_string());

        for attempt in 0..MAX_ATTEMPTS {
            match self
                .client
                .post(&self.webhook_url)
                .header(CREDENTIAL_HEADER, &self.api_key)
                .json(&payload)
                .send()
                .await
            {
                Ok(response) if response.status() == StatusCode::OK => {
                    info!(sequence_id = %sequence_id, "Notification delivered");
                    return Ok(());
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    let body = response.text().await.unwrap_or_default();
                    warn!(
                        sequence_id = %sequence_id,
                        attempt = attempt + 1,
                        status,
                        "Webhook returned non-OK status"
                    );
                    last_error = ExternalError::UnexpectedStatus { status, body };
                }
                Err(e) => {
                    warn!(
                        sequence_id = %sequence_id,
                        attempt = attempt + 1,
                        error = %e,
                        "Webhook request failed"
                    );
                    last_error = e.into();
                }
            }

            if attempt + 1 < MAX_ATTEMPTS {
                tokio::time::sleep(Duration::from_secs(1u64 << attempt)).await;
            }
        }

        warn!(
            sequence_id = %sequence_id,
            attempts = MAX_ATTEMPTS,
            "Giving up on notification delivery"
        );
        Err(last_error)
    }

    /// Publish slot plus the fixed offset, rendered in the fixed target
    /// timezone regardless of caller locale.
    fn target_time_string(&self, scheduled_time: DateTime<Utc>) -> String {
        (scheduled_time + self.offset)
            .with_timezone(&self.target_tz)
            .format(TARGET_TIME_FORMAT)
            .to_string()
    }
}

/// Whitespace-collapsed prefix of the content, ellipsized past the limit.
fn preview(content: &str) -> String {
    let cleaned = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.chars().count() <= PREVIEW_CHARS {
        return cleaned;
    }
    let prefix: String = cleaned.chars().take(PREVIEW_CHARS).collect();
    format!("{}...", prefix.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NotifierConfig;
    use chrono::TimeZone;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(url: &str) -> NotifierConfig {
        NotifierConfig {
            webhook_url: format!("{}/hook", url),
            api_key: "hook-key".to_string(),
            timeout_seconds: 5,
            target_timezone: "Asia/Kolkata".to_string(),
            offset_minutes: 15,
        }
    }

    #[test]
    fn test_preview_short_content_unchanged() {
        assert_eq!(preview("Quick   brief"), "Quick brief");
    }

    #[test]
    fn test_preview_truncates_with_ellipsis() {
        let content = "word ".repeat(100);
        let result = preview(&content);
        assert!(result.ends_with("..."));
        assert!(result.chars().count() <= PREVIEW_CHARS + 3);
    }

    #[test]
    fn test_target_time_offset_and_timezone() {
        let config = NotifierConfig {
            webhook_url: "http://localhost/hook".to_string(),
            api_key: "k".to_string(),
            timeout_seconds: 5,
            target_timezone: "Asia/Kolkata".to_string(),
            offset_minutes: 15,
        };
        let client = NotificationClient::new(&config).unwrap();

        // 09:00 UTC + 15m = 09:15 UTC = 14:45 IST.
        let slot = Utc.with_ymd_and_hms(2025, 11, 17, 9, 0, 0).unwrap();
        assert_eq!(client.target_time_string(slot), "17-11-2025 02:45 PM");
    }

    #[tokio::test]
    async fn test_send_posts_payload_with_credential_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header(CREDENTIAL_HEADER, "hook-key"))
            .and(body_partial_json(serde_json::json!({
                "sequence_id": "01",
                "public_url": "https://videos.example.com/watch?v=abc123",
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = NotificationClient::new(&test_config(&server.uri())).unwrap();
        client
            .send(
                "Market update",
                "https://videos.example.com/watch?v=abc123",
                Utc::now(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_sequence_increments_and_resets() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = NotificationClient::new(&test_config(&server.uri())).unwrap();
        client.send("first", "", Utc::now()).await.unwrap();
        client.send("second", "", Utc::now()).await.unwrap();
        client.reset_sequence();
        client.send("third", "", Utc::now()).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let ids: Vec<String> = requests
            .iter()
            .map(|r| {
                let body: serde_json::Value = serde_json::from_slice(&r.body).unwrap();
                body["sequence_id"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(ids, vec!["01", "02", "01"]);
    }

    #[tokio::test]
    async fn test_send_retries_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = NotificationClient::new(&test_config(&server.uri())).unwrap();
        client.send("content", "", Utc::now()).await.unwrap();
    }

    #[tokio::test]
    async fn test_send_gives_up_after_bounded_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let client = NotificationClient::new(&test_config(&server.uri())).unwrap();
        let err = client.send("content", "", Utc::now()).await.unwrap_err();
        assert!(matches!(err, ExternalError::UnexpectedStatus { status: 500, .. }));
    }
}
