//! Notification dispatch
//!
//! Terminal transitions are reported to an external notification service over
//! a webhook. Delivery is best-effort with a small retry budget; the pipeline
//! never blocks or fails on a notification.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::env::constants::NOTIFY_ATTEMPTS;

/// Terminal-transition events consumed by the notification service
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NotifyEvent {
    HostingActivated { hosting_id: i64, domain: String },
    HostingSuspended { hosting_id: i64, kind: String },
    HostingReactivated { hosting_id: i64 },
    HostingDeleted { hosting_id: i64 },
    CertificateIssued { cert_id: i64, domain: String },
    CertificateFailed { cert_id: i64, domain: String, error: String },
}

/// Emits terminal-transition events
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Fire-and-forget; failures are logged, never surfaced
    async fn emit(&self, event: NotifyEvent);
}

/// Webhook notifier POSTing JSON events to a configured URL
pub struct WebhookNotifier {
    client: Client,
    url: Option<String>,
}

impl WebhookNotifier {
    pub fn new(url: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(5)
            .build()
            .expect("Failed to create HTTP client");
        Self { client, url }
    }

    /// Notifier that drops every event
    pub fn disabled() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn emit(&self, event: NotifyEvent) {
        let url = match &self.url {
            Some(url) => url.clone(),
            None => return,
        };

        for attempt in 1..=NOTIFY_ATTEMPTS {
            match self.client.post(&url).json(&event).send().await {
                Ok(response) if response.status().is_success() => {
                    info!(event = ?event, attempt = attempt, "Notification delivered");
                    return;
                }
                Ok(response) => {
                    warn!(
                        event = ?event,
                        status = %response.status(),
                        attempt = attempt,
                        "Notification endpoint returned non-success"
                    );
                }
                Err(e) => {
                    warn!(
                        event = ?event,
                        error = %e,
                        attempt = attempt,
                        "Notification delivery failed"
                    );
                }
            }
            if attempt < NOTIFY_ATTEMPTS {
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }

        warn!(event = ?event, "Notification dropped after {} attempts", NOTIFY_ATTEMPTS);
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::Mutex;

    /// Notifier recording events for assertions
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub events: Mutex<Vec<NotifyEvent>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn emit(&self, event: NotifyEvent) {
            self.events.lock().unwrap().push(event);
        }
    }
}
