//! HTTP certificate-provider adapter
//!
//! Client for the certificate provider's order API: submit an order carrying
//! the DNS challenge token, then poll the order until it is issued, failed, or
//! the attempt budget runs out. A drained budget is a retryable error — the
//! pipeline keeps the record in Issuing and a later re-drive continues where
//! DNS propagation left off.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::env::constants::DEFAULT_CERT_VALIDITY_DAYS;

use super::{CaError, CertAuthority, CertOrder, IssuedMaterial, ProgressSink};

/// Poll attempts per issue() call before giving the caller the retryable error
const POLL_ATTEMPTS: u32 = 10;
/// Delay between order polls
const POLL_DELAY: Duration = Duration::from_secs(6);

/// Certificate provider API client
pub struct HttpCertAuthority {
    client: Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpCertAuthority {
    pub fn new(base_url: String, api_token: Option<String>) -> Result<Self, CaError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(5)
            .build()
            .map_err(|e| CaError::Retryable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(ref token) = self.api_token {
            builder = builder.bearer_auth(token);
        }
        builder
    }
}

#[derive(Deserialize)]
struct OrderCreated {
    order_id: String,
}

#[derive(Deserialize)]
struct OrderStatus {
    /// "pending" | "processing" | "issued" | "failed"
    status: String,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    certificate: Option<String>,
    #[serde(default)]
    private_key: Option<String>,
    #[serde(default)]
    ca_certificate: Option<String>,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

#[async_trait]
impl CertAuthority for HttpCertAuthority {
    async fn issue(
        &self,
        order: &CertOrder<'_>,
        progress: &dyn ProgressSink,
    ) -> Result<IssuedMaterial, CaError> {
        progress
            .append(&format!(
                "submitting order for {} to {}",
                order.domain,
                order.provider.as_str()
            ))
            .await;

        let created: OrderCreated = self
            .request(reqwest::Method::POST, "/v1/orders")
            .json(&serde_json::json!({
                "domain": order.domain,
                "provider": order.provider.as_str(),
                "challenge_token": order.txt_token,
                "managed_challenge": matches!(order.domain_type, crate::domain::DomainType::Subdomain),
            }))
            .send()
            .await
            .map_err(|e| CaError::Retryable(format!("order submission failed: {}", e)))?
            .error_for_status()
            .map_err(|e| CaError::Fatal(format!("order rejected: {}", e)))?
            .json()
            .await
            .map_err(|e| CaError::Retryable(format!("bad order response: {}", e)))?;

        debug!(domain = %order.domain, order_id = %created.order_id, "CA order submitted");
        progress
            .append(&format!("order {} accepted, awaiting validation", created.order_id))
            .await;

        for attempt in 1..=POLL_ATTEMPTS {
            tokio::time::sleep(POLL_DELAY).await;

            let status: OrderStatus = self
                .request(
                    reqwest::Method::GET,
                    &format!("/v1/orders/{}", created.order_id),
                )
                .send()
                .await
                .map_err(|e| CaError::Retryable(format!("order poll failed: {}", e)))?
                .error_for_status()
                .map_err(|e| CaError::Retryable(format!("order poll failed: {}", e)))?
                .json()
                .await
                .map_err(|e| CaError::Retryable(format!("bad order status: {}", e)))?;

            match status.status.as_str() {
                "issued" => {
                    progress.append("challenge validated, certificate issued").await;
                    let (certificate, private_key, ca_certificate) = match (
                        status.certificate,
                        status.private_key,
                        status.ca_certificate,
                    ) {
                        (Some(c), Some(k), Some(ca)) => (c, k, ca),
                        _ => {
                            return Err(CaError::Retryable(
                                "issued order missing material".to_string(),
                            ))
                        }
                    };
                    return Ok(IssuedMaterial {
                        certificate,
                        private_key,
                        ca_certificate,
                        expires_at: status.expires_at.unwrap_or_else(|| {
                            Utc::now() + chrono::Duration::days(DEFAULT_CERT_VALIDITY_DAYS)
                        }),
                    });
                }
                "failed" => {
                    let reason = status.error.unwrap_or_else(|| "no reason given".to_string());
                    return Err(CaError::Fatal(reason));
                }
                other => {
                    debug!(
                        domain = %order.domain,
                        status = %other,
                        attempt = attempt,
                        "Order still pending"
                    );
                    progress
                        .append(&format!("validation pending ({}/{})", attempt, POLL_ATTEMPTS))
                        .await;
                }
            }
        }

        Err(CaError::Retryable(format!(
            "order {} still pending after {} polls",
            created.order_id, POLL_ATTEMPTS
        )))
    }

    async fn revoke(&self, certificate: &str) -> Result<(), CaError> {
        let result = self
            .request(reqwest::Method::POST, "/v1/revoke")
            .json(&serde_json::json!({ "certificate": certificate }))
            .send()
            .await;
        match result {
            Ok(response) if response.status().is_success() => Ok(()),
            Ok(response) => {
                warn!(status = %response.status(), "CA revoke returned non-success");
                Err(CaError::Retryable(format!(
                    "revoke returned {}",
                    response.status()
                )))
            }
            Err(e) => Err(CaError::Retryable(format!("revoke failed: {}", e))),
        }
    }
}
