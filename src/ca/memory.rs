//! In-memory CA adapter
//!
//! Deterministic fake for tests and the `memory` adapter mode. Orders succeed
//! after a configurable number of pending attempts (simulating DNS
//! propagation delay at the CA's resolvers); listed domains fail fatally.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, Utc};

use crate::config::env::constants::DEFAULT_CERT_VALIDITY_DAYS;

use super::{CaError, CertAuthority, CertOrder, IssuedMaterial, ProgressSink};

#[derive(Default)]
struct Inner {
    /// Attempts seen per domain
    attempts: HashMap<String, u32>,
    /// Domains that fail fatally
    unissuable: HashSet<String>,
    /// Pending attempts required before success
    pending_rounds: u32,
    issued: Vec<String>,
    revoked: Vec<String>,
}

/// Fake certificate authority
pub struct MemoryCertAuthority {
    inner: Mutex<Inner>,
}

impl MemoryCertAuthority {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Require `rounds` retryable attempts before an order succeeds
    pub fn with_pending_rounds(rounds: u32) -> Self {
        let ca = Self::new();
        ca.inner.lock().unwrap().pending_rounds = rounds;
        ca
    }

    /// Mark a domain as unissuable (fatal on issue)
    pub fn deny_domain(&self, domain: &str) {
        self.inner.lock().unwrap().unissuable.insert(domain.to_string());
    }

    pub fn issued_domains(&self) -> Vec<String> {
        self.inner.lock().unwrap().issued.clone()
    }

    pub fn revoke_count(&self) -> usize {
        self.inner.lock().unwrap().revoked.len()
    }

    pub fn issue_attempts(&self, domain: &str) -> u32 {
        self.inner
            .lock()
            .unwrap()
            .attempts
            .get(domain)
            .copied()
            .unwrap_or(0)
    }
}

impl Default for MemoryCertAuthority {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CertAuthority for MemoryCertAuthority {
    async fn issue(
        &self,
        order: &CertOrder<'_>,
        progress: &dyn ProgressSink,
    ) -> Result<IssuedMaterial, CaError> {
        progress
            .append(&format!("submitting order for {} to {}", order.domain, order.provider.as_str()))
            .await;

        let attempt;
        {
            let mut inner = self.inner.lock().unwrap();
            let counter = inner.attempts.entry(order.domain.to_string()).or_insert(0);
            *counter += 1;
            attempt = *counter;

            if inner.unissuable.contains(order.domain) {
                return Err(CaError::Fatal(format!(
                    "domain {} refused by policy",
                    order.domain
                )));
            }
            if attempt <= inner.pending_rounds {
                return Err(CaError::Retryable(format!(
                    "challenge for {} not yet validated (attempt {})",
                    order.domain, attempt
                )));
            }
            inner.issued.push(order.domain.to_string());
        }

        progress.append("challenge validated, signing certificate").await;

        Ok(IssuedMaterial {
            certificate: fake_pem("CERTIFICATE", order.domain),
            private_key: fake_pem("PRIVATE KEY", order.domain),
            ca_certificate: fake_pem("CERTIFICATE", "memory-ca-root"),
            expires_at: Utc::now() + Duration::days(DEFAULT_CERT_VALIDITY_DAYS),
        })
    }

    async fn revoke(&self, certificate: &str) -> Result<(), CaError> {
        self.inner
            .lock()
            .unwrap()
            .revoked
            .push(certificate.to_string());
        Ok(())
    }
}

fn fake_pem(label: &str, subject: &str) -> String {
    format!(
        "-----BEGIN {label}-----\n{subject}\n-----END {label}-----\n",
        label = label,
        subject = subject
    )
}
