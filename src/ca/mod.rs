//! Certificate authority client contract
//!
//! Stateless per call; results depend on DNS propagation, so issuance is
//! retried. Errors split into retryable (propagation, provider backlog) and
//! fatal (domain unissuable) — the pipeline maps the former to a re-drivable
//! Issuing state and the latter to Failed.

pub mod http;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{CertProvider, DomainType};

pub use http::HttpCertAuthority;
pub use memory::MemoryCertAuthority;

/// CA adapter errors
#[derive(Debug, thiserror::Error)]
pub enum CaError {
    /// Order not complete yet or provider transiently unavailable; safe to re-drive
    #[error("retryable CA error: {0}")]
    Retryable(String),
    /// The CA declared the order unissuable; terminal
    #[error("fatal CA error: {0}")]
    Fatal(String),
}

/// Everything the CA needs to drive a challenge-and-sign flow
#[derive(Clone, Debug)]
pub struct CertOrder<'a> {
    pub domain: &'a str,
    pub domain_type: DomainType,
    pub provider: CertProvider,
    /// Challenge token expected under `_acme-challenge.{domain}`
    pub txt_token: &'a str,
}

/// Signed certificate material
#[derive(Clone, Debug)]
pub struct IssuedMaterial {
    pub certificate: String,
    pub private_key: String,
    pub ca_certificate: String,
    pub expires_at: DateTime<Utc>,
}

/// Receives human-readable progress lines during issuance
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn append(&self, line: &str);
}

/// Certificate authority client
#[async_trait]
pub trait CertAuthority: Send + Sync {
    /// Drive the full challenge-and-sign flow for one order
    async fn issue(
        &self,
        order: &CertOrder<'_>,
        progress: &dyn ProgressSink,
    ) -> Result<IssuedMaterial, CaError>;

    /// Revoke an issued certificate
    async fn revoke(&self, certificate: &str) -> Result<(), CaError>;
}
