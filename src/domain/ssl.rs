//! SSL certificate domain model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Certificate lifecycle status
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SslStatus {
    PendingVerification,
    Verifying,
    Verified,
    Issuing,
    Issued,
    Failed,
    Expired,
    Revoked,
}

impl SslStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SslStatus::PendingVerification => "pending_verification",
            SslStatus::Verifying => "verifying",
            SslStatus::Verified => "verified",
            SslStatus::Issuing => "issuing",
            SslStatus::Issued => "issued",
            SslStatus::Failed => "failed",
            SslStatus::Expired => "expired",
            SslStatus::Revoked => "revoked",
        }
    }

    /// No further automatic transition occurs from these
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SslStatus::Issued | SslStatus::Failed | SslStatus::Expired | SslStatus::Revoked
        )
    }

    /// Legal status edges. Failed is reachable from any non-terminal state;
    /// Expired/Revoked only from Issued. Re-asserting the current status is
    /// allowed (repeated verify attempts stay in Verifying).
    pub fn can_transition(&self, to: SslStatus) -> bool {
        use SslStatus::*;
        if *self == to {
            return true;
        }
        match (self, to) {
            (_, Failed) => !self.is_terminal(),
            (PendingVerification, Verifying) => true,
            (PendingVerification, Verified) => true,
            // Subdomain certificates skip the user-facing verify step.
            (PendingVerification, Issuing) => true,
            (Verifying, Verified) => true,
            (Verified, Issuing) => true,
            (Issuing, Issued) => true,
            (Issued, Expired) | (Issued, Revoked) => true,
            _ => false,
        }
    }
}

/// How the domain's challenge is validated
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DomainType {
    /// Provider-managed automatic challenge, no user-facing TXT step
    Subdomain,
    /// User publishes the TXT record and calls verify explicitly
    Custom,
}

/// Issuing certificate authority
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CertProvider {
    LetsEncrypt,
    GoogleTrust,
}

impl CertProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertProvider::LetsEncrypt => "lets_encrypt",
            CertProvider::GoogleTrust => "google_trust",
        }
    }
}

/// SSL certificate record
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SslCertificate {
    pub id: i64,
    /// Hosting the certificate will be installed on
    pub hosting_id: i64,
    pub domain: String,
    pub domain_type: DomainType,
    pub provider: CertProvider,
    pub status: SslStatus,
    /// Challenge token to publish as TXT under `_acme-challenge.{domain}`
    pub txt_record: String,
    pub cname_record: Option<String>,
    pub certificate: Option<String>,
    #[serde(skip_serializing)]
    pub private_key: Option<String>,
    pub ca_certificate: Option<String>,
    /// Most recent failure; cleared on every successful transition
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl SslCertificate {
    pub fn new(
        id: i64,
        hosting_id: i64,
        domain: String,
        domain_type: DomainType,
        provider: CertProvider,
    ) -> Self {
        let now = Utc::now();
        let cname_record = match domain_type {
            // Provider-managed delegation target for the automatic path
            DomainType::Subdomain => Some(format!("_acme-challenge.{}", domain)),
            DomainType::Custom => None,
        };
        Self {
            id,
            hosting_id,
            domain,
            domain_type,
            provider,
            status: SslStatus::PendingVerification,
            txt_record: generate_challenge_token(),
            cname_record,
            certificate: None,
            private_key: None,
            ca_certificate: None,
            last_error: None,
            created_at: now,
            verified_at: None,
            issued_at: None,
            expires_at: None,
            updated_at: now,
        }
    }

    /// DNS name the challenge token must be published under
    pub fn challenge_name(&self) -> String {
        format!("_acme-challenge.{}", self.domain)
    }

    /// Material populated iff status == Issued
    pub fn has_material(&self) -> bool {
        self.certificate.is_some() && self.private_key.is_some() && self.ca_certificate.is_some()
    }
}

/// Fresh opaque challenge token
fn generate_challenge_token() -> String {
    format!(
        "{}{}",
        Uuid::new_v4().simple(),
        Uuid::new_v4().simple()
    )
}
