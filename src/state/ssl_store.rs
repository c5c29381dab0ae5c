//! SSL certificate record store
//!
//! Same discipline as the hosting store: every status write goes through
//! `transition`, which checks the legal edge set. Certificates are physically
//! removable once terminal, unlike hostings.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use tokio::sync::RwLock;

use crate::domain::{CertProvider, DomainType, SslCertificate, SslStatus};

/// Certificate store
pub struct SslStore {
    certs: RwLock<HashMap<i64, SslCertificate>>,
    next_id: AtomicI64,
}

/// Status-edge failure for certificates
#[derive(Debug, thiserror::Error)]
pub enum SslTransitionError {
    #[error("record not found")]
    NotFound,
    #[error("illegal transition {from:?} -> {to:?}")]
    IllegalEdge { from: SslStatus, to: SslStatus },
    #[error("expected status {expected:?}, found {actual:?}")]
    WrongState { expected: SslStatus, actual: SslStatus },
}

impl SslStore {
    pub fn new() -> Self {
        Self {
            certs: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    pub async fn create(
        &self,
        hosting_id: i64,
        domain: String,
        domain_type: DomainType,
        provider: CertProvider,
    ) -> SslCertificate {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let cert = SslCertificate::new(id, hosting_id, domain, domain_type, provider);
        self.certs.write().await.insert(id, cert.clone());
        cert
    }

    pub async fn get(&self, id: i64) -> Option<SslCertificate> {
        self.certs.read().await.get(&id).cloned()
    }

    pub async fn all(&self) -> Vec<SslCertificate> {
        self.certs.read().await.values().cloned().collect()
    }

    /// Mutate a record without touching its status
    pub async fn update(
        &self,
        id: i64,
        f: impl FnOnce(&mut SslCertificate),
    ) -> Option<SslCertificate> {
        let mut certs = self.certs.write().await;
        let cert = certs.get_mut(&id)?;
        f(cert);
        cert.updated_at = Utc::now();
        Some(cert.clone())
    }

    /// Move a record along a legal edge (re-asserting the current status is a
    /// legal self-edge, used by repeated verify attempts)
    pub async fn transition(
        &self,
        id: i64,
        to: SslStatus,
        mutate: impl FnOnce(&mut SslCertificate),
    ) -> Result<SslCertificate, SslTransitionError> {
        let mut certs = self.certs.write().await;
        let cert = certs.get_mut(&id).ok_or(SslTransitionError::NotFound)?;
        if !cert.status.can_transition(to) {
            return Err(SslTransitionError::IllegalEdge {
                from: cert.status,
                to,
            });
        }
        cert.status = to;
        mutate(cert);
        cert.updated_at = Utc::now();
        Ok(cert.clone())
    }

    /// As `transition`, but pinned to an expected current status
    pub async fn transition_from(
        &self,
        id: i64,
        expect_from: SslStatus,
        to: SslStatus,
        mutate: impl FnOnce(&mut SslCertificate),
    ) -> Result<SslCertificate, SslTransitionError> {
        let mut certs = self.certs.write().await;
        let cert = certs.get_mut(&id).ok_or(SslTransitionError::NotFound)?;
        if cert.status != expect_from {
            return Err(SslTransitionError::WrongState {
                expected: expect_from,
                actual: cert.status,
            });
        }
        if !cert.status.can_transition(to) {
            return Err(SslTransitionError::IllegalEdge {
                from: cert.status,
                to,
            });
        }
        cert.status = to;
        mutate(cert);
        cert.updated_at = Utc::now();
        Ok(cert.clone())
    }

    /// Physically remove a record
    pub async fn remove(&self, id: i64) -> Option<SslCertificate> {
        self.certs.write().await.remove(&id)
    }
}

impl Default for SslStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_with_cert() -> (SslStore, i64) {
        let store = SslStore::new();
        let cert = store
            .create(
                1,
                "example.com".into(),
                DomainType::Custom,
                CertProvider::LetsEncrypt,
            )
            .await;
        (store, cert.id)
    }

    #[tokio::test]
    async fn test_create_pending_verification() {
        let (store, id) = store_with_cert().await;
        assert_eq!(
            store.get(id).await.unwrap().status,
            SslStatus::PendingVerification
        );
    }

    #[tokio::test]
    async fn test_illegal_edge_rejected() {
        let (store, id) = store_with_cert().await;
        let err = store
            .transition(id, SslStatus::Issued, |_| {})
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SslTransitionError::IllegalEdge { .. }));
    }

    #[tokio::test]
    async fn test_self_edge_allowed_for_retries() {
        let (store, id) = store_with_cert().await;
        store
            .transition(id, SslStatus::Verifying, |c| {
                c.last_error = Some("TXT record not found".into());
            })
            .await
            .unwrap();
        // A second failed verify re-asserts Verifying with a fresh error.
        let cert = store
            .transition(id, SslStatus::Verifying, |c| {
                c.last_error = Some("still not found".into());
            })
            .await
            .unwrap();
        assert_eq!(cert.status, SslStatus::Verifying);
        assert_eq!(cert.last_error.as_deref(), Some("still not found"));
    }

    #[tokio::test]
    async fn test_transition_from_pins_state() {
        let (store, id) = store_with_cert().await;
        let err = store
            .transition_from(id, SslStatus::Verified, SslStatus::Issuing, |_| {})
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SslTransitionError::WrongState { .. }));
    }

    #[tokio::test]
    async fn test_remove() {
        let (store, id) = store_with_cert().await;
        assert!(store.remove(id).await.is_some());
        assert!(store.get(id).await.is_none());
    }
}
