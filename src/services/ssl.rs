//! SSL certificate pipeline
//!
//! Verification proves DNS control, issuance drives the CA, installation
//! pushes material onto the hosting's panel account. Issuance runs in a
//! background task and reports progress through the issue log; a retryable CA
//! failure parks the record in Issuing so a later call re-drives it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::ca::{CaError, CertOrder};
use crate::domain::{CertProvider, DomainType, SslCertificate, SslStatus};
use crate::error::{ApiError, ApiResult};
use crate::panel::{with_session, PanelLogin};
use crate::services::hosting::ensure_operational;
use crate::services::notify::NotifyEvent;
use crate::state::{AppState, IssueProgress, OpKey};

/// Create a certificate record for a hosting's domain
///
/// Returns the record with its challenge token; the caller publishes the TXT
/// (custom domains) or waits for the managed CNAME flow (subdomains).
pub async fn request_certificate(
    state: &Arc<AppState>,
    hosting_id: i64,
    domain: String,
    domain_type: DomainType,
    provider: CertProvider,
) -> ApiResult<SslCertificate> {
    let hosting = state
        .hostings
        .get(hosting_id)
        .await
        .ok_or_else(|| ApiError::not_found("Hosting"))?;
    ensure_operational(&hosting)?;

    let cert = state
        .ssl
        .create(hosting_id, domain, domain_type, provider)
        .await;
    info!(
        cert_id = cert.id,
        hosting_id,
        domain = %cert.domain,
        domain_type = ?cert.domain_type,
        "Certificate record created"
    );
    Ok(cert)
}

/// Check the published TXT challenge for a custom domain
///
/// A mismatch parks the record in Verifying with the failure recorded; the
/// call can be repeated until the record propagates.
pub async fn verify(state: &Arc<AppState>, cert_id: i64) -> ApiResult<SslCertificate> {
    let cert = state
        .ssl
        .get(cert_id)
        .await
        .ok_or_else(|| ApiError::not_found("Certificate"))?;

    if cert.domain_type == DomainType::Subdomain {
        return Err(ApiError::unprocessable(
            "subdomain challenges are validated automatically",
        ));
    }
    if !matches!(
        cert.status,
        SslStatus::PendingVerification | SslStatus::Verifying
    ) {
        return Err(ApiError::unprocessable(format!(
            "certificate is {}, not awaiting verification",
            cert.status.as_str()
        )));
    }

    let name = cert.challenge_name();
    let values = state
        .dns
        .lookup_txt(&name)
        .await
        .map_err(|e| ApiError::remote(e.to_string()))?;

    if values.iter().any(|v| v == &cert.txt_record) {
        let cert = state
            .ssl
            .transition(cert_id, SslStatus::Verified, |c| {
                c.verified_at = Some(chrono::Utc::now());
                c.last_error = None;
            })
            .await
            .map_err(|e| ApiError::conflict(e.to_string()))?;
        info!(cert_id, domain = %cert.domain, "Domain verified");
        return Ok(cert);
    }

    let found = values.len();
    state
        .ssl
        .transition(cert_id, SslStatus::Verifying, |c| {
            c.last_error = Some(format!(
                "challenge token not found under {} ({} TXT records seen)",
                name, found
            ));
        })
        .await
        .map_err(|e| ApiError::conflict(e.to_string()))?;
    Err(ApiError::unprocessable(format!(
        "challenge token not found under {}",
        name
    )))
}

/// Move an eligible record into Issuing and drive the CA in the background
///
/// Eligible: Verified, PendingVerification for subdomains (their challenge is
/// provider-managed), or Issuing with no driver in flight (re-drive after a
/// retryable failure).
pub async fn request_issue(state: &Arc<AppState>, cert_id: i64) -> ApiResult<SslCertificate> {
    let cert = state
        .ssl
        .get(cert_id)
        .await
        .ok_or_else(|| ApiError::not_found("Certificate"))?;

    let eligible = match (cert.status, cert.domain_type) {
        (SslStatus::Verified, _) => true,
        (SslStatus::PendingVerification, DomainType::Subdomain) => true,
        (SslStatus::Issuing, _) => {
            if state.op_in_flight(OpKey::Ssl(cert_id)).await {
                return Err(ApiError::conflict("issuance already in progress"));
            }
            true
        }
        _ => false,
    };
    if !eligible {
        return Err(ApiError::unprocessable(format!(
            "certificate is {}, not ready for issuance",
            cert.status.as_str()
        )));
    }

    let cert = state
        .ssl
        .transition(cert_id, SslStatus::Issuing, |_| {})
        .await
        .map_err(|e| ApiError::conflict(e.to_string()))?;
    state.issue_log.append(cert_id, "issuance requested").await;

    let state = state.clone();
    tokio::spawn(async move { drive_issue(state, cert_id).await });
    Ok(cert)
}

/// Run one issuance attempt against the CA
///
/// Retryable failure leaves the record in Issuing for re-drive; fatal failure
/// moves it to Failed.
pub async fn drive_issue(state: Arc<AppState>, cert_id: i64) {
    let Some(_token) = state.try_begin_op(OpKey::Ssl(cert_id)).await else {
        return;
    };

    drive_issue_inner(&state, cert_id).await;
    state.end_op(OpKey::Ssl(cert_id)).await;
}

async fn drive_issue_inner(state: &Arc<AppState>, cert_id: i64) {
    let Some(cert) = state.ssl.get(cert_id).await else {
        return;
    };
    if cert.status != SslStatus::Issuing {
        return;
    }

    let progress = IssueProgress::new(state.issue_log.clone(), cert_id);
    let order = CertOrder {
        domain: &cert.domain,
        domain_type: cert.domain_type,
        provider: cert.provider,
        txt_token: &cert.txt_record,
    };

    match state.ca.issue(&order, &progress).await {
        Ok(material) => {
            let written = state
                .ssl
                .transition_from(cert_id, SslStatus::Issuing, SslStatus::Issued, |c| {
                    c.certificate = Some(material.certificate.clone());
                    c.private_key = Some(material.private_key.clone());
                    c.ca_certificate = Some(material.ca_certificate.clone());
                    c.issued_at = Some(chrono::Utc::now());
                    c.expires_at = Some(material.expires_at);
                    c.last_error = None;
                })
                .await;
            match written {
                Ok(cert) => {
                    state.issue_log.append(cert_id, "certificate issued").await;
                    info!(cert_id, domain = %cert.domain, "Certificate issued");
                    state
                        .notifier
                        .emit(NotifyEvent::CertificateIssued {
                            cert_id,
                            domain: cert.domain,
                        })
                        .await;
                }
                Err(e) => error!(cert_id, error = %e, "Issued write failed"),
            }
        }
        Err(CaError::Retryable(msg)) => {
            warn!(cert_id, error = %msg, "Issuance parked for re-drive");
            state
                .issue_log
                .append(cert_id, format!("attempt incomplete: {}", msg))
                .await;
            // Self-edge: stays Issuing with the failure on record.
            if let Err(e) = state
                .ssl
                .transition_from(cert_id, SslStatus::Issuing, SslStatus::Issuing, |c| {
                    c.last_error = Some(msg);
                })
                .await
            {
                error!(cert_id, error = %e, "Issuing write failed");
            }
        }
        Err(CaError::Fatal(msg)) => {
            error!(cert_id, error = %msg, "Issuance failed");
            state
                .issue_log
                .append(cert_id, format!("failed: {}", msg))
                .await;
            match state
                .ssl
                .transition_from(cert_id, SslStatus::Issuing, SslStatus::Failed, |c| {
                    c.last_error = Some(msg.clone());
                })
                .await
            {
                Ok(cert) => {
                    state
                        .notifier
                        .emit(NotifyEvent::CertificateFailed {
                            cert_id,
                            domain: cert.domain,
                            error: msg,
                        })
                        .await;
                }
                Err(e) => error!(cert_id, error = %e, "Failed write failed"),
            }
        }
    }
}

/// Push issued material onto the hosting's panel account
///
/// An upload failure surfaces as a remote error and never regresses the
/// certificate's status; the material stays valid for another attempt.
pub async fn install_on_hosting(state: &Arc<AppState>, cert_id: i64) -> ApiResult<SslCertificate> {
    let cert = state
        .ssl
        .get(cert_id)
        .await
        .ok_or_else(|| ApiError::not_found("Certificate"))?;
    if cert.status != SslStatus::Issued || !cert.has_material() {
        return Err(ApiError::unprocessable(format!(
            "certificate is {}, nothing to install",
            cert.status.as_str()
        )));
    }

    let hosting = state
        .hostings
        .get(cert.hosting_id)
        .await
        .ok_or_else(|| ApiError::not_found("Hosting"))?;
    ensure_operational(&hosting)?;
    let password = hosting
        .password
        .clone()
        .ok_or_else(|| ApiError::internal("active hosting without panel credential"))?;

    let domain = cert.domain.clone();
    let certificate = cert.certificate.clone().unwrap_or_default();
    let private_key = cert.private_key.clone().unwrap_or_default();
    let ca_certificate = cert.ca_certificate.clone();

    with_session(
        &state.panel,
        PanelLogin::Account {
            username: &hosting.vp_username,
            password: &password,
        },
        |s| {
            Box::pin(async move {
                s.upload_certificate(
                    &domain,
                    &private_key,
                    &certificate,
                    ca_certificate.as_deref(),
                )
                .await
            })
        },
    )
    .await
    .map_err(|e| ApiError::remote(format!("certificate install failed: {}", e)))?;

    info!(cert_id, domain = %cert.domain, hosting_id = hosting.id, "Certificate installed");
    Ok(cert)
}

/// Downloadable material for an issued certificate
///
/// The certificate record's JSON form never carries the private key; this is
/// the one surface that returns it, so callers can install the pair on other
/// servers themselves.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateMaterial {
    pub domain: String,
    pub certificate: String,
    pub private_key: String,
    pub ca_certificate: String,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

pub async fn material(state: &Arc<AppState>, cert_id: i64) -> ApiResult<CertificateMaterial> {
    let cert = state
        .ssl
        .get(cert_id)
        .await
        .ok_or_else(|| ApiError::not_found("Certificate"))?;

    if cert.status != SslStatus::Issued {
        return Err(ApiError::conflict(format!(
            "certificate is {}, material is only available once issued",
            cert.status.as_str()
        )));
    }
    let (Some(certificate), Some(private_key), Some(ca_certificate)) =
        (cert.certificate, cert.private_key, cert.ca_certificate)
    else {
        return Err(ApiError::internal(
            "issued certificate has no stored material",
        ));
    };

    Ok(CertificateMaterial {
        domain: cert.domain,
        certificate,
        private_key,
        ca_certificate,
        issued_at: cert.issued_at,
        expires_at: cert.expires_at,
    })
}

/// Delete a certificate record
///
/// Issued certificates get best-effort remote cleanup (CA revocation, panel
/// removal); every other status makes zero remote calls. The local record is
/// removed regardless of remote outcomes.
pub async fn delete(state: &Arc<AppState>, cert_id: i64) -> ApiResult<()> {
    let cert = state
        .ssl
        .get(cert_id)
        .await
        .ok_or_else(|| ApiError::not_found("Certificate"))?;

    if cert.status == SslStatus::Issued {
        if let Some(material) = &cert.certificate {
            if let Err(e) = state.ca.revoke(material).await {
                warn!(cert_id, error = %e, "Revocation failed, deleting anyway");
            }
        }
        if let Some(hosting) = state.hostings.get(cert.hosting_id).await {
            if let Some(password) = hosting.password.clone() {
                let domain = cert.domain.clone();
                let removed = with_session(
                    &state.panel,
                    PanelLogin::Account {
                        username: &hosting.vp_username,
                        password: &password,
                    },
                    |s| Box::pin(async move { s.remove_certificate(&domain).await }),
                )
                .await;
                if let Err(e) = removed {
                    warn!(cert_id, error = %e, "Panel removal failed, deleting anyway");
                }
            }
        }
    }

    state.ssl.remove(cert_id).await;
    state.issue_log.remove(cert_id).await;
    info!(cert_id, "Certificate record deleted");
    Ok(())
}

/// Move an Issued certificate past its expiry (sweep entry point)
pub async fn mark_expired(state: &Arc<AppState>, cert_id: i64) {
    match state
        .ssl
        .transition_from(cert_id, SslStatus::Issued, SslStatus::Expired, |_| {})
        .await
    {
        Ok(cert) => info!(cert_id, domain = %cert.domain, "Certificate expired"),
        Err(e) => warn!(cert_id, error = %e, "Expiry write skipped"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ca::MemoryCertAuthority;
    use crate::config::EnvConfig;
    use crate::dns::MemoryDns;
    use crate::panel::MemoryPanelConnector;
    use crate::services::hosting;
    use crate::services::notify::test_support::RecordingNotifier;

    struct Harness {
        state: Arc<AppState>,
        panel: Arc<MemoryPanelConnector>,
        ca: Arc<MemoryCertAuthority>,
        dns: Arc<MemoryDns>,
        notifier: Arc<RecordingNotifier>,
    }

    fn harness_with_ca(ca: MemoryCertAuthority) -> Harness {
        let panel = Arc::new(MemoryPanelConnector::new());
        let ca = Arc::new(ca);
        let dns = Arc::new(MemoryDns::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let state = Arc::new(AppState::with_adapters(
            EnvConfig::for_tests(),
            panel.clone(),
            ca.clone(),
            dns.clone(),
            notifier.clone(),
        ));
        Harness {
            state,
            panel,
            ca,
            dns,
            notifier,
        }
    }

    fn harness() -> Harness {
        harness_with_ca(MemoryCertAuthority::new())
    }

    async fn operational_hosting(h: &Harness) -> i64 {
        let hosting = hosting::create(&h.state, 1, "site.example".into(), "starter".into()).await;
        hosting::provision(h.state.clone(), hosting.id).await;
        hosting::approve_panel(&h.state, hosting.id).await.unwrap();
        hosting.id
    }

    async fn wait_for_status(state: &Arc<AppState>, id: i64, want: SslStatus) -> SslCertificate {
        for _ in 0..200 {
            let cert = state.ssl.get(id).await.unwrap();
            if cert.status == want {
                return cert;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!("certificate {} never reached {:?}", id, want);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_custom_domain_verify_issue_install() {
        let h = harness();
        let hosting_id = operational_hosting(&h).await;
        let vp = h.state.hostings.get(hosting_id).await.unwrap().vp_username;

        let cert = request_certificate(
            &h.state,
            hosting_id,
            "www.customer.example".into(),
            DomainType::Custom,
            CertProvider::LetsEncrypt,
        )
        .await
        .unwrap();
        assert_eq!(cert.status, SslStatus::PendingVerification);
        assert!(cert.cname_record.is_none());

        // Customer publishes the challenge, then asks for verification.
        h.dns.publish_txt(&cert.challenge_name(), &cert.txt_record);
        let verified = verify(&h.state, cert.id).await.unwrap();
        assert_eq!(verified.status, SslStatus::Verified);
        assert!(verified.verified_at.is_some());

        let issuing = request_issue(&h.state, cert.id).await.unwrap();
        assert_eq!(issuing.status, SslStatus::Issuing);
        let issued = wait_for_status(&h.state, cert.id, SslStatus::Issued).await;
        assert!(issued.has_material());
        assert!(issued.expires_at.is_some());

        install_on_hosting(&h.state, cert.id).await.unwrap();
        assert_eq!(
            h.panel.installed_certificate_domains(&vp),
            vec!["www.customer.example"]
        );

        let lines = h.state.issue_log.lines(cert.id).await;
        assert!(!lines.is_empty());
        let events = h.notifier.events.lock().unwrap();
        assert!(events
            .iter()
            .any(|e| matches!(e, NotifyEvent::CertificateIssued { .. })));
    }

    #[tokio::test]
    async fn test_verify_mismatch_parks_then_succeeds() {
        let h = harness();
        let hosting_id = operational_hosting(&h).await;
        let cert = request_certificate(
            &h.state,
            hosting_id,
            "shop.example".into(),
            DomainType::Custom,
            CertProvider::LetsEncrypt,
        )
        .await
        .unwrap();

        // Nothing published yet.
        let err = verify(&h.state, cert.id).await.err().unwrap();
        assert!(matches!(err, ApiError::Unprocessable(_)));
        let parked = h.state.ssl.get(cert.id).await.unwrap();
        assert_eq!(parked.status, SslStatus::Verifying);
        assert!(parked.last_error.is_some());

        // Wrong value published.
        h.dns.publish_txt(&cert.challenge_name(), "someone-elses-token");
        assert!(verify(&h.state, cert.id).await.is_err());
        assert_eq!(
            h.state.ssl.get(cert.id).await.unwrap().status,
            SslStatus::Verifying
        );

        // Right value propagates; the repeated call succeeds.
        h.dns.publish_txt(&cert.challenge_name(), &cert.txt_record);
        let verified = verify(&h.state, cert.id).await.unwrap();
        assert_eq!(verified.status, SslStatus::Verified);
        assert!(verified.last_error.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_subdomain_skips_verification() {
        let h = harness();
        let hosting_id = operational_hosting(&h).await;
        let cert = request_certificate(
            &h.state,
            hosting_id,
            "shop.hosted.example".into(),
            DomainType::Subdomain,
            CertProvider::GoogleTrust,
        )
        .await
        .unwrap();
        assert!(cert.cname_record.is_some());

        // Explicit verify is meaningless for the managed flow.
        let err = verify(&h.state, cert.id).await.err().unwrap();
        assert!(matches!(err, ApiError::Unprocessable(_)));

        // Issuance is allowed straight from PendingVerification.
        request_issue(&h.state, cert.id).await.unwrap();
        wait_for_status(&h.state, cert.id, SslStatus::Issued).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_retryable_failure_parks_issuing_for_redrive() {
        let h = harness_with_ca(MemoryCertAuthority::with_pending_rounds(1));
        let hosting_id = operational_hosting(&h).await;
        let cert = request_certificate(
            &h.state,
            hosting_id,
            "slow.example".into(),
            DomainType::Custom,
            CertProvider::LetsEncrypt,
        )
        .await
        .unwrap();
        h.dns.publish_txt(&cert.challenge_name(), &cert.txt_record);
        verify(&h.state, cert.id).await.unwrap();

        request_issue(&h.state, cert.id).await.unwrap();
        // Wait for the first attempt to finish and park the record.
        for _ in 0..200 {
            if h.ca.issue_attempts("slow.example") >= 1
                && !h.state.op_in_flight(OpKey::Ssl(cert.id)).await
            {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        let parked = h.state.ssl.get(cert.id).await.unwrap();
        assert_eq!(parked.status, SslStatus::Issuing);
        assert!(parked.last_error.is_some());

        // Second drive clears the backlog.
        request_issue(&h.state, cert.id).await.unwrap();
        let issued = wait_for_status(&h.state, cert.id, SslStatus::Issued).await;
        assert!(issued.last_error.is_none());
        assert_eq!(h.ca.issue_attempts("slow.example"), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_fatal_failure_terminates_with_notification() {
        let h = harness();
        h.ca.deny_domain("bad.example");
        let hosting_id = operational_hosting(&h).await;
        let cert = request_certificate(
            &h.state,
            hosting_id,
            "bad.example".into(),
            DomainType::Custom,
            CertProvider::LetsEncrypt,
        )
        .await
        .unwrap();
        h.dns.publish_txt(&cert.challenge_name(), &cert.txt_record);
        verify(&h.state, cert.id).await.unwrap();

        request_issue(&h.state, cert.id).await.unwrap();
        let failed = wait_for_status(&h.state, cert.id, SslStatus::Failed).await;
        assert!(failed.last_error.is_some());
        assert!(!failed.has_material());

        // Terminal: a further issue request is rejected.
        assert!(request_issue(&h.state, cert.id).await.is_err());
        let events = h.notifier.events.lock().unwrap();
        assert!(events
            .iter()
            .any(|e| matches!(e, NotifyEvent::CertificateFailed { .. })));
    }

    #[tokio::test]
    async fn test_issue_rejected_before_verification() {
        let h = harness();
        let hosting_id = operational_hosting(&h).await;
        let cert = request_certificate(
            &h.state,
            hosting_id,
            "unverified.example".into(),
            DomainType::Custom,
            CertProvider::LetsEncrypt,
        )
        .await
        .unwrap();

        let err = request_issue(&h.state, cert.id).await.err().unwrap();
        assert!(matches!(err, ApiError::Unprocessable(_)));
        assert_eq!(h.ca.issue_attempts("unverified.example"), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete_issued_revokes_and_removes_remotely() {
        let h = harness();
        let hosting_id = operational_hosting(&h).await;
        let vp = h.state.hostings.get(hosting_id).await.unwrap().vp_username;
        let cert = request_certificate(
            &h.state,
            hosting_id,
            "done.example".into(),
            DomainType::Subdomain,
            CertProvider::LetsEncrypt,
        )
        .await
        .unwrap();
        request_issue(&h.state, cert.id).await.unwrap();
        wait_for_status(&h.state, cert.id, SslStatus::Issued).await;
        install_on_hosting(&h.state, cert.id).await.unwrap();

        delete(&h.state, cert.id).await.unwrap();
        assert!(h.state.ssl.get(cert.id).await.is_none());
        assert!(h.state.issue_log.lines(cert.id).await.is_empty());
        assert_eq!(h.ca.revoke_count(), 1);
        assert!(h.panel.installed_certificate_domains(&vp).is_empty());
    }

    #[tokio::test]
    async fn test_delete_non_issued_makes_no_remote_calls() {
        let h = harness();
        let hosting_id = operational_hosting(&h).await;
        let cert = request_certificate(
            &h.state,
            hosting_id,
            "never.example".into(),
            DomainType::Custom,
            CertProvider::LetsEncrypt,
        )
        .await
        .unwrap();

        delete(&h.state, cert.id).await.unwrap();
        assert!(h.state.ssl.get(cert.id).await.is_none());
        assert_eq!(h.ca.revoke_count(), 0);
        assert_eq!(h.panel.call_count("remove_certificate"), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_install_failure_never_regresses_status() {
        let h = harness();
        let hosting_id = operational_hosting(&h).await;
        let cert = request_certificate(
            &h.state,
            hosting_id,
            "sticky.example".into(),
            DomainType::Subdomain,
            CertProvider::LetsEncrypt,
        )
        .await
        .unwrap();
        request_issue(&h.state, cert.id).await.unwrap();
        wait_for_status(&h.state, cert.id, SslStatus::Issued).await;

        h.panel.set_failing("upload_certificate", true);
        let err = install_on_hosting(&h.state, cert.id).await.err().unwrap();
        assert!(matches!(err, ApiError::Remote(_)));
        let after = h.state.ssl.get(cert.id).await.unwrap();
        assert_eq!(after.status, SslStatus::Issued);
        assert!(after.has_material());

        // Material survived; a retry succeeds.
        h.panel.set_failing("upload_certificate", false);
        install_on_hosting(&h.state, cert.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_mark_expired_only_from_issued() {
        let h = harness();
        let hosting_id = operational_hosting(&h).await;
        let cert = request_certificate(
            &h.state,
            hosting_id,
            "young.example".into(),
            DomainType::Custom,
            CertProvider::LetsEncrypt,
        )
        .await
        .unwrap();

        mark_expired(&h.state, cert.id).await;
        assert_eq!(
            h.state.ssl.get(cert.id).await.unwrap().status,
            SslStatus::PendingVerification
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_material_download_carries_private_key() {
        let h = harness();
        let hosting_id = operational_hosting(&h).await;
        let cert = request_certificate(
            &h.state,
            hosting_id,
            "app.site.example".into(),
            DomainType::Subdomain,
            CertProvider::LetsEncrypt,
        )
        .await
        .unwrap();

        // Not issued yet: nothing to download.
        let err = material(&h.state, cert.id).await.err().unwrap();
        assert!(matches!(err, ApiError::Conflict(_)));

        request_issue(&h.state, cert.id).await.unwrap();
        let issued = wait_for_status(&h.state, cert.id, SslStatus::Issued).await;

        // The record's own JSON form never leaks the key.
        let record_json = serde_json::to_value(&issued).unwrap();
        assert!(record_json.get("certificate").is_some());
        assert!(record_json.get("privateKey").is_none());
        assert!(record_json.get("private_key").is_none());

        // The download surface is the one place the key comes back.
        let bundle = material(&h.state, cert.id).await.unwrap();
        assert_eq!(Some(bundle.certificate), issued.certificate);
        assert_eq!(Some(bundle.private_key), issued.private_key);
        let bundle_json =
            serde_json::to_value(material(&h.state, cert.id).await.unwrap()).unwrap();
        assert!(bundle_json["privateKey"].as_str().unwrap().contains("PRIVATE KEY"));
    }
}
