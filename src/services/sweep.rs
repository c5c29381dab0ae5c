//! Staleness sweep
//!
//! The reference flows have no timeout: a crash mid-operation leaves a record
//! parked in SUSPENDING, REACTIVATING or ISSUING forever. The sweep visits all
//! records on a fixed cadence and acts on those whose intermediate status has
//! sat untouched past the staleness bound with no operation in flight:
//! transitioning hostings are re-driven, stalled issuances are failed, and
//! issued certificates past their expiry are marked expired.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::SslStatus;
use crate::services::{hosting, ssl};
use crate::state::{AppState, OpKey};

/// Run the sweep until shutdown
pub async fn run(state: Arc<AppState>, shutdown: CancellationToken) {
    let cadence = Duration::from_secs(state.config.sweep_interval_secs);
    let mut ticker = tokio::time::interval(cadence);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    info!(cadence_secs = cadence.as_secs(), "Staleness sweep started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let acted = sweep_once(&state).await;
                if acted > 0 {
                    info!(acted, "Sweep acted on stale records");
                }
            }
            _ = shutdown.cancelled() => {
                info!("Staleness sweep stopped");
                return;
            }
        }
    }
}

/// One sweep pass; returns the number of records acted on
pub async fn sweep_once(state: &Arc<AppState>) -> usize {
    sweep_at(state, Utc::now()).await
}

/// Sweep pass evaluated against an explicit clock, for deterministic tests
pub async fn sweep_at(state: &Arc<AppState>, now: DateTime<Utc>) -> usize {
    let stale_after = chrono::Duration::seconds(state.config.stale_op_timeout_secs as i64);
    let mut acted = 0;

    for record in state.hostings.all().await {
        if !record.status.is_transitioning() {
            continue;
        }
        if now - record.updated_at < stale_after {
            continue;
        }
        if state.op_in_flight(OpKey::Hosting(record.id)).await {
            continue;
        }
        warn!(
            hosting_id = record.id,
            status = record.status.as_str(),
            "Re-driving stale hosting transition"
        );
        hosting::redrive(state.clone(), record.id).await;
        acted += 1;
    }

    for cert in state.ssl.all().await {
        match cert.status {
            SslStatus::Issuing => {
                if now - cert.updated_at < stale_after {
                    continue;
                }
                if state.op_in_flight(OpKey::Ssl(cert.id)).await {
                    continue;
                }
                warn!(cert_id = cert.id, "Failing stalled issuance");
                let failed = state
                    .ssl
                    .transition_from(cert.id, SslStatus::Issuing, SslStatus::Failed, |c| {
                        c.last_error = Some("issuance stalled past the staleness bound".into());
                    })
                    .await;
                if failed.is_ok() {
                    state
                        .issue_log
                        .append(cert.id, "failed: issuance stalled")
                        .await;
                    acted += 1;
                }
            }
            SslStatus::Issued => {
                if cert.expires_at.map_or(false, |at| at <= now) {
                    ssl::mark_expired(state, cert.id).await;
                    acted += 1;
                }
            }
            _ => {}
        }
    }

    acted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ca::MemoryCertAuthority;
    use crate::config::EnvConfig;
    use crate::dns::MemoryDns;
    use crate::domain::{CertProvider, DomainType, HostingStatus};
    use crate::panel::MemoryPanelConnector;
    use crate::services::hosting::{approve_panel, create, provision, request_suspend};
    use crate::services::notify::test_support::RecordingNotifier;
    use crate::services::ssl::{request_certificate, request_issue};
    use crate::domain::SuspendReason;

    struct Harness {
        state: Arc<AppState>,
        panel: Arc<MemoryPanelConnector>,
    }

    fn harness() -> Harness {
        let panel = Arc::new(MemoryPanelConnector::new());
        let state = Arc::new(AppState::with_adapters(
            EnvConfig::for_tests(),
            panel.clone(),
            Arc::new(MemoryCertAuthority::new()),
            Arc::new(MemoryDns::new()),
            Arc::new(RecordingNotifier::default()),
        ));
        Harness { state, panel }
    }

    fn past_the_bound(state: &Arc<AppState>) -> DateTime<Utc> {
        Utc::now() + chrono::Duration::seconds(state.config.stale_op_timeout_secs as i64 + 1)
    }

    async fn stuck_suspending(h: &Harness) -> i64 {
        let hosting = create(&h.state, 1, "stuck.example".into(), "starter".into()).await;
        provision(h.state.clone(), hosting.id).await;
        approve_panel(&h.state, hosting.id).await.unwrap();

        h.panel.set_failing("suspend_account", true);
        request_suspend(&h.state, hosting.id, SuspendReason::admin("abuse"))
            .await
            .unwrap();
        // Let the spawned completion fail and release its in-flight slot.
        for _ in 0..200 {
            if h.panel.call_count("suspend_account") >= 1
                && !h.state.op_in_flight(OpKey::Hosting(hosting.id)).await
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        hosting.id
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_fresh_records_are_left_alone() {
        let h = harness();
        let id = stuck_suspending(&h).await;
        h.panel.set_failing("suspend_account", false);

        assert_eq!(sweep_once(&h.state).await, 0);
        assert_eq!(
            h.state.hostings.get(id).await.unwrap().status,
            HostingStatus::Suspending
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stale_suspending_hosting_is_redriven() {
        let h = harness();
        let id = stuck_suspending(&h).await;
        h.panel.set_failing("suspend_account", false);

        let acted = sweep_at(&h.state, past_the_bound(&h.state)).await;
        assert_eq!(acted, 1);
        assert_eq!(
            h.state.hostings.get(id).await.unwrap().status,
            HostingStatus::Suspended
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stale_issuing_certificate_is_failed() {
        let h = harness();
        let hosting = create(&h.state, 1, "site.example".into(), "starter".into()).await;
        provision(h.state.clone(), hosting.id).await;
        approve_panel(&h.state, hosting.id).await.unwrap();

        let cert = request_certificate(
            &h.state,
            hosting.id,
            "stalled.example".into(),
            DomainType::Custom,
            CertProvider::LetsEncrypt,
        )
        .await
        .unwrap();
        // Park the record in Issuing without a driver, as a crash would.
        h.state
            .ssl
            .transition(cert.id, SslStatus::Issuing, |_| {})
            .await
            .unwrap();

        let acted = sweep_at(&h.state, past_the_bound(&h.state)).await;
        assert_eq!(acted, 1);
        let failed = h.state.ssl.get(cert.id).await.unwrap();
        assert_eq!(failed.status, SslStatus::Failed);
        assert!(failed.last_error.is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_issued_certificate_past_expiry_is_expired() {
        let h = harness();
        let hosting = create(&h.state, 1, "site.example".into(), "starter".into()).await;
        provision(h.state.clone(), hosting.id).await;
        approve_panel(&h.state, hosting.id).await.unwrap();

        let cert = request_certificate(
            &h.state,
            hosting.id,
            "old.hosted.example".into(),
            DomainType::Subdomain,
            CertProvider::LetsEncrypt,
        )
        .await
        .unwrap();
        request_issue(&h.state, cert.id).await.unwrap();
        for _ in 0..200 {
            if h.state.ssl.get(cert.id).await.unwrap().status == SslStatus::Issued {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        // Material expires in ~90 days; sweep with a clock past that.
        let far_future = Utc::now() + chrono::Duration::days(91);
        let acted = sweep_at(&h.state, far_future).await;
        assert_eq!(acted, 1);
        assert_eq!(
            h.state.ssl.get(cert.id).await.unwrap().status,
            SslStatus::Expired
        );
    }
}
