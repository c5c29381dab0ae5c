//! Hosting lifecycle service
//!
//! Owns the hosting status state machine and database reconciliation. The
//! request_* entry points persist the intermediate status synchronously so
//! concurrent callers see progress, then drive the remote panel from a
//! background task; completion is observed by polling, never pushed.

use std::sync::Arc;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::{Database, Hosting, HostingStatus, SuspendReason};
use crate::error::{ApiError, ApiResult, RejectCode};
use crate::panel::{with_session, PanelError, PanelLogin};
use crate::services::notify::NotifyEvent;
use crate::state::{AppState, OpKey};

/// Result of a database reconciliation pass
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    pub databases: Vec<Database>,
    /// False when the remote list could not be fetched; `databases` is then
    /// the last-known local set
    pub synced: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_error: Option<String>,
}

/// True iff every feature operation may run against this hosting
pub fn is_operational(hosting: &Hosting) -> bool {
    hosting.status == HostingStatus::Active && hosting.panel_approved
}

/// Check operability, returning the highest-precedence rejection
///
/// Precedence: PENDING > SUSPENDING > SUSPENDED > REACTIVATING > NOT_ACTIVE >
/// CPANEL_NOT_APPROVED. First match wins, deterministic for testing.
pub fn ensure_operational(hosting: &Hosting) -> ApiResult<()> {
    if let Some(code) = RejectCode::from_status(hosting.status) {
        return Err(ApiError::NotOperational(code));
    }
    if !hosting.panel_approved {
        return Err(ApiError::NotOperational(RejectCode::CpanelNotApproved));
    }
    Ok(())
}

/// Create a hosting record in Pending
pub async fn create(
    state: &Arc<AppState>,
    user_id: i64,
    domain: String,
    package: String,
) -> Hosting {
    let hosting = state.hostings.create(user_id, domain, package).await;
    info!(
        hosting_id = hosting.id,
        vp_username = %hosting.vp_username,
        domain = %hosting.domain,
        "Hosting record created"
    );
    hosting
}

/// Drive a Pending record through remote account creation to Active
///
/// Re-drivable: a failed attempt leaves the record in Pending.
pub async fn provision(state: Arc<AppState>, hosting_id: i64) {
    let Some(_token) = state.try_begin_op(OpKey::Hosting(hosting_id)).await else {
        return; // already being driven
    };

    if let Err(e) = provision_inner(&state, hosting_id).await {
        error!(hosting_id, error = %e, "Provisioning failed, record stays pending");
    }
    state.end_op(OpKey::Hosting(hosting_id)).await;
}

async fn provision_inner(state: &Arc<AppState>, hosting_id: i64) -> ApiResult<()> {
    let hosting = state
        .hostings
        .get(hosting_id)
        .await
        .ok_or_else(|| ApiError::not_found("Hosting"))?;
    if hosting.status != HostingStatus::Pending {
        return Ok(()); // nothing to drive
    }

    let password = generate_panel_password();
    let username = hosting.vp_username.clone();
    let domain = hosting.domain.clone();
    let package = hosting.package.clone();

    with_session(&state.panel, PanelLogin::Reseller, |s| {
        let password = password.clone();
        Box::pin(async move {
            s.create_account(&username, &password, &domain, &package)
                .await
        })
    })
    .await
    .map_err(|e| ApiError::remote(e.to_string()))?;

    let hosting = state
        .hostings
        .transition(hosting_id, HostingStatus::Pending, HostingStatus::Active, |h| {
            h.password = Some(password);
            h.activated_at = Some(chrono::Utc::now());
        })
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    info!(hosting_id, domain = %hosting.domain, "Hosting activated");
    state
        .notifier
        .emit(NotifyEvent::HostingActivated {
            hosting_id,
            domain: hosting.domain,
        })
        .await;
    Ok(())
}

/// Record that the customer has approved panel logins for this account
///
/// Feature operations stay rejected with CPANEL_NOT_APPROVED until this runs.
pub async fn approve_panel(state: &Arc<AppState>, hosting_id: i64) -> ApiResult<Hosting> {
    state
        .hostings
        .update(hosting_id, |h| h.panel_approved = true)
        .await
        .ok_or_else(|| ApiError::not_found("Hosting"))
}

/// Request suspension: persists Suspending and returns; the remote call and
/// the final Suspended write happen asynchronously
pub async fn request_suspend(
    state: &Arc<AppState>,
    hosting_id: i64,
    reason: SuspendReason,
) -> ApiResult<Hosting> {
    let hosting = state
        .hostings
        .get(hosting_id)
        .await
        .ok_or_else(|| ApiError::not_found("Hosting"))?;

    if let Some(code) = RejectCode::from_status(hosting.status) {
        // Wrong state: no mutation, structured code.
        return Err(ApiError::NotOperational(code));
    }

    let hosting = state
        .hostings
        .transition(
            hosting_id,
            HostingStatus::Active,
            HostingStatus::Suspending,
            |h| h.suspend_reason = Some(reason),
        )
        .await
        .map_err(|e| ApiError::conflict(e.to_string()))?;

    let state = state.clone();
    tokio::spawn(async move { complete_suspend(state, hosting_id).await });
    Ok(hosting)
}

/// Finish a suspension: remote call, then Suspending -> Suspended
///
/// Safe to re-invoke; the in-flight registry guarantees at most one remote
/// mutation at a time, and a remote failure leaves the record in Suspending
/// for a later re-drive.
pub async fn complete_suspend(state: Arc<AppState>, hosting_id: i64) {
    let Some(_token) = state.try_begin_op(OpKey::Hosting(hosting_id)).await else {
        return;
    };

    if let Err(e) = complete_suspend_inner(&state, hosting_id).await {
        warn!(hosting_id, error = %e, "Suspend incomplete, record stays suspending");
    }
    state.end_op(OpKey::Hosting(hosting_id)).await;
}

async fn complete_suspend_inner(state: &Arc<AppState>, hosting_id: i64) -> Result<(), PanelError> {
    let Some(hosting) = state.hostings.get(hosting_id).await else {
        return Ok(());
    };
    if hosting.status != HostingStatus::Suspending {
        return Ok(());
    }

    let username = hosting.vp_username.clone();
    with_session(&state.panel, PanelLogin::Reseller, |s| {
        Box::pin(async move { s.suspend_account(&username).await })
    })
    .await?;

    match state
        .hostings
        .transition(
            hosting_id,
            HostingStatus::Suspending,
            HostingStatus::Suspended,
            |h| h.suspended_at = Some(chrono::Utc::now()),
        )
        .await
    {
        Ok(hosting) => {
            let kind = hosting
                .suspend_reason
                .as_ref()
                .map(|r| format!("{:?}", r.kind))
                .unwrap_or_default();
            info!(hosting_id, "Hosting suspended");
            state
                .notifier
                .emit(NotifyEvent::HostingSuspended { hosting_id, kind })
                .await;
        }
        Err(e) => error!(hosting_id, error = %e, "Suspended write failed"),
    }
    Ok(())
}

/// Request reactivation: persists Reactivating and returns
pub async fn request_reactivate(state: &Arc<AppState>, hosting_id: i64) -> ApiResult<Hosting> {
    let hosting = state
        .hostings
        .get(hosting_id)
        .await
        .ok_or_else(|| ApiError::not_found("Hosting"))?;

    if hosting.status != HostingStatus::Suspended {
        let code = RejectCode::from_status(hosting.status).unwrap_or(RejectCode::NotActive);
        return Err(ApiError::NotOperational(code));
    }

    let hosting = state
        .hostings
        .transition(
            hosting_id,
            HostingStatus::Suspended,
            HostingStatus::Reactivating,
            |_| {},
        )
        .await
        .map_err(|e| ApiError::conflict(e.to_string()))?;

    let state = state.clone();
    tokio::spawn(async move { complete_reactivate(state, hosting_id).await });
    Ok(hosting)
}

/// Finish a reactivation: remote call, then Reactivating -> Active
pub async fn complete_reactivate(state: Arc<AppState>, hosting_id: i64) {
    let Some(_token) = state.try_begin_op(OpKey::Hosting(hosting_id)).await else {
        return;
    };

    if let Err(e) = complete_reactivate_inner(&state, hosting_id).await {
        warn!(hosting_id, error = %e, "Reactivate incomplete, record stays reactivating");
    }
    state.end_op(OpKey::Hosting(hosting_id)).await;
}

async fn complete_reactivate_inner(
    state: &Arc<AppState>,
    hosting_id: i64,
) -> Result<(), PanelError> {
    let Some(hosting) = state.hostings.get(hosting_id).await else {
        return Ok(());
    };
    if hosting.status != HostingStatus::Reactivating {
        return Ok(());
    }

    let username = hosting.vp_username.clone();
    with_session(&state.panel, PanelLogin::Reseller, |s| {
        Box::pin(async move { s.unsuspend_account(&username).await })
    })
    .await?;

    match state
        .hostings
        .transition(
            hosting_id,
            HostingStatus::Reactivating,
            HostingStatus::Active,
            |h| {
                h.suspend_reason = None;
                h.suspended_at = None;
            },
        )
        .await
    {
        Ok(_) => {
            info!(hosting_id, "Hosting reactivated");
            state
                .notifier
                .emit(NotifyEvent::HostingReactivated { hosting_id })
                .await;
        }
        Err(e) => error!(hosting_id, error = %e, "Active write failed"),
    }
    Ok(())
}

/// Soft-delete: remote teardown best-effort, then status Deleted
pub async fn request_delete(state: &Arc<AppState>, hosting_id: i64) -> ApiResult<Hosting> {
    let hosting = state
        .hostings
        .get(hosting_id)
        .await
        .ok_or_else(|| ApiError::not_found("Hosting"))?;

    match hosting.status {
        HostingStatus::Active | HostingStatus::Suspended => {}
        other => {
            let code = RejectCode::from_status(other).unwrap_or(RejectCode::NotActive);
            return Err(ApiError::NotOperational(code));
        }
    }

    let state_clone = state.clone();
    tokio::spawn(async move { complete_delete(state_clone, hosting_id).await });
    Ok(hosting)
}

/// Finish a deletion. A vanished remote account is treated as already done.
pub async fn complete_delete(state: Arc<AppState>, hosting_id: i64) {
    let Some(_token) = state.try_begin_op(OpKey::Hosting(hosting_id)).await else {
        return;
    };

    let result = complete_delete_inner(&state, hosting_id).await;
    if let Err(e) = result {
        warn!(hosting_id, error = %e, "Delete incomplete, status unchanged");
    }
    state.end_op(OpKey::Hosting(hosting_id)).await;
}

async fn complete_delete_inner(state: &Arc<AppState>, hosting_id: i64) -> Result<(), PanelError> {
    let Some(hosting) = state.hostings.get(hosting_id).await else {
        return Ok(());
    };
    let from = hosting.status;
    if !matches!(from, HostingStatus::Active | HostingStatus::Suspended) {
        return Ok(());
    }

    let username = hosting.vp_username.clone();
    let remote = with_session(&state.panel, PanelLogin::Reseller, |s| {
        Box::pin(async move { s.delete_account(&username).await })
    })
    .await;
    match remote {
        Ok(()) => {}
        Err(PanelError::AccountNotFound(_)) => {
            info!(hosting_id, "Remote account already gone");
        }
        Err(e) => return Err(e),
    }

    match state
        .hostings
        .transition(hosting_id, from, HostingStatus::Deleted, |_| {})
        .await
    {
        Ok(_) => {
            info!(hosting_id, "Hosting deleted");
            state
                .notifier
                .emit(NotifyEvent::HostingDeleted { hosting_id })
                .await;
        }
        Err(e) => error!(hosting_id, error = %e, "Deleted write failed"),
    }
    Ok(())
}

/// Re-drive a record stuck in an intermediate status (sweep entry point)
pub async fn redrive(state: Arc<AppState>, hosting_id: i64) {
    let Some(hosting) = state.hostings.get(hosting_id).await else {
        return;
    };
    match hosting.status {
        HostingStatus::Suspending => complete_suspend(state, hosting_id).await,
        HostingStatus::Reactivating => complete_reactivate(state, hosting_id).await,
        _ => {}
    }
}

/// Reconcile local database rows against the remote panel's live list
///
/// Never fails the whole call on a session error: degrades to the last-known
/// local list with `synced = false` and the error preserved.
pub async fn sync_databases(state: &Arc<AppState>, vp_username: &str) -> ApiResult<SyncOutcome> {
    let hosting = state
        .hostings
        .get_by_vp(vp_username)
        .await
        .ok_or_else(|| ApiError::not_found("Hosting"))?;
    ensure_operational(&hosting)?;

    let password = hosting
        .password
        .clone()
        .ok_or_else(|| ApiError::internal("active hosting without panel credential"))?;

    let remote = with_session(
        &state.panel,
        PanelLogin::Account {
            username: &hosting.vp_username,
            password: &password,
        },
        |s| Box::pin(async move { s.list_databases().await }),
    )
    .await;

    let remote_names = match remote {
        Ok(names) => names,
        Err(e) => {
            warn!(
                hosting_id = hosting.id,
                error = %e,
                "Database sync degraded to cached list"
            );
            return Ok(SyncOutcome {
                databases: state.hostings.databases(hosting.id).await,
                synced: false,
                sync_error: Some(e.to_string()),
            });
        }
    };

    let local = state.hostings.databases(hosting.id).await;

    // add-missing ∪ remove-not-present; order-independent and idempotent
    for name in &remote_names {
        if !local.iter().any(|d| &d.name == name) {
            state
                .hostings
                .add_database(hosting.id, Database::new(&hosting.vp_username, name.clone()))
                .await;
        }
    }
    for db in &local {
        if !remote_names.contains(&db.name) {
            state.hostings.remove_database(hosting.id, &db.name).await;
        }
    }

    Ok(SyncOutcome {
        databases: state.hostings.databases(hosting.id).await,
        synced: true,
        sync_error: None,
    })
}

/// Create a database remotely, then mirror it locally
pub async fn create_database(
    state: &Arc<AppState>,
    vp_username: &str,
    name: &str,
) -> ApiResult<Database> {
    let hosting = state
        .hostings
        .get_by_vp(vp_username)
        .await
        .ok_or_else(|| ApiError::not_found("Hosting"))?;
    ensure_operational(&hosting)?;

    let password = hosting
        .password
        .clone()
        .ok_or_else(|| ApiError::internal("active hosting without panel credential"))?;

    let owned_name = name.to_string();
    with_session(
        &state.panel,
        PanelLogin::Account {
            username: &hosting.vp_username,
            password: &password,
        },
        |s| Box::pin(async move { s.create_database(&owned_name).await }),
    )
    .await
    .map_err(|e| ApiError::remote(e.to_string()))?;

    let database = Database::new(&hosting.vp_username, name);
    state.hostings.add_database(hosting.id, database.clone()).await;
    Ok(database)
}

/// Drop a database remotely, then remove the local row
pub async fn delete_database(
    state: &Arc<AppState>,
    vp_username: &str,
    name: &str,
) -> ApiResult<()> {
    let hosting = state
        .hostings
        .get_by_vp(vp_username)
        .await
        .ok_or_else(|| ApiError::not_found("Hosting"))?;
    ensure_operational(&hosting)?;

    let password = hosting
        .password
        .clone()
        .ok_or_else(|| ApiError::internal("active hosting without panel credential"))?;

    let owned_name = name.to_string();
    with_session(
        &state.panel,
        PanelLogin::Account {
            username: &hosting.vp_username,
            password: &password,
        },
        |s| Box::pin(async move { s.drop_database(&owned_name).await }),
    )
    .await
    .map_err(|e| ApiError::remote(e.to_string()))?;

    state.hostings.remove_database(hosting.id, name).await;
    Ok(())
}

fn generate_panel_password() -> String {
    Uuid::new_v4().simple().to_string()
}
