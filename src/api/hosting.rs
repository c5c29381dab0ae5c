//! Hosting lifecycle endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::domain::{Hosting, SuspendReason};
use crate::error::ApiResult;
use crate::middleware::RequireApiKey;
use crate::services::hosting;
use crate::services::hosting::SyncOutcome;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateHostingRequest {
    user_id: i64,
    domain: String,
    package: String,
}

#[derive(Debug, Deserialize)]
struct SuspendRequest {
    reason: SuspendReason,
}

#[derive(Debug, Deserialize)]
struct CreateDatabaseRequest {
    name: String,
}

#[derive(Debug, Deserialize)]
struct SyncQuery {
    #[serde(default)]
    sync: bool,
}

/// Hosting record plus the derived operability flag clients branch on
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HostingView {
    #[serde(flatten)]
    hosting: Hosting,
    is_operational: bool,
}

impl From<Hosting> for HostingView {
    fn from(hosting: Hosting) -> Self {
        let is_operational = hosting::is_operational(&hosting);
        Self {
            hosting,
            is_operational,
        }
    }
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/hostings", post(create_hosting))
        .route("/hostings/:id", get(get_hosting).delete(delete_hosting))
        .route("/hostings/:id/approve-panel", post(approve_panel))
        .route("/hostings/:id/suspend", post(suspend_hosting))
        .route("/hostings/:id/unsuspend", post(unsuspend_hosting))
        .route(
            "/hostings/:id/databases",
            get(list_databases).post(create_database),
        )
        .route("/hostings/:id/databases/:name", delete(delete_database))
}

/// POST /hostings
///
/// Creates the record in Pending and provisions the remote account in the
/// background; poll GET /hostings/:id until Active.
async fn create_hosting(
    _auth: RequireApiKey,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateHostingRequest>,
) -> ApiResult<impl IntoResponse> {
    let hosting = hosting::create(&state, req.user_id, req.domain, req.package).await;
    let id = hosting.id;
    let state = state.clone();
    tokio::spawn(async move { hosting::provision(state, id).await });
    Ok((StatusCode::CREATED, Json(hosting)))
}

/// GET /hostings/:id
///
/// Poll target while the status is transitioning. Unauthenticated.
async fn get_hosting(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let hosting = state
        .hostings
        .get(id)
        .await
        .ok_or_else(|| crate::error::ApiError::not_found("Hosting"))?;
    Ok(Json(HostingView::from(hosting)))
}

/// POST /hostings/:id/approve-panel
async fn approve_panel(
    _auth: RequireApiKey,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let hosting = hosting::approve_panel(&state, id).await?;
    Ok(Json(hosting))
}

/// POST /hostings/:id/suspend
///
/// Requires status Active; 202 with the record already in Suspending.
async fn suspend_hosting(
    _auth: RequireApiKey,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<SuspendRequest>,
) -> ApiResult<impl IntoResponse> {
    let hosting = hosting::request_suspend(&state, id, req.reason).await?;
    Ok((StatusCode::ACCEPTED, Json(hosting)))
}

/// POST /hostings/:id/unsuspend
///
/// Requires status Suspended; 202 with the record already in Reactivating.
async fn unsuspend_hosting(
    _auth: RequireApiKey,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let hosting = hosting::request_reactivate(&state, id).await?;
    Ok((StatusCode::ACCEPTED, Json(hosting)))
}

/// DELETE /hostings/:id
///
/// Remote teardown runs in the background; 202 immediately.
async fn delete_hosting(
    _auth: RequireApiKey,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let hosting = hosting::request_delete(&state, id).await?;
    Ok((StatusCode::ACCEPTED, Json(hosting)))
}

/// GET /hostings/:vp/databases?sync=true
///
/// With sync=true, reconciles against the live panel list first; without it,
/// returns the cached local list with synced=false.
async fn list_databases(
    _auth: RequireApiKey,
    State(state): State<Arc<AppState>>,
    Path(vp): Path<String>,
    Query(query): Query<SyncQuery>,
) -> ApiResult<impl IntoResponse> {
    if query.sync {
        let outcome = hosting::sync_databases(&state, &vp).await?;
        return Ok(Json(outcome));
    }

    let hosting = state
        .hostings
        .get_by_vp(&vp)
        .await
        .ok_or_else(|| crate::error::ApiError::not_found("Hosting"))?;
    Ok(Json(SyncOutcome {
        databases: state.hostings.databases(hosting.id).await,
        synced: false,
        sync_error: None,
    }))
}

/// POST /hostings/:vp/databases
async fn create_database(
    _auth: RequireApiKey,
    State(state): State<Arc<AppState>>,
    Path(vp): Path<String>,
    Json(req): Json<CreateDatabaseRequest>,
) -> ApiResult<impl IntoResponse> {
    let database = hosting::create_database(&state, &vp, &req.name).await?;
    Ok((StatusCode::CREATED, Json(database)))
}

/// DELETE /hostings/:vp/databases/:name
async fn delete_database(
    _auth: RequireApiKey,
    State(state): State<Arc<AppState>>,
    Path((vp, name)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    hosting::delete_database(&state, &vp, &name).await?;
    Ok(Json(serde_json::json!({ "deleted": name })))
}
