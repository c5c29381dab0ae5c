//! SSL certificate endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::domain::{CertProvider, DomainType, SslStatus};
use crate::error::{ApiError, ApiResult};
use crate::middleware::RequireApiKey;
use crate::services::ssl;
use crate::state::{AppState, ProgressLine};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestCertificateBody {
    hosting_id: i64,
    domain: String,
    domain_type: DomainType,
    #[serde(default = "default_provider")]
    provider: CertProvider,
}

fn default_provider() -> CertProvider {
    CertProvider::LetsEncrypt
}

#[derive(Debug, Serialize)]
struct LogsResponse {
    logs: Vec<ProgressLine>,
    status: SslStatus,
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ssl", post(request_certificate))
        .route("/ssl/:id", get(get_certificate).delete(delete_certificate))
        .route("/ssl/:id/verify", post(verify_certificate))
        .route("/ssl/:id/issue", post(issue_certificate))
        .route("/ssl/:id/install", post(install_certificate))
        .route("/ssl/:id/material", get(certificate_material))
        .route("/ssl/:id/logs", get(issue_logs))
}

/// POST /ssl
///
/// Response carries the challenge token the caller must publish as a TXT
/// record (custom domains) plus the CNAME target for the managed path.
async fn request_certificate(
    _auth: RequireApiKey,
    State(state): State<Arc<AppState>>,
    Json(req): Json<RequestCertificateBody>,
) -> ApiResult<impl IntoResponse> {
    let cert = ssl::request_certificate(
        &state,
        req.hosting_id,
        req.domain,
        req.domain_type,
        req.provider,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(cert)))
}

/// GET /ssl/:id
///
/// Poll target while the status is non-terminal. Unauthenticated.
async fn get_certificate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let cert = state
        .ssl
        .get(id)
        .await
        .ok_or_else(|| ApiError::not_found("Certificate"))?;
    Ok(Json(cert))
}

/// POST /ssl/:id/verify
///
/// 422 while the TXT record has not propagated; retryable indefinitely.
async fn verify_certificate(
    _auth: RequireApiKey,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let cert = ssl::verify(&state, id).await?;
    Ok(Json(cert))
}

/// POST /ssl/:id/issue
///
/// 202; issuance runs in the background. Poll GET /ssl/:id/logs while Issuing.
async fn issue_certificate(
    _auth: RequireApiKey,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let cert = ssl::request_issue(&state, id).await?;
    Ok((StatusCode::ACCEPTED, Json(cert)))
}

/// POST /ssl/:id/install
async fn install_certificate(
    _auth: RequireApiKey,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let cert = ssl::install_on_hosting(&state, id).await?;
    Ok(Json(cert))
}

/// GET /ssl/:id/material
///
/// Full issued bundle, private key included, for installing the pair
/// elsewhere. Keyed; the open GET never returns the key. 409 until Issued.
async fn certificate_material(
    _auth: RequireApiKey,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let bundle = ssl::material(&state, id).await?;
    Ok(Json(bundle))
}

/// GET /ssl/:id/logs
///
/// Bounded most-recent-N progress buffer; polled while Issuing.
async fn issue_logs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let cert = state
        .ssl
        .get(id)
        .await
        .ok_or_else(|| ApiError::not_found("Certificate"))?;
    Ok(Json(LogsResponse {
        logs: state.issue_log.lines(id).await,
        status: cert.status,
    }))
}

/// DELETE /ssl/:id
///
/// Allowed from any state; Issued records get best-effort remote cleanup.
async fn delete_certificate(
    _auth: RequireApiKey,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    ssl::delete(&state, id).await?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}
