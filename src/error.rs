//! Unified error handling
//!
//! `ApiError` implements `IntoResponse` so handlers return a single error type
//! instead of hand-rolled `(StatusCode, Json<...>)` tuples. Operability
//! rejections carry the `{error, errorCode}` shape callers depend on to render
//! distinct UI states.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::domain::HostingStatus;

/// Machine-readable code attached to an operability rejection
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectCode {
    Pending,
    Suspending,
    Suspended,
    Reactivating,
    NotActive,
    CpanelNotApproved,
}

impl RejectCode {
    /// Rejection code for a non-active status. The panel-approval check ranks
    /// below every status code; callers apply it only when this returns None.
    pub fn from_status(status: HostingStatus) -> Option<Self> {
        match status {
            HostingStatus::Active => None,
            HostingStatus::Pending => Some(RejectCode::Pending),
            HostingStatus::Suspending => Some(RejectCode::Suspending),
            HostingStatus::Suspended => Some(RejectCode::Suspended),
            HostingStatus::Reactivating => Some(RejectCode::Reactivating),
            HostingStatus::Deleted => Some(RejectCode::NotActive),
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            RejectCode::Pending => "Hosting account is still being provisioned",
            RejectCode::Suspending => "Hosting account is being suspended",
            RejectCode::Suspended => "Hosting account is suspended",
            RejectCode::Reactivating => "Hosting account is being reactivated",
            RejectCode::NotActive => "Hosting account is not active",
            RejectCode::CpanelNotApproved => "Panel login has not been approved yet",
        }
    }
}

/// Generic API error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}

/// Operability rejection body. The exact field names are a wire contract.
#[derive(Debug, Serialize)]
pub struct RejectionResponse {
    pub error: String,
    #[serde(rename = "errorCode")]
    pub error_code: RejectCode,
}

/// Unified API error type
#[derive(Debug)]
pub enum ApiError {
    /// 401 - invalid or missing API key
    Unauthorized,
    /// 404 - resource not found
    NotFound(String),
    /// 400 - malformed request
    BadRequest(String),
    /// 409 - wrong state for the requested transition
    Conflict(String),
    /// 409 - hosting not operational, with structured code
    NotOperational(RejectCode),
    /// 422 - retryable validation failure (DNS not propagated, etc.)
    Unprocessable(String),
    /// 502 - remote panel or CA call failed
    Remote(String),
    /// 500 - internal error
    Internal(String),
}

impl ApiError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::Unprocessable(message.into())
    }

    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Structured operability rejections use their own body shape.
        if let ApiError::NotOperational(code) = self {
            let body = RejectionResponse {
                error: code.message().to_string(),
                error_code: code,
            };
            return (StatusCode::CONFLICT, Json(body)).into_response();
        }

        let (status, error_type, message) = match self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Invalid or missing API key".to_string(),
            ),
            ApiError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                "not_found",
                format!("{} not found", resource),
            ),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            ApiError::Unprocessable(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "unprocessable", msg)
            }
            ApiError::Remote(msg) => (StatusCode::BAD_GATEWAY, "remote_error", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
            ApiError::NotOperational(_) => unreachable!(),
        };

        let body = ErrorResponse::new(error_type, message);
        (status, Json(body)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Unauthorized => write!(f, "Unauthorized"),
            ApiError::NotFound(r) => write!(f, "Not found: {}", r),
            ApiError::BadRequest(m) => write!(f, "Bad request: {}", m),
            ApiError::Conflict(m) => write!(f, "Conflict: {}", m),
            ApiError::NotOperational(c) => write!(f, "Not operational: {}", c.message()),
            ApiError::Unprocessable(m) => write!(f, "Unprocessable: {}", m),
            ApiError::Remote(m) => write!(f, "Remote error: {}", m),
            ApiError::Internal(m) => write!(f, "Internal error: {}", m),
        }
    }
}

impl std::error::Error for ApiError {}

/// Convenience alias
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reject_code_from_status() {
        assert_eq!(RejectCode::from_status(HostingStatus::Active), None);
        assert_eq!(
            RejectCode::from_status(HostingStatus::Pending),
            Some(RejectCode::Pending)
        );
        assert_eq!(
            RejectCode::from_status(HostingStatus::Deleted),
            Some(RejectCode::NotActive)
        );
    }

    #[test]
    fn test_reject_code_wire_names() {
        let json = serde_json::to_string(&RejectCode::CpanelNotApproved).unwrap();
        assert_eq!(json, "\"CPANEL_NOT_APPROVED\"");
        let json = serde_json::to_string(&RejectCode::NotActive).unwrap();
        assert_eq!(json, "\"NOT_ACTIVE\"");
    }

    #[test]
    fn test_error_response_shape() {
        let json = serde_json::to_value(ErrorResponse::new("not_found", "hosting not found")).unwrap();
        assert_eq!(
            json.as_object().unwrap().keys().collect::<Vec<_>>(),
            vec!["error", "message"]
        );
    }

    #[test]
    fn test_rejection_response_shape() {
        let body = RejectionResponse {
            error: RejectCode::Suspended.message().to_string(),
            error_code: RejectCode::Suspended,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["errorCode"], "SUSPENDED");
        assert!(json["error"].is_string());
    }
}
