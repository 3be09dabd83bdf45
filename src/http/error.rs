//! Error responses for the HTTP API.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::error;

use crate::identity::AuthError;
use crate::ledger::QuotaDenied;
use crate::services::{ServiceError, UploadFailure};

/// Errors returned by API handlers.
///
/// Every variant renders as `{"error": ..., "code": ..., "retryable": ...}`
/// with an optional `details` object.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthenticated(AuthError),

    #[error("{0}")]
    Denied(QuotaDenied),

    #[error("upload link has expired or does not exist")]
    LinkExpired,

    #[error("upload link has already been used")]
    AlreadyUsed,

    #[error("{0}")]
    UploadFailed(UploadFailure),

    #[error("unknown tier '{0}'")]
    UnknownTier(String),

    #[error("account is already registered")]
    AlreadyRegistered,

    #[error("account is not registered")]
    NotRegistered,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("request body too large")]
    PayloadTooLarge,

    #[error("timed out during {0}")]
    Timeout(&'static str),

    #[error("internal error")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
    retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl ApiError {
    /// Status code for this error.
    ///
    /// - Unauthenticated: 401 (503 if the identity provider is down)
    /// - Denied: 429
    /// - LinkExpired: 410
    /// - AlreadyUsed, AlreadyRegistered: 409
    /// - UploadFailed: 502
    /// - BadRequest, UnknownTier: 400
    /// - NotRegistered: 404
    /// - PayloadTooLarge: 413
    /// - Timeout: 503
    /// - Internal: 500
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthenticated(AuthError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Denied(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::LinkExpired => StatusCode::GONE,
            Self::AlreadyUsed | Self::AlreadyRegistered => StatusCode::CONFLICT,
            Self::UploadFailed(_) => StatusCode::BAD_GATEWAY,
            Self::BadRequest(_) | Self::UnknownTier(_) => StatusCode::BAD_REQUEST,
            Self::NotRegistered => StatusCode::NOT_FOUND,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthenticated(AuthError::MissingCredential) => "missing_credential",
            Self::Unauthenticated(AuthError::Invalid) => "invalid_credential",
            Self::Unauthenticated(AuthError::Expired) => "expired_credential",
            Self::Unauthenticated(AuthError::Unavailable(_)) => "identity_unavailable",
            Self::Denied(_) => "quota_exceeded",
            Self::LinkExpired => "link_expired",
            Self::AlreadyUsed => "already_used",
            Self::UploadFailed(_) => "upload_failed",
            Self::UnknownTier(_) => "unknown_tier",
            Self::AlreadyRegistered => "already_registered",
            Self::NotRegistered => "not_registered",
            Self::BadRequest(_) => "bad_request",
            Self::PayloadTooLarge => "payload_too_large",
            Self::Timeout(_) => "timeout",
            Self::Internal(_) => "internal",
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unauthenticated(AuthError::Unavailable(_)) => true,
            Self::UploadFailed(failure) => failure.retryable,
            Self::Timeout(_) | Self::Internal(_) => true,
            _ => false,
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            Self::Denied(denied) => Some(json!({
                "tier": denied.tier,
                "limit": denied.limit,
                "issued": denied.issued,
                "resetAt": denied.period_reset_at,
            })),
            Self::UploadFailed(failure) => Some(json!({ "image": failure.image })),
            _ => None,
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Timeout { operation } => Self::Timeout(operation),
            ServiceError::InvalidRequest(msg) => Self::BadRequest(msg),
            ServiceError::Storage(e) => Self::Internal(e.to_string()),
            ServiceError::Internal(msg) => Self::Internal(msg),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::Unauthenticated(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if let Self::Internal(detail) = &self {
            error!(error = %detail, "Request failed");
        }

        let body = ErrorBody {
            error: self.to_string(),
            code: self.code(),
            retryable: self.is_retryable(),
            details: self.details(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            ApiError::Unauthenticated(AuthError::Expired).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Unauthenticated(AuthError::Unavailable("down".into())).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(ApiError::LinkExpired.status_code(), StatusCode::GONE);
        assert_eq!(ApiError::AlreadyUsed.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::PayloadTooLarge.status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ApiError::Timeout("consume").status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_denied_carries_limit_details() {
        let err = ApiError::Denied(QuotaDenied {
            tier: "free".to_string(),
            limit: 10,
            issued: 10,
            period_reset_at: Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap(),
        });
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert!(!err.is_retryable());
        let details = err.details().unwrap();
        assert_eq!(details["limit"], 10);
        assert_eq!(details["tier"], "free");
    }

    #[test]
    fn test_upload_failure_retryability_passes_through() {
        let transient = ApiError::UploadFailed(UploadFailure {
            image: 2,
            reason: "503".to_string(),
            retryable: true,
        });
        assert_eq!(transient.status_code(), StatusCode::BAD_GATEWAY);
        assert!(transient.is_retryable());

        let permanent = ApiError::UploadFailed(UploadFailure {
            image: 1,
            reason: "rejected".to_string(),
            retryable: false,
        });
        assert!(!permanent.is_retryable());
    }

    #[test]
    fn test_service_error_mapping() {
        let err: ApiError = ServiceError::Timeout { operation: "redeem_token" }.into();
        assert!(matches!(err, ApiError::Timeout("redeem_token")));
        let err: ApiError = ServiceError::InvalidRequest("empty".into()).into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
