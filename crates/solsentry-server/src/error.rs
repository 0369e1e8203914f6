//! HTTP error types for the `SolSentry` server.
//!
//! Maps domain errors from `solsentry-core` and `solsentry-storage` into
//! HTTP responses. Every error variant produces a JSON body with a
//! machine-readable `error` field and a human-readable `message`.

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use solsentry_core::error::{
    AiError, AuditError, AuthError, PipelineError, RateLimitError, ScanError,
};
use solsentry_storage::StorageError;

/// Application-level error returned from HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    /// Client sent invalid input.
    BadRequest(String),
    /// Authentication failed or token invalid.
    Unauthorized(String),
    /// Authenticated, but the role or ownership check failed.
    Forbidden(String),
    /// Requested resource not found.
    NotFound(String),
    /// A uniqueness conflict (e.g., email already registered).
    Conflict(String),
    /// Submitted source exceeds the configured limit.
    PayloadTooLarge(String),
    /// The caller exhausted a rate limit.
    RateLimited { retry_after_secs: u64 },
    /// The AI provider failed or returned garbage.
    AiUpstream(String),
    /// No AI provider is configured.
    AiUnavailable,
    /// Internal server error. The message is logged, never returned.
    Internal(String),
}

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut retry_after = None;
        let (status, error_type, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            Self::PayloadTooLarge(msg) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", msg)
            }
            Self::RateLimited { retry_after_secs } => {
                retry_after = Some(retry_after_secs);
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    "rate_limited",
                    format!("rate limit exceeded, retry after {retry_after_secs}s"),
                )
            }
            Self::AiUpstream(msg) => (StatusCode::BAD_GATEWAY, "ai_upstream_error", msg),
            Self::AiUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "ai_unavailable",
                "AI provider is not configured".to_owned(),
            ),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal server error".to_owned(),
                )
            }
        };

        let body = ErrorBody {
            error: error_type,
            message,
        };

        let mut response = (status, axum::Json(body)).into_response();
        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { .. } => Self::NotFound(err.to_string()),
            StorageError::Conflict { .. } => Self::Conflict(err.to_string()),
            StorageError::Open { .. } | StorageError::Backend { .. } => {
                Self::Internal(err.to_string())
            }
        }
    }
}

impl From<ScanError> for AppError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::EmptySource => Self::BadRequest(err.to_string()),
            ScanError::TooLarge { .. } => Self::PayloadTooLarge(err.to_string()),
        }
    }
}

impl From<AiError> for AppError {
    fn from(err: AiError) -> Self {
        match err {
            AiError::NotConfigured => Self::AiUnavailable,
            AiError::Http { .. }
            | AiError::Upstream { .. }
            | AiError::Timeout
            | AiError::InvalidResponse { .. } => Self::AiUpstream(err.to_string()),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials
            | AuthError::TokenExpired
            | AuthError::InvalidToken { .. } => Self::Unauthorized(err.to_string()),
            AuthError::WeakPassword { .. } | AuthError::InvalidEmail => {
                Self::BadRequest(err.to_string())
            }
            AuthError::Hash { .. } => Self::Internal(err.to_string()),
        }
    }
}

impl From<RateLimitError> for AppError {
    fn from(err: RateLimitError) -> Self {
        let RateLimitError::Exceeded { retry_after_secs } = err;
        Self::RateLimited { retry_after_secs }
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Scan(e) => e.into(),
            PipelineError::Ai(e) => e.into(),
        }
    }
}

impl From<AuditError> for AppError {
    fn from(err: AuditError) -> Self {
        Self::Internal(err.to_string())
    }
}
