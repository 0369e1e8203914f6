//! Error types for `solsentry-core`.
//!
//! One enum per concern. Messages never include credentials, token values,
//! or API keys; upstream bodies are truncated before they are wrapped.

/// Errors from the heuristic scanner and gas estimator.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// The submitted source was empty or whitespace only.
    #[error("source is empty")]
    EmptySource,

    /// The submitted source exceeds the configured size limit.
    #[error("source is {actual} bytes, limit is {limit} bytes")]
    TooLarge { actual: usize, limit: usize },
}

/// Errors from the external AI provider.
#[derive(Debug, thiserror::Error)]
pub enum AiError {
    /// No provider is configured (missing API key).
    #[error("AI provider is not configured")]
    NotConfigured,

    /// The HTTP request could not be sent or the body could not be read.
    #[error("AI request failed: {reason}")]
    Http { reason: String },

    /// The provider answered with a non-success status.
    #[error("AI provider returned {status}: {body}")]
    Upstream { status: u16, body: String },

    /// The provider did not answer within the configured timeout.
    #[error("AI request timed out")]
    Timeout,

    /// The provider answered, but the payload was not usable.
    #[error("invalid AI response: {reason}")]
    InvalidResponse { reason: String },
}

/// Errors from authentication and credential handling.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Unknown email or wrong password. Deliberately indistinguishable.
    #[error("invalid email or password")]
    InvalidCredentials,

    /// The bearer token has expired.
    #[error("token expired")]
    TokenExpired,

    /// The bearer token is malformed, has a bad signature, or a wrong issuer.
    #[error("invalid token: {reason}")]
    InvalidToken { reason: String },

    /// Password hashing or token signing failed.
    #[error("credential processing failed: {reason}")]
    Hash { reason: String },

    /// The password does not meet the strength policy.
    #[error("weak password: {reason}")]
    WeakPassword { reason: String },

    /// The email address is not well-formed.
    #[error("invalid email address")]
    InvalidEmail,
}

/// Errors from the rate limiter.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// The caller exhausted its window.
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    Exceeded { retry_after_secs: u64 },
}

/// Errors from the audit subsystem.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// A single backend failed to persist an entry.
    #[error("audit backend '{name}' failed: {reason}")]
    BackendFailure { name: String, reason: String },

    /// The entry could not be serialized.
    #[error("audit serialization failed: {reason}")]
    Serialization { reason: String },

    /// Every configured backend failed.
    #[error("all audit backends failed")]
    AllBackendsFailed,
}

/// Errors from the analysis pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The source was rejected before analysis.
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// The AI step failed and there is no heuristic fallback for this operation.
    #[error(transparent)]
    Ai(#[from] AiError),
}
