//! Request middleware: bearer authentication, per-IP rate limiting, and
//! audit logging of mutating requests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderValue, Method, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use solsentry_core::audit::AuditEntry;
use solsentry_storage::{Role, StorageError};
use tracing::warn;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

/// Identity of the authenticated caller, loaded fresh from the store on
/// every request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
}

impl AuthContext {
    /// Require at least `role` (`user` < `auditor` < `admin`).
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Forbidden`] when the caller's role is lower.
    pub fn require_role(&self, role: Role) -> Result<(), AppError> {
        if self.role >= role {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!("requires role '{role}'")))
        }
    }

    /// Owners, auditors and admins may read.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Forbidden`] otherwise.
    pub fn ensure_can_read(&self, owner_id: Uuid) -> Result<(), AppError> {
        if self.user_id == owner_id || self.role.can_read_all() {
            Ok(())
        } else {
            Err(AppError::Forbidden("not the owner of this contract".to_owned()))
        }
    }

    /// Owners and admins may modify.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Forbidden`] otherwise.
    pub fn ensure_can_write(&self, owner_id: Uuid) -> Result<(), AppError> {
        if self.user_id == owner_id || self.role.can_write_all() {
            Ok(())
        } else {
            Err(AppError::Forbidden("not the owner of this contract".to_owned()))
        }
    }
}

/// Axum middleware that authenticates API requests.
///
/// Verifies the `Authorization: Bearer <jwt>` header, reloads the user, and
/// injects [`AuthContext`] into the request extensions. A copy also goes
/// into the response extensions so the audit layer can attribute the call.
///
/// # Errors
///
/// Returns 401 for a missing, malformed, expired, or orphaned token and 403
/// for a deactivated account.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(auth_header) = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    else {
        return Err(AppError::Unauthorized(
            "missing Authorization header".to_owned(),
        ));
    };

    let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        AppError::Unauthorized("Authorization header must use Bearer scheme".to_owned())
    })?;

    let claims = state.tokens.verify(token.trim())?;
    let user = match state.store.get_user(claims.sub).await {
        Ok(user) => user,
        Err(StorageError::NotFound { .. }) => {
            return Err(AppError::Unauthorized("user no longer exists".to_owned()));
        }
        Err(e) => return Err(e.into()),
    };
    if !user.active {
        return Err(AppError::Forbidden("account is deactivated".to_owned()));
    }

    let ctx = AuthContext {
        user_id: user.id,
        email: user.email,
        role: user.role,
    };
    req.extensions_mut().insert(ctx.clone());

    let mut response = next.run(req).await;
    response.extensions_mut().insert(ctx);
    Ok(response)
}

/// Best-effort client address: first `X-Forwarded-For` hop, then
/// `X-Real-IP`, then the socket peer.
#[must_use]
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    let header_value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    header_value("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| header_value("x-real-ip"))
        .map(str::to_owned)
        .or_else(|| peer.map(|p| p.ip().to_string()))
}

fn peer_addr(req: &Request) -> Option<SocketAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

/// General per-IP rate limit. Adds `X-RateLimit-*` headers to admitted
/// responses and answers 429 with `Retry-After` otherwise.
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let key = client_ip(req.headers(), peer_addr(&req)).unwrap_or_else(|| "unknown".to_owned());

    let status = match state.api_limiter.check(&key).await {
        Ok(status) => status,
        Err(e) => {
            warn!(client = %key, "rate limit exceeded");
            return AppError::from(e).into_response();
        }
    };

    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    for (name, value) in [
        ("x-ratelimit-limit", u64::from(status.limit)),
        ("x-ratelimit-remaining", u64::from(status.remaining)),
        ("x-ratelimit-reset", status.reset_after_secs),
    ] {
        if let Ok(v) = HeaderValue::from_str(&value.to_string()) {
            headers.insert(name, v);
        }
    }
    response
}

fn is_mutating(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

/// Records every mutating request once its status is known.
///
/// Audit failures are logged and do not change the response.
pub async fn audit_middleware(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    if !is_mutating(req.method()) {
        return next.run(req).await;
    }

    let method = req.method().to_string();
    let path = req.uri().path().to_owned();
    let query = req.uri().query().map(str::to_owned);
    let ip = client_ip(req.headers(), peer_addr(&req));
    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let started = Instant::now();

    let response = next.run(req).await;

    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    let mut entry = AuditEntry::new(method, path, response.status().as_u16())
        .with_client(ip, user_agent)
        .with_detail(serde_json::json!({
            "latency_ms": latency_ms,
            "query": query,
        }));
    if let Some(ctx) = response.extensions().get::<AuthContext>() {
        entry = entry.with_actor(ctx.user_id, ctx.role);
    }

    if let Err(e) = state.audit.log(&entry).await {
        warn!(error = %e, method = %entry.method, path = %entry.path, "failed to record audit entry");
    }

    response
}
