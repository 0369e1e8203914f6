//! Account routes: `/v1/auth/*`
//!
//! Registration and login are public; `me` and `refresh` require a token.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use solsentry_core::auth::{self, IssuedToken};
use solsentry_core::error::AuthError;
use solsentry_storage::{NewUser, Role, StorageError, User};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::AuthContext;
use crate::state::AppState;

const MAX_USERNAME_CHARS: usize = 64;

/// Build the public `/v1/auth` router (no token required).
pub fn public_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

/// Build the authenticated `/v1/auth` router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/me", get(me))
        .route("/refresh", post(refresh))
}

// ── Request / Response types ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// A user together with a freshly issued token.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: User,
    #[serde(flatten)]
    pub token: IssuedToken,
}

// ── Handlers ─────────────────────────────────────────────────────────

/// `POST /v1/auth/register`
///
/// Creates a `user`-role account and returns it with a token.
async fn register(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), AppError> {
    let email = auth::normalize_email(&body.email);
    auth::validate_email(&email)?;
    let username = validate_username(&body.username)?;
    auth::validate_password_strength(&body.password)?;

    let password_hash = auth::hash_password(&body.password)?;
    let user = state
        .store
        .create_user(NewUser {
            email,
            username,
            password_hash,
            role: Role::User,
        })
        .await
        .map_err(|e| match e {
            StorageError::Conflict { .. } => {
                AppError::Conflict("email or username already registered".to_owned())
            }
            other => other.into(),
        })?;

    info!(user_id = %user.id, "user registered");
    let token = state.tokens.issue(&user)?;
    Ok((StatusCode::CREATED, Json(SessionResponse { user, token })))
}

/// `POST /v1/auth/login`
///
/// Unknown email and wrong password are indistinguishable. Deactivated
/// accounts get 403 only after the password checks out.
async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    let email = auth::normalize_email(&body.email);
    let user = match state.store.get_user_by_email(&email).await {
        Ok(user) => user,
        Err(StorageError::NotFound { .. }) => return Err(AuthError::InvalidCredentials.into()),
        Err(e) => return Err(e.into()),
    };

    if !auth::verify_password(&body.password, &user.password_hash)? {
        return Err(AuthError::InvalidCredentials.into());
    }
    if !user.active {
        return Err(AppError::Forbidden("account is deactivated".to_owned()));
    }

    let token = state.tokens.issue(&user)?;
    Ok(Json(SessionResponse { user, token }))
}

/// `GET /v1/auth/me`
async fn me(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<User>, AppError> {
    Ok(Json(state.store.get_user(auth.user_id).await?))
}

/// `POST /v1/auth/refresh`
///
/// New token carrying the caller's current role.
async fn refresh(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<SessionResponse>, AppError> {
    let user = state.store.get_user(auth.user_id).await?;
    let token = state.tokens.issue(&user)?;
    Ok(Json(SessionResponse { user, token }))
}

fn validate_username(raw: &str) -> Result<String, AppError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("username must not be empty".to_owned()));
    }
    if name.chars().count() > MAX_USERNAME_CHARS {
        return Err(AppError::BadRequest(format!(
            "username must be at most {MAX_USERNAME_CHARS} characters"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(AppError::BadRequest(
            "username may only contain letters, digits, '_', '-' and '.'".to_owned(),
        ));
    }
    Ok(name.to_owned())
}

/// Create the bootstrap admin unless that email is already registered.
///
/// Returns `true` when a user was created.
///
/// # Errors
///
/// Returns an error for an invalid email or password, or a store failure.
pub async fn ensure_admin(state: &AppState, email: &str, password: &str) -> Result<bool, AppError> {
    let email = auth::normalize_email(email);
    auth::validate_email(&email)?;
    match state.store.get_user_by_email(&email).await {
        Ok(_) => return Ok(false),
        Err(StorageError::NotFound { .. }) => {}
        Err(e) => return Err(e.into()),
    }
    auth::validate_password_strength(password)?;

    let configured = state.config.admin_username.as_deref();
    let username = match configured {
        Some(name) => validate_username(name)?,
        None => email
            .split('@')
            .next()
            .and_then(|local| validate_username(local).ok())
            .unwrap_or_else(|| "admin".to_owned()),
    };
    let mut new_user = NewUser {
        email,
        username,
        password_hash: auth::hash_password(password)?,
        role: Role::Admin,
    };
    let user = match state.store.create_user(new_user.clone()).await {
        Err(StorageError::Conflict { .. }) if configured.is_none() => {
            let simple = Uuid::new_v4().simple().to_string();
            let fallback = format!("admin-{}", &simple[..8]);
            warn!(
                taken = %new_user.username,
                username = %fallback,
                "bootstrap admin username taken, using fallback"
            );
            new_user.username = fallback;
            state.store.create_user(new_user).await?
        }
        other => other?,
    };
    info!(user_id = %user.id, "bootstrap admin created");
    Ok(true)
}
