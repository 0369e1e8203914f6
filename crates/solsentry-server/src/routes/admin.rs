//! Administration routes: `/v1/admin/*`
//!
//! User management and the audit log. Every handler requires `admin`.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, put};
use axum::{Extension, Json, Router};
use serde::Deserialize;
use solsentry_storage::{AuditRecord, Role, User};
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::AuthContext;
use crate::state::AppState;

/// Build the `/v1/admin` router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/{id}/role", put(set_role))
        .route("/users/{id}/active", put(set_active))
        .route("/audit", get(list_audit))
}

// ── Request types ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SetRoleRequest {
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub active: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct AuditQuery {
    pub actor: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

// ── Handlers ─────────────────────────────────────────────────────────

/// `GET /v1/admin/users`
async fn list_users(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<super::PageQuery>,
) -> Result<Json<Vec<User>>, AppError> {
    auth.require_role(Role::Admin)?;
    Ok(Json(state.store.list_users(query.page()).await?))
}

/// `PUT /v1/admin/users/{id}/role`
///
/// Admins cannot demote themselves, so the last admin cannot vanish by
/// accident.
async fn set_role(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(body): Json<SetRoleRequest>,
) -> Result<Json<User>, AppError> {
    auth.require_role(Role::Admin)?;
    if id == auth.user_id && body.role != Role::Admin {
        return Err(AppError::BadRequest("admins cannot demote themselves".to_owned()));
    }
    let user = state.store.update_user_role(id, body.role).await?;
    info!(user_id = %id, role = %body.role, actor = %auth.user_id, "user role changed");
    Ok(Json(user))
}

/// `PUT /v1/admin/users/{id}/active`
async fn set_active(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(body): Json<SetActiveRequest>,
) -> Result<Json<User>, AppError> {
    auth.require_role(Role::Admin)?;
    if id == auth.user_id {
        return Err(AppError::BadRequest(
            "admins cannot change their own active flag".to_owned(),
        ));
    }
    let user = state.store.set_user_active(id, body.active).await?;
    info!(user_id = %id, active = body.active, actor = %auth.user_id, "user active flag changed");
    Ok(Json(user))
}

/// `GET /v1/admin/audit`
async fn list_audit(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditRecord>>, AppError> {
    auth.require_role(Role::Admin)?;
    let page = super::PageQuery {
        limit: query.limit,
        offset: query.offset,
    }
    .page();
    Ok(Json(state.store.list_audit(query.actor, page).await?))
}
