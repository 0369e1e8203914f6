//! Notification routes: `/v1/notifications/*`
//!
//! Every operation is scoped to the caller; another user's notification
//! looks exactly like a missing one.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use solsentry_storage::Notification;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::AuthContext;
use crate::state::AppState;

/// Build the `/v1/notifications` router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_notifications))
        .route("/unread-count", get(unread_count))
        .route("/read-all", post(read_all))
        .route("/{id}/read", post(mark_read))
        .route("/{id}", delete(delete_notification))
}

#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct UpdatedResponse {
    pub updated: u64,
}

/// `GET /v1/notifications`
async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<Vec<Notification>>, AppError> {
    let page = super::PageQuery {
        limit: query.limit,
        offset: query.offset,
    }
    .page();
    let rows = state
        .store
        .list_notifications(auth.user_id, query.unread, page)
        .await?;
    Ok(Json(rows))
}

/// `GET /v1/notifications/unread-count`
async fn unread_count(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<CountResponse>, AppError> {
    let count = state.store.count_unread(auth.user_id).await?;
    Ok(Json(CountResponse { count }))
}

/// `POST /v1/notifications/{id}/read`
async fn mark_read(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<Notification>, AppError> {
    Ok(Json(
        state.store.mark_notification_read(auth.user_id, id).await?,
    ))
}

/// `POST /v1/notifications/read-all`
async fn read_all(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<UpdatedResponse>, AppError> {
    let updated = state.store.mark_all_read(auth.user_id).await?;
    Ok(Json(UpdatedResponse { updated }))
}

/// `DELETE /v1/notifications/{id}`
async fn delete_notification(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.store.delete_notification(auth.user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
