//! Contract routes: `/v1/contracts/*`
//!
//! Owners manage their own contracts. Auditors read everything, admins
//! read and modify everything.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde::Deserialize;
use solsentry_core::source;
use solsentry_storage::{Contract, ContractSummary, ContractUpdate, NewContract};
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::AuthContext;
use crate::state::AppState;

const MAX_NAME_CHARS: usize = 200;
const MAX_DESCRIPTION_CHARS: usize = 4000;

/// Build the `/v1/contracts` router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_contracts).post(create_contract))
        .route(
            "/{id}",
            get(get_contract).put(update_contract).delete(delete_contract),
        )
}

// ── Request / Response types ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateContractRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub source: String,
}

/// Partial update; absent fields are unchanged.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateContractRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// Restrict to one owner. Only auditors and admins may name others.
    pub owner: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

// ── Handlers ─────────────────────────────────────────────────────────

/// `POST /v1/contracts`
async fn create_contract(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(body): Json<CreateContractRequest>,
) -> Result<(StatusCode, Json<Contract>), AppError> {
    let name = validate_name(&body.name)?;
    validate_description(&body.description)?;
    source::validate_source(&body.source, state.config.max_source_bytes)?;

    let contract = state
        .store
        .create_contract(NewContract {
            owner_id: auth.user_id,
            name,
            description: body.description,
            source_hash: source::source_hash(&body.source),
            compiler_version: source::parse_pragma(&body.source),
            source: body.source,
        })
        .await?;

    info!(contract_id = %contract.id, owner = %auth.user_id, "contract created");
    Ok((StatusCode::CREATED, Json(contract)))
}

/// `GET /v1/contracts`
async fn list_contracts(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<ContractSummary>>, AppError> {
    let owner = if auth.role.can_read_all() {
        query.owner
    } else {
        match query.owner {
            Some(owner) if owner != auth.user_id => {
                return Err(AppError::Forbidden(
                    "cannot list another user's contracts".to_owned(),
                ));
            }
            _ => Some(auth.user_id),
        }
    };

    let page = super::PageQuery {
        limit: query.limit,
        offset: query.offset,
    }
    .page();
    Ok(Json(state.store.list_contracts(owner, page).await?))
}

/// `GET /v1/contracts/{id}`
async fn get_contract(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<Contract>, AppError> {
    let contract = state.store.get_contract(id).await?;
    auth.ensure_can_read(contract.owner_id)?;
    Ok(Json(contract))
}

/// `PUT /v1/contracts/{id}`
///
/// A new source gets a fresh hash and pragma.
async fn update_contract(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateContractRequest>,
) -> Result<Json<Contract>, AppError> {
    let existing = state.store.get_contract(id).await?;
    auth.ensure_can_write(existing.owner_id)?;

    let mut update = ContractUpdate {
        name: body.name.as_deref().map(validate_name).transpose()?,
        ..ContractUpdate::default()
    };
    if let Some(description) = body.description {
        validate_description(&description)?;
        update.description = Some(description);
    }
    if let Some(src) = body.source {
        source::validate_source(&src, state.config.max_source_bytes)?;
        update.source_hash = Some(source::source_hash(&src));
        update.compiler_version = Some(source::parse_pragma(&src));
        update.source = Some(src);
    }

    let contract = state.store.update_contract(id, update).await?;
    Ok(Json(contract))
}

/// `DELETE /v1/contracts/{id}`
///
/// Also removes the contract's analyses.
async fn delete_contract(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let existing = state.store.get_contract(id).await?;
    auth.ensure_can_write(existing.owner_id)?;
    state.store.delete_contract(id).await?;
    info!(contract_id = %id, actor = %auth.user_id, "contract deleted");
    Ok(StatusCode::NO_CONTENT)
}

fn validate_name(raw: &str) -> Result<String, AppError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("name must not be empty".to_owned()));
    }
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(AppError::BadRequest(format!(
            "name must be at most {MAX_NAME_CHARS} characters"
        )));
    }
    Ok(name.to_owned())
}

fn validate_description(description: &str) -> Result<(), AppError> {
    if description.chars().count() > MAX_DESCRIPTION_CHARS {
        return Err(AppError::BadRequest(format!(
            "description must be at most {MAX_DESCRIPTION_CHARS} characters"
        )));
    }
    Ok(())
}
