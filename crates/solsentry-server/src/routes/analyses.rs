//! Analysis routes.
//!
//! - `POST /v1/contracts/{id}/analyze` and `POST /v1/contracts/{id}/rewrite`
//!   start a run. They are charged against the per-user AI limiter and sit
//!   behind a global concurrency limit.
//! - `GET /v1/contracts/{id}/analyses` and `GET /v1/analyses/{id}` read
//!   results.
//!
//! With `?wait=true` a run completes inside the request and the finished
//! analysis is returned with 200, even when it failed. Otherwise the pending
//! analysis is returned with 202 and the run continues in a background task.
//! Every finished run leaves a notification for the requester.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::Deserialize;
use solsentry_core::scanner::Finding;
use solsentry_storage::{
    Analysis, AnalysisKind, AnalysisOutcome, AnalysisStatus, Contract, NewAnalysis,
    NewNotification,
};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::AuthContext;
use crate::state::AppState;

/// Stored on runs that were cut off by a shutdown or crash.
const INTERRUPTED_MESSAGE: &str = "analysis interrupted by a server restart";

/// Routes that start runs, nested under `/v1`.
pub fn ai_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/contracts/{id}/analyze", post(analyze))
        .route("/contracts/{id}/rewrite", post(rewrite))
}

/// Read-only routes, nested under `/v1`.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/contracts/{id}/analyses", get(list_analyses))
        .route("/analyses/{id}", get(get_analysis))
}

// ── Request / Response types ─────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct WaitQuery {
    #[serde(default)]
    pub wait: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct AnalyzeRequest {
    /// `security` (default) or `gas`.
    pub kind: Option<AnalysisKind>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RewriteRequest {
    /// Extra guidance passed to the model.
    pub instructions: Option<String>,
}

/// Work to perform for one analysis row.
#[derive(Debug, Clone)]
enum Job {
    Security,
    Gas,
    Rewrite {
        findings: Vec<Finding>,
        instructions: Option<String>,
    },
}

impl Job {
    fn kind(&self) -> AnalysisKind {
        match self {
            Self::Security => AnalysisKind::Security,
            Self::Gas => AnalysisKind::Gas,
            Self::Rewrite { .. } => AnalysisKind::Rewrite,
        }
    }
}

// ── Handlers ─────────────────────────────────────────────────────────

/// `POST /v1/contracts/{id}/analyze`
async fn analyze(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Query(query): Query<WaitQuery>,
    body: Option<Json<AnalyzeRequest>>,
) -> Result<(StatusCode, Json<Analysis>), AppError> {
    let kind = body
        .and_then(|Json(b)| b.kind)
        .unwrap_or(AnalysisKind::Security);
    let job = match kind {
        AnalysisKind::Security => Job::Security,
        AnalysisKind::Gas => Job::Gas,
        AnalysisKind::Rewrite => {
            return Err(AppError::BadRequest(format!(
                "use POST /v1/contracts/{id}/rewrite for rewrites"
            )));
        }
    };

    let contract = state.store.get_contract(id).await?;
    auth.ensure_can_read(contract.owner_id)?;
    charge_ai_limit(&state, &auth).await?;

    start(state, &auth, contract, job, query.wait).await
}

/// `POST /v1/contracts/{id}/rewrite`
///
/// Addresses the findings of the latest completed security analysis, or of
/// a fresh heuristic scan when there is none.
async fn rewrite(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Query(query): Query<WaitQuery>,
    body: Option<Json<RewriteRequest>>,
) -> Result<(StatusCode, Json<Analysis>), AppError> {
    let contract = state.store.get_contract(id).await?;
    auth.ensure_can_write(contract.owner_id)?;
    if !state.pipeline.ai_enabled() {
        return Err(AppError::AiUnavailable);
    }
    charge_ai_limit(&state, &auth).await?;

    let instructions = body
        .and_then(|Json(b)| b.instructions)
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty());
    let findings = latest_findings(&state, &contract).await?;

    start(
        state,
        &auth,
        contract,
        Job::Rewrite {
            findings,
            instructions,
        },
        query.wait,
    )
    .await
}

/// `GET /v1/contracts/{id}/analyses`
async fn list_analyses(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Analysis>>, AppError> {
    let contract = state.store.get_contract(id).await?;
    auth.ensure_can_read(contract.owner_id)?;
    Ok(Json(state.store.list_analyses(id).await?))
}

/// `GET /v1/analyses/{id}`
async fn get_analysis(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<Analysis>, AppError> {
    let analysis = state.store.get_analysis(id).await?;
    let contract = state.store.get_contract(analysis.contract_id).await?;
    auth.ensure_can_read(contract.owner_id)?;
    Ok(Json(analysis))
}

// ── Job execution ────────────────────────────────────────────────────

async fn charge_ai_limit(state: &AppState, auth: &AuthContext) -> Result<(), AppError> {
    state
        .ai_limiter
        .check(&format!("user:{}", auth.user_id))
        .await?;
    Ok(())
}

async fn latest_findings(state: &AppState, contract: &Contract) -> Result<Vec<Finding>, AppError> {
    let previous = state
        .store
        .list_analyses(contract.id)
        .await?
        .into_iter()
        .find(|a| a.kind == AnalysisKind::Security && a.status == AnalysisStatus::Completed)
        .and_then(|a| serde_json::from_value::<Vec<Finding>>(a.findings).ok());

    match previous {
        Some(findings) => Ok(findings),
        None => Ok(state.pipeline.scan(&contract.source)?.findings),
    }
}

async fn start(
    state: Arc<AppState>,
    auth: &AuthContext,
    contract: Contract,
    job: Job,
    wait: bool,
) -> Result<(StatusCode, Json<Analysis>), AppError> {
    let analysis = state
        .store
        .create_analysis(NewAnalysis {
            contract_id: contract.id,
            requested_by: auth.user_id,
            kind: job.kind(),
        })
        .await?;
    info!(
        analysis_id = %analysis.id,
        contract_id = %contract.id,
        kind = %analysis.kind,
        wait,
        "analysis requested"
    );

    if wait {
        let finished = run_job(&state, analysis.id, auth.user_id, &contract, job).await?;
        return Ok((StatusCode::OK, Json(finished)));
    }

    let requester = auth.user_id;
    let analysis_id = analysis.id;
    let jobs = state.jobs.clone();
    jobs.spawn(async move {
        if let Err(e) = run_job(&state, analysis_id, requester, &contract, job).await {
            error!(analysis_id = %analysis_id, error = ?e, "background analysis could not be recorded");
        }
    });

    Ok((StatusCode::ACCEPTED, Json(analysis)))
}

/// Run `job` and record the outcome.
///
/// Pipeline failures and store errors while starting or completing the run
/// both end in a `failed` analysis. The requester is notified either way.
/// An error is returned only when even the failure could not be stored.
async fn run_job(
    state: &AppState,
    analysis_id: Uuid,
    requester: Uuid,
    contract: &Contract,
    job: Job,
) -> Result<Analysis, AppError> {
    let kind = job.kind();
    let completed = match execute(state, analysis_id, contract, job).await {
        Ok(outcome) => state
            .store
            .complete_analysis(analysis_id, outcome)
            .await
            .map_err(|e| {
                error!(analysis_id = %analysis_id, error = %e, "could not store analysis result");
                format!("analysis result could not be saved: {e}")
            }),
        Err(message) => Err(message),
    };

    let recorded = match completed {
        Ok(analysis) => {
            info!(
                analysis_id = %analysis_id,
                risk_score = analysis.risk_score,
                "analysis completed"
            );
            Ok(analysis)
        }
        Err(message) => {
            warn!(analysis_id = %analysis_id, error = %message, "analysis failed");
            state
                .store
                .fail_analysis(analysis_id, &message)
                .await
                .map_err(|e| (AppError::from(e), message))
        }
    };

    let (notification_kind, verb, body) = match &recorded {
        Ok(a) if a.status == AnalysisStatus::Completed => (
            "analysis.completed",
            "completed",
            format!("Risk score {}. {}", a.risk_score, a.summary),
        ),
        Ok(a) => ("analysis.failed", "failed", a.error.clone().unwrap_or_default()),
        Err((_, message)) => ("analysis.failed", "failed", message.clone()),
    };
    notify(
        state,
        requester,
        analysis_id,
        notification_kind,
        format!("{kind} analysis of '{}' {verb}", contract.name),
        body,
    )
    .await;

    recorded.map_err(|(e, _)| e)
}

/// Move the row to `running` and produce an outcome. Errors come back as
/// the message to store on the failed row.
async fn execute(
    state: &AppState,
    analysis_id: Uuid,
    contract: &Contract,
    job: Job,
) -> Result<AnalysisOutcome, String> {
    state
        .store
        .mark_analysis_running(analysis_id)
        .await
        .map_err(|e| format!("analysis could not be started: {e}"))?;

    let pipeline = &state.pipeline;
    let result = match job {
        Job::Security => {
            pipeline
                .security_review(&contract.source, Some(&contract.name))
                .await
        }
        Job::Gas => pipeline.gas_review(&contract.source),
        Job::Rewrite {
            findings,
            instructions,
        } => {
            pipeline
                .rewrite(&contract.source, &findings, instructions.as_deref())
                .await
        }
    };
    result.map_err(|e| e.to_string())
}

async fn notify(
    state: &AppState,
    requester: Uuid,
    analysis_id: Uuid,
    kind: &str,
    title: String,
    body: String,
) {
    if let Err(e) = state
        .store
        .create_notification(NewNotification {
            user_id: requester,
            kind: kind.to_owned(),
            title,
            body,
            link: Some(format!("/v1/analyses/{analysis_id}")),
        })
        .await
    {
        warn!(analysis_id = %analysis_id, error = %e, "failed to create notification");
    }
}

/// Fail runs a previous process left `pending` or `running` and notify
/// their requesters. Returns how many were failed.
///
/// # Errors
///
/// Returns an error if the store cannot be updated.
pub async fn fail_interrupted(state: &AppState) -> Result<usize, AppError> {
    let failed = state
        .store
        .fail_interrupted_analyses(INTERRUPTED_MESSAGE)
        .await?;
    for analysis in &failed {
        notify(
            state,
            analysis.requested_by,
            analysis.id,
            "analysis.failed",
            format!("{} analysis failed", analysis.kind),
            INTERRUPTED_MESSAGE.to_owned(),
        )
        .await;
    }
    Ok(failed.len())
}
