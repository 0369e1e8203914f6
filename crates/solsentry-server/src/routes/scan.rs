//! Stateless analysis routes: `/v1/scan` and `/v1/gas/estimate`.
//!
//! Nothing is stored; the posted source is analyzed and discarded.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use solsentry_core::gas::{self, FunctionGas, GasReport};
use solsentry_core::scanner::ScanReport;

use crate::error::AppError;
use crate::state::AppState;

/// Build the router, nested under `/v1`.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/scan", post(scan))
        .route("/gas/estimate", post(estimate))
}

// ── Request / Response types ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub source: String,
}

#[derive(Debug, Serialize)]
pub struct ScanResponse {
    pub report: ScanReport,
    pub gas: GasReport,
}

#[derive(Debug, Deserialize)]
pub struct GasRequest {
    pub source: String,
    /// Estimate a single function instead of the whole source.
    pub function: Option<String>,
}

/// Either a full report or one function's estimate.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum GasResponse {
    Report(GasReport),
    Function(FunctionGas),
}

// ── Handlers ─────────────────────────────────────────────────────────

/// `POST /v1/scan`
async fn scan(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ScanRequest>,
) -> Result<Json<ScanResponse>, AppError> {
    let report = state.pipeline.scan(&body.source)?;
    let gas = gas::estimate_with_limit(&body.source, state.pipeline.max_source_bytes())?;
    Ok(Json(ScanResponse { report, gas }))
}

/// `POST /v1/gas/estimate`
async fn estimate(
    State(state): State<Arc<AppState>>,
    Json(body): Json<GasRequest>,
) -> Result<Json<GasResponse>, AppError> {
    let report = gas::estimate_with_limit(&body.source, state.pipeline.max_source_bytes())?;

    let Some(name) = body.function.as_deref().map(str::trim).filter(|n| !n.is_empty()) else {
        return Ok(Json(GasResponse::Report(report)));
    };

    report
        .functions
        .into_iter()
        .find(|f| f.name == name)
        .map(|f| Json(GasResponse::Function(f)))
        .ok_or_else(|| AppError::NotFound(format!("function '{name}' not found")))
}
