//! Prometheus metrics endpoint: `/v1/sys/metrics`
//!
//! Exposes row counts and build info in Prometheus text format.
//! No authentication required; designed for Prometheus scraping.

use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;

use crate::state::AppState;

/// `GET /v1/sys/metrics`: Prometheus text format metrics.
///
/// Exposes:
/// - `solsentry_up` (gauge): 1 if the store answered
/// - `solsentry_users` (gauge): registered users
/// - `solsentry_contracts` (gauge): stored contracts
/// - `solsentry_analyses{status}` (gauge): analyses per status
/// - `solsentry_ai_enabled` (gauge): 1 if an AI provider is configured
/// - `solsentry_info` (gauge): build info label
pub(crate) async fn prometheus_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut lines = Vec::with_capacity(32);

    let up = state.store.ping().await.is_ok();
    lines.push("# HELP solsentry_up Whether the store is reachable.".to_owned());
    lines.push("# TYPE solsentry_up gauge".to_owned());
    lines.push(format!("solsentry_up {}", u8::from(up)));

    // Counts only when the store is reachable.
    if up {
        if let Ok(users) = state.store.count_users().await {
            lines.push("# HELP solsentry_users Number of registered users.".to_owned());
            lines.push("# TYPE solsentry_users gauge".to_owned());
            lines.push(format!("solsentry_users {users}"));
        }

        if let Ok(contracts) = state.store.count_contracts().await {
            lines.push("# HELP solsentry_contracts Number of stored contracts.".to_owned());
            lines.push("# TYPE solsentry_contracts gauge".to_owned());
            lines.push(format!("solsentry_contracts {contracts}"));
        }

        if let Ok(by_status) = state.store.count_analyses_by_status().await {
            lines.push("# HELP solsentry_analyses Number of analyses by status.".to_owned());
            lines.push("# TYPE solsentry_analyses gauge".to_owned());
            for (status, count) in by_status {
                lines.push(format!("solsentry_analyses{{status=\"{status}\"}} {count}"));
            }
        }
    }

    lines.push("# HELP solsentry_ai_enabled Whether an AI provider is configured.".to_owned());
    lines.push("# TYPE solsentry_ai_enabled gauge".to_owned());
    lines.push(format!(
        "solsentry_ai_enabled {}",
        u8::from(state.pipeline.ai_enabled())
    ));

    // Build info.
    lines.push("# HELP solsentry_info SolSentry build information.".to_owned());
    lines.push("# TYPE solsentry_info gauge".to_owned());
    lines.push(format!(
        "solsentry_info{{version=\"{}\"}} 1",
        env!("CARGO_PKG_VERSION")
    ));

    let body = lines.join("\n") + "\n";

    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
