//! Shared application state for the `SolSentry` server.
//!
//! A single [`AppState`] is constructed at startup and shared across all
//! Axum handlers via `Arc`.

use std::sync::Arc;

use solsentry_core::audit::AuditManager;
use solsentry_core::auth::TokenIssuer;
use solsentry_core::pipeline::AnalysisPipeline;
use solsentry_core::ratelimit::RateLimiter;
use solsentry_storage::Store;
use tokio_util::task::TaskTracker;

use crate::config::ServerConfig;

/// Shared application state passed to all HTTP handlers.
pub struct AppState {
    pub config: ServerConfig,
    /// Users, contracts, analyses, notifications, audit rows.
    pub store: Arc<dyn Store>,
    /// Scanner, gas estimator and AI provider.
    pub pipeline: Arc<AnalysisPipeline>,
    /// Signs and verifies bearer tokens.
    pub tokens: TokenIssuer,
    /// Audit log fan-out.
    pub audit: Arc<AuditManager>,
    /// General API limiter, keyed by client IP.
    pub api_limiter: Arc<RateLimiter>,
    /// Stricter limiter for AI endpoints, keyed by user.
    pub ai_limiter: Arc<RateLimiter>,
    /// Background analysis runs, drained on shutdown.
    pub jobs: TaskTracker,
}

impl AppState {
    /// Assemble state from its parts with limiters sized from `config`.
    #[must_use]
    pub fn new(
        config: ServerConfig,
        store: Arc<dyn Store>,
        pipeline: Arc<AnalysisPipeline>,
        tokens: TokenIssuer,
        audit: Arc<AuditManager>,
    ) -> Self {
        let api_limiter = Arc::new(RateLimiter::per_minute(config.rate_limit_per_minute));
        let ai_limiter = Arc::new(RateLimiter::per_hour(config.ai_rate_limit_per_hour));
        Self {
            config,
            store,
            pipeline,
            tokens,
            audit,
            api_limiter,
            ai_limiter,
            jobs: TaskTracker::new(),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("pipeline", &self.pipeline)
            .field("jobs", &self.jobs.len())
            .finish_non_exhaustive()
    }
}
