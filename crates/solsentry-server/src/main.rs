//! `SolSentry` server entry point.
//!
//! Bootstraps the store, analysis pipeline, token issuer, and audit
//! backends, then starts the Axum HTTP server with graceful shutdown. A
//! background retention worker runs alongside the server and is cancelled
//! on shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use solsentry_core::ai::{AiProvider, OpenAiConfig, OpenAiProvider};
use solsentry_core::audit::{AuditManager, StoreAuditBackend};
use solsentry_core::audit_file::FileAuditBackend;
use solsentry_core::auth::{self, TokenIssuer};
use solsentry_core::pipeline::AnalysisPipeline;
use solsentry_storage::{MemoryStore, Store};

use solsentry_server::app::build_router;
use solsentry_server::config::{ServerConfig, StorageBackendType};
use solsentry_server::routes;
use solsentry_server::state::AppState;
use solsentry_server::worker::retention_worker;

/// Sampling temperature for reviews and rewrites.
const AI_TEMPERATURE: f32 = 0.1;

/// How long shutdown waits for in-flight analyses.
const JOB_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from environment.
    let config = ServerConfig::from_env();

    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    info!(storage = ?config.storage_backend, "SolSentry starting");

    let state = build_app_state(config).await?;
    let bind_addr = state.config.bind_addr;

    // Shutdown signal channel.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker_handle = tokio::spawn(retention_worker(Arc::clone(&state), shutdown_rx));

    let app = build_router(Arc::clone(&state));

    // Bind and serve.
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind to {bind_addr}"))?;

    info!(addr = %bind_addr, "SolSentry server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown_tx))
    .await
    .context("server error")?;

    // Let in-flight analyses finish; anything cut off here is failed on the
    // next startup.
    state.jobs.close();
    info!(in_flight = state.jobs.len(), "waiting for background analyses");
    if tokio::time::timeout(JOB_DRAIN_TIMEOUT, state.jobs.wait())
        .await
        .is_err()
    {
        warn!(
            in_flight = state.jobs.len(),
            "background analyses did not finish within {}s",
            JOB_DRAIN_TIMEOUT.as_secs()
        );
    }

    // Wait for background workers to finish (with timeout).
    info!("waiting for background workers to stop");
    if tokio::time::timeout(Duration::from_secs(10), worker_handle)
        .await
        .is_err()
    {
        warn!("retention worker did not stop within 10s");
    }

    info!("SolSentry server stopped");
    Ok(())
}

/// Build the shared application state.
async fn build_app_state(config: ServerConfig) -> anyhow::Result<Arc<AppState>> {
    // Bootstrap the store.
    let store: Arc<dyn Store> = match &config.storage_backend {
        StorageBackendType::Memory => {
            info!("using in-memory storage (data will not persist)");
            Arc::new(MemoryStore::new())
        }
        #[cfg(feature = "postgres")]
        StorageBackendType::Postgres { url } => {
            info!(url = %"[redacted]", "using PostgreSQL storage");
            Arc::new(
                solsentry_storage::PostgresStore::connect(url, config.db_max_connections)
                    .await
                    .context("failed to connect to PostgreSQL storage")?,
            )
        }
        #[cfg(not(feature = "postgres"))]
        StorageBackendType::Postgres { .. } => {
            anyhow::bail!("PostgreSQL backend requested but feature 'postgres' is not enabled");
        }
    };

    // Token signing secret.
    let secret = if let Some(secret) = &config.jwt_secret {
        secret.clone()
    } else {
        warn!("SOLSENTRY_JWT_SECRET not set, generated a random secret; tokens will not survive a restart");
        auth::generate_secret()
    };
    let tokens = TokenIssuer::new(secret.as_bytes(), config.jwt_issuer.clone(), config.jwt_ttl_secs);

    // AI provider (optional).
    let ai: Option<Arc<dyn AiProvider>> = match &config.ai_api_key {
        Some(api_key) => {
            let provider = OpenAiProvider::new(OpenAiConfig {
                api_key: api_key.clone(),
                base_url: config.ai_base_url.clone(),
                model: config.ai_model.clone(),
                temperature: AI_TEMPERATURE,
                timeout: Duration::from_secs(config.ai_timeout_secs),
            })
            .context("failed to build AI provider")?;
            info!(model = %config.ai_model, base_url = %config.ai_base_url, "AI provider enabled");
            Some(Arc::new(provider))
        }
        None => {
            info!("SOLSENTRY_AI_API_KEY not set, AI review and rewrite are disabled");
            None
        }
    };
    let pipeline = Arc::new(AnalysisPipeline::new(
        ai,
        config.ai_max_concurrent,
        config.max_source_bytes,
    ));

    // Audit backends: the store always, a file when configured.
    let audit = Arc::new(AuditManager::new());
    audit
        .add_backend(Arc::new(StoreAuditBackend::new(Arc::clone(&store))))
        .await;
    if let Some(ref audit_path) = config.audit_file_path {
        audit
            .add_backend(Arc::new(FileAuditBackend::new(audit_path)))
            .await;
        info!(path = %audit_path, "file audit backend registered");
    }

    let admin = config.admin_email.clone().zip(config.admin_password.clone());
    let state = Arc::new(AppState::new(config, store, pipeline, tokens, audit));

    if let Some((email, password)) = admin {
        match routes::auth::ensure_admin(&state, &email, &password).await {
            Ok(true) => {}
            Ok(false) => info!("bootstrap admin already exists"),
            Err(e) => anyhow::bail!("failed to create bootstrap admin: {e:?}"),
        }
    }

    let interrupted = routes::analyses::fail_interrupted(&state)
        .await
        .map_err(|e| anyhow::anyhow!("failed to reconcile interrupted analyses: {e:?}"))?;
    if interrupted > 0 {
        warn!(count = interrupted, "failed analyses interrupted by a previous shutdown");
    }

    Ok(state)
}

/// Wait for SIGINT or SIGTERM, then broadcast shutdown.
async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            sig.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received, stopping server");
    if let Err(e) = shutdown_tx.send(true) {
        warn!(error = %e, "retention worker already stopped");
    }
}
