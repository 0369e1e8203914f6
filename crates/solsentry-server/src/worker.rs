//! Background retention worker.
//!
//! Periodically forgets idle rate-limit keys and deletes old read
//! notifications. Limiter keys are purged on every tick, store or no store.
//! If the store is unreachable during a purge, the worker retries with
//! exponential backoff (1s, 2s, 4s) before giving up on that tick. A
//! consecutive-failure counter escalates log severity so operators notice
//! persistent issues without being spammed on transient blips.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::state::AppState;

/// Maximum retries per tick when the store is unreachable.
const PURGE_MAX_RETRIES: u32 = 3;

/// Consecutive failed ticks before the worker logs at `error`.
const ESCALATE_AFTER: u32 = 5;

/// Run until `shutdown` changes.
pub async fn retention_worker(state: Arc<AppState>, mut shutdown: watch::Receiver<bool>) {
    let interval_secs = state.config.retention_interval_secs.max(1);
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    let mut consecutive_failures: u32 = 0;
    info!(interval_secs, "retention worker started");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match run_once(&state, &mut shutdown).await {
                    Ok(None) => {
                        // Shutdown requested during retry.
                        info!("retention worker shutting down");
                        return;
                    }
                    Ok(Some(purged)) => {
                        consecutive_failures = 0;
                        if purged.notifications > 0 || purged.rate_limit_keys > 0 {
                            info!(
                                notifications = purged.notifications,
                                rate_limit_keys = purged.rate_limit_keys,
                                "retention tick complete"
                            );
                        }
                    }
                    Err(last_err) => {
                        consecutive_failures = consecutive_failures.saturating_add(1);
                        if consecutive_failures >= ESCALATE_AFTER {
                            tracing::error!(
                                error = %last_err,
                                consecutive_failures,
                                "notification purge persistently failing, store may be down"
                            );
                        } else {
                            warn!(
                                error = %last_err,
                                consecutive_failures,
                                retries = PURGE_MAX_RETRIES,
                                "notification purge failed after retries, will retry next tick"
                            );
                        }
                    }
                }
            }
            _ = shutdown.changed() => {
                info!("retention worker shutting down");
                return;
            }
        }
    }
}

/// What one tick removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Purged {
    pub notifications: u64,
    pub rate_limit_keys: usize,
}

/// One retention pass. Limiter keys are purged first. Returns:
/// - `Ok(Some(purged))` on success
/// - `Ok(None)` if shutdown was signalled during retry
/// - `Err(last_error)` if all retries were exhausted
///
/// # Errors
///
/// Returns the last store error message once retries run out.
pub async fn run_once(
    state: &AppState,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<Option<Purged>, String> {
    let days = i64::from(state.config.notification_retention_days);
    let cutoff = Utc::now() - chrono::Duration::days(days);
    let rate_limit_keys =
        state.api_limiter.purge_expired().await + state.ai_limiter.purge_expired().await;
    let mut last_err = String::new();

    for attempt in 0..=PURGE_MAX_RETRIES {
        match state.store.purge_read_notifications(cutoff).await {
            Ok(notifications) => {
                return Ok(Some(Purged {
                    notifications,
                    rate_limit_keys,
                }));
            }
            Err(e) => {
                last_err = e.to_string();

                if attempt == PURGE_MAX_RETRIES {
                    break;
                }

                // Exponential backoff: 1s, 2s, 4s
                let backoff = Duration::from_secs(1u64 << attempt);
                debug!(
                    attempt = attempt.saturating_add(1),
                    max = PURGE_MAX_RETRIES.saturating_add(1),
                    backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "notification purge failed, retrying"
                );

                // Wait for backoff OR shutdown, whichever comes first.
                tokio::select! {
                    () = tokio::time::sleep(backoff) => {}
                    _ = shutdown.changed() => {
                        return Ok(None);
                    }
                }
            }
        }
    }

    Err(last_err)
}
