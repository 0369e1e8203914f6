//! Fixed-window rate limiter keyed by caller.
//!
//! Each key gets `limit` requests per `window`. Within the first second of a
//! window at most `burst` of them may arrive, which stops a client from
//! spending a whole minute's budget in one spike. A `burst` of 0 disables
//! the spike cap.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::RateLimitError;

const BURST_PERIOD: Duration = Duration::from_secs(1);

/// Limiter state after an admitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitStatus {
    pub limit: u32,
    pub remaining: u32,
    /// Seconds until the current window resets.
    pub reset_after_secs: u64,
}

#[derive(Debug)]
struct Entry {
    count: u32,
    window_start: Instant,
}

/// Per-key fixed-window counter.
#[derive(Debug)]
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    burst: u32,
    entries: Mutex<HashMap<String, Entry>>,
}

impl RateLimiter {
    /// `limit` requests per `window`, at most `burst` in the first second.
    #[must_use]
    pub fn new(limit: u32, window: Duration, burst: u32) -> Self {
        Self {
            limit: limit.max(1),
            window: window.max(BURST_PERIOD),
            burst,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// `limit` requests per minute with a burst of a quarter of the limit.
    #[must_use]
    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60), (limit / 4).max(1))
    }

    /// `limit` requests per hour with a burst of a quarter of the limit.
    #[must_use]
    pub fn per_hour(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(3600), (limit / 4).max(1))
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Count one request for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError::Exceeded`] with the seconds to wait.
    pub async fn check(&self, key: &str) -> Result<RateLimitStatus, RateLimitError> {
        self.check_at(key, Instant::now()).await
    }

    async fn check_at(&self, key: &str, now: Instant) -> Result<RateLimitStatus, RateLimitError> {
        let mut entries = self.entries.lock().await;
        let entry = entries.entry(key.to_owned()).or_insert(Entry {
            count: 0,
            window_start: now,
        });

        let mut elapsed = now.saturating_duration_since(entry.window_start);
        if elapsed >= self.window {
            entry.count = 0;
            entry.window_start = now;
            elapsed = Duration::ZERO;
        }

        if entry.count >= self.limit {
            return Err(RateLimitError::Exceeded {
                retry_after_secs: ceil_secs(self.window - elapsed),
            });
        }
        if self.burst > 0 && elapsed < BURST_PERIOD && entry.count >= self.burst {
            return Err(RateLimitError::Exceeded {
                retry_after_secs: ceil_secs(BURST_PERIOD - elapsed),
            });
        }

        entry.count += 1;
        Ok(RateLimitStatus {
            limit: self.limit,
            remaining: self.limit - entry.count,
            reset_after_secs: ceil_secs(self.window - elapsed),
        })
    }

    /// Drop keys whose window has ended. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now()).await
    }

    async fn purge_expired_at(&self, now: Instant) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, e| now.saturating_duration_since(e.window_start) < self.window);
        before - entries.len()
    }

    /// Number of tracked keys.
    pub async fn tracked_keys(&self) -> usize {
        self.entries.lock().await.len()
    }
}

/// Whole seconds, rounded up, never below 1.
fn ceil_secs(d: Duration) -> u64 {
    let secs = d.as_secs() + u64::from(d.subsec_nanos() > 0);
    secs.max(1)
}
