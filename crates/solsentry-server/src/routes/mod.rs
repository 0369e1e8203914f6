//! HTTP route handlers, one module per resource.
//!
//! Each module exposes `router()` returning a `Router<Arc<AppState>>` that is
//! nested under its `/v1/...` prefix by [`crate::app::build_router`].

pub mod admin;
pub mod analyses;
pub mod auth;
pub mod contracts;
pub mod metrics;
pub mod notifications;
pub mod scan;
pub mod sys;

use serde::Deserialize;
use solsentry_storage::Page;

/// `?limit=&offset=` query parameters shared by list endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PageQuery {
    /// Clamped page, defaulting to the first 50 rows.
    #[must_use]
    pub fn page(&self) -> Page {
        let default = Page::default();
        Page::new(
            self.limit.unwrap_or(default.limit),
            self.offset.unwrap_or(default.offset),
        )
    }
}
