//! Router assembly.
//!
//! Layer order, outermost first: tracing, CORS, security headers, body
//! limit, per-IP rate limit, audit. Authenticated routers additionally carry
//! the JWT `route_layer`, and the AI routers a global concurrency limit.

use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderName, HeaderValue, Method, header};
use axum::middleware as axum_mw;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::middleware::{audit_middleware, auth_middleware, rate_limit_middleware};
use crate::routes;
use crate::state::AppState;

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    // Authenticated routes go through the auth middleware layer.
    let authenticated_routes = Router::new()
        .nest("/v1/auth", routes::auth::router())
        .nest("/v1/contracts", routes::contracts::router())
        .nest(
            "/v1",
            routes::analyses::router().merge(routes::scan::router()),
        )
        .nest("/v1/notifications", routes::notifications::router())
        .nest("/v1/admin", routes::admin::router())
        .route_layer(axum_mw::from_fn_with_state(
            Arc::clone(&state),
            auth_middleware,
        ));

    // AI-backed runs share one concurrency budget across routes.
    let ai_routes = Router::new()
        .nest("/v1", routes::analyses::ai_router())
        .layer(GlobalConcurrencyLimitLayer::new(
            state.config.ai_max_concurrent,
        ))
        .route_layer(axum_mw::from_fn_with_state(
            Arc::clone(&state),
            auth_middleware,
        ));

    // Registration, login, health and metrics are public.
    let public_routes = Router::new()
        .nest("/v1/auth", routes::auth::public_router())
        .nest("/v1/sys", routes::sys::router());

    Router::new()
        .merge(public_routes)
        .merge(authenticated_routes)
        .merge(ai_routes)
        .layer(axum_mw::from_fn_with_state(
            Arc::clone(&state),
            audit_middleware,
        ))
        .layer(axum_mw::from_fn_with_state(
            Arc::clone(&state),
            rate_limit_middleware,
        ))
        .layer(RequestBodyLimitLayer::new(state.config.body_limit_bytes()))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(cors_layer(&state.config.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS for the configured origins, or any origin when none are listed.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o) {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!(origin = %o, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .expose_headers([
            header::RETRY_AFTER,
            HeaderName::from_static("x-ratelimit-limit"),
            HeaderName::from_static("x-ratelimit-remaining"),
            HeaderName::from_static("x-ratelimit-reset"),
        ])
}
