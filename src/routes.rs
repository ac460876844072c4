//! Application routing configuration with middleware stack.
//!
//! # Middleware Stack (outermost first)
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────┐
//! │ Request ID/Trace │ ← X-Request-Id set, HTTP spans, id echoed on response
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │      Timing      │ ← Duration log, slow warning, perf entry
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │     Session      │ ← Attaches Session from the cookie (never rejects)
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  Rate Limiting   │ ← 429 if the client IP's bucket is empty
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │    Authorize     │ ← Per route group: 303 to login, or 403
//! └────────┬─────────┘
//!          ▼
//!      Handler
//! ```
//!
//! # Route Groups
//!
//! - Public: `/health`, `/ready`, `/login`, `/logout`
//! - Authenticated: `/me`, `/impersonation/exit`
//! - Admin: `/admin/impersonate`, `/admin/perf`
//! - Admin or coach: `/coach`

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::handlers;
use crate::middleware::{
    AuthorizeLayer, ClientIpSource, LoginPath, RateLimitLayer, SessionLayer, TimingLayer,
};
use crate::session::Role;
use crate::state::AppState;

/// Build the application router with all routes and middleware configured.
///
/// # Middleware Configuration
///
/// - **Rate Limiting**: Enabled when the state carries a limiter
///   (`RATE_LIMIT_CAPACITY > 0`)
/// - **Timing**: Static prefixes from `STATIC_PATH_PREFIXES` are not timed
/// - **Session cookie / login path**: From configuration
pub fn build_router(state: AppState) -> Router {
    let config = &state.config;

    // =========================================================================
    // Route Groups
    // =========================================================================
    let public = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route(
            config.login_path.as_str(),
            get(handlers::login_page).post(handlers::login),
        )
        .route("/logout", post(handlers::logout));

    let authenticated = Router::new()
        .route("/me", get(handlers::me))
        .route("/impersonation/exit", post(handlers::exit_impersonation))
        .route_layer(AuthorizeLayer::authenticated());

    let admin = Router::new()
        .route("/admin/impersonate", post(handlers::impersonate))
        .route("/admin/perf", get(handlers::perf))
        .route_layer(AuthorizeLayer::roles([Role::Admin]));

    let coach = Router::new()
        .route("/coach", get(handlers::coach_area))
        .route_layer(AuthorizeLayer::roles([Role::Admin, Role::Coach]));

    let mut router = public.merge(authenticated).merge(admin).merge(coach);

    // =========================================================================
    // Apply Middleware Stack (order matters - applied bottom to top)
    // =========================================================================

    // 1. Request body size limit
    info!(
        max_size_kb = config.max_request_body_size / 1024,
        "Request body size limit configured"
    );
    router = router.layer(DefaultBodyLimit::max(config.max_request_body_size));

    // 2. Rate limiting (if enabled)
    if let Some(limiter) = &state.rate_limiter {
        info!(
            capacity = limiter.capacity(),
            interval_secs = limiter.refill_interval().as_secs(),
            trust_proxy_headers = config.trust_proxy_headers,
            "Rate limiting enabled"
        );
        router = router.layer(RateLimitLayer::new(
            limiter.clone(),
            ClientIpSource::new(config.trust_proxy_headers),
        ));
    } else {
        info!("Rate limiting disabled (RATE_LIMIT_CAPACITY=0)");
    }

    // 3. Session authentication
    router = router.layer(SessionLayer::new(
        state.sessions.clone(),
        (*state.cookie).clone(),
        LoginPath::new(&config.login_path),
    ));

    // 4. Timing
    router = router.layer(TimingLayer::new(
        config.slow_request_threshold,
        config.static_path_prefixes.clone(),
        state.perf.clone(),
    ));

    // 5. Request ID and tracing
    router = router
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

    router.with_state(state)
}
