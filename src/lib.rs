//! # Dojo Auth
//!
//! Session and request-authorization core for a martial-arts school web
//! application, built on Axum:
//!
//! - **Sessions**: 256-bit random tokens, in-memory store, 24h expire-on-access
//! - **Access Control**: Authentication and role gates, admin impersonation
//! - **Rate Limiting**: Per-client-IP token bucket with background idle sweep
//! - **Observability**: Request timing, slow-request warnings, Prometheus metrics
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Middleware (Trace → Timing → Session → Rate Limit)         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Authorize gates per route group (303 login / 403)          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Handlers (login, logout, me, impersonation, perf, health)  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  SessionStore · RateLimiter · PerfStore · CredentialVerifier│
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dojo_auth::{AppState, Config, build_router};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let state = AppState::with_bootstrap_accounts(config)?;
//!     let app = build_router(state.clone());
//!
//!     // Serve `app`, then:
//!     state.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Using the layers directly
//!
//! The layers in [`middleware`] compose onto any Axum router. Gate a route
//! group with [`middleware::AuthorizeLayer`] under a
//! [`middleware::SessionLayer`]:
//!
//! ```rust,ignore
//! let coach = Router::new()
//!     .route("/coach/roster", get(roster))
//!     .route_layer(AuthorizeLayer::roles([Role::Admin, Role::Coach]));
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod session;
pub mod state;
pub mod utils;
pub mod validation;

// Re-exports for convenience
pub use config::Config;
pub use error::{AppError, AppResult};
pub use routes::build_router;
pub use session::{Role, Session, SessionStore, SessionToken};
pub use state::AppState;
