//! Health and readiness endpoints.
//!
//! # Endpoints
//!
//! - `GET /health` - Health check with session and limiter counts
//! - `GET /ready` - Kubernetes-compatible readiness probe
//!
//! # Health vs Readiness
//!
//! - **Health** (`/health`): Always returns 200, includes details
//! - **Readiness** (`/ready`): Returns 503 once shutdown has begun

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::Utc;
use tracing::instrument;

use crate::models::HealthResponse;
use crate::state::AppState;

/// Health check endpoint.
///
/// # Response Body
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "timestamp": "2024-01-15T10:30:00Z",
///   "active_sessions": 12,
///   "rate_limited_clients": 40,
///   "uptime_seconds": 3600
/// }
/// ```
#[instrument(skip(state))]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: if state.is_shutting_down() {
            "shutting_down"
        } else {
            "healthy"
        }
        .to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        active_sessions: state.sessions.active_count(),
        rate_limited_clients: state
            .rate_limiter
            .as_ref()
            .map_or(0, |limiter| limiter.tracked_clients()),
        uptime_seconds: state.uptime_seconds(),
    })
}

/// Readiness check endpoint for Kubernetes probes.
///
/// Returns 200 OK while serving, 503 Service Unavailable once the
/// application has started shutting down.
#[instrument(skip(state))]
pub async fn readiness_check(State(state): State<AppState>) -> Result<StatusCode, StatusCode> {
    if state.is_shutting_down() {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    } else {
        Ok(StatusCode::OK)
    }
}
