//! Prometheus metrics for application observability.
//!
//! Metrics are exposed via a dedicated HTTP listener (default: `0.0.0.0:9090`).
//! Recording functions are safe to call before [`init_metrics`]; without an
//! installed recorder they are no-ops.
//!
//! # Available Metrics
//!
//! ## Counters
//! - `dojo_http_slow_requests_total` - Requests at or above the slow threshold (labels: method)
//! - `dojo_rate_limit_denials_total` - Requests rejected by the per-IP limiter
//! - `dojo_sessions_created_total` - Sessions created (labels: role)
//! - `dojo_sessions_expired_total` - Sessions evicted on access after their TTL
//! - `dojo_login_failures_total` - Failed login attempts (labels: reason)
//!
//! ## Histograms
//! - `dojo_http_request_duration_seconds` - Request duration (labels: method, status)
//!
//! ## Gauges
//! - `dojo_active_sessions` - Sessions currently held by the store
//! - `dojo_rate_limit_visitors` - Client IPs currently tracked by the limiter

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{error, info};

use crate::session::Role;

/// Metric names as constants for consistency.
pub mod names {
    pub const REQUEST_DURATION_SECONDS: &str = "dojo_http_request_duration_seconds";
    pub const SLOW_REQUESTS_TOTAL: &str = "dojo_http_slow_requests_total";
    pub const RATE_LIMIT_DENIALS_TOTAL: &str = "dojo_rate_limit_denials_total";
    pub const SESSIONS_CREATED_TOTAL: &str = "dojo_sessions_created_total";
    pub const SESSIONS_EXPIRED_TOTAL: &str = "dojo_sessions_expired_total";
    pub const LOGIN_FAILURES_TOTAL: &str = "dojo_login_failures_total";
    pub const ACTIVE_SESSIONS: &str = "dojo_active_sessions";
    pub const RATE_LIMIT_VISITORS: &str = "dojo_rate_limit_visitors";
}

/// Initialize the Prometheus metrics exporter.
///
/// This sets up metric descriptions and starts the Prometheus HTTP listener
/// on the specified address.
///
/// # Returns
///
/// `Ok(())` if initialization succeeds, `Err` with message otherwise.
pub fn init_metrics(metrics_addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_histogram!(
        names::REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_counter!(
        names::SLOW_REQUESTS_TOTAL,
        "Requests at or above the slow-request threshold"
    );
    describe_counter!(
        names::RATE_LIMIT_DENIALS_TOTAL,
        "Requests rejected by the per-IP rate limiter"
    );
    describe_counter!(names::SESSIONS_CREATED_TOTAL, "Sessions created");
    describe_counter!(
        names::SESSIONS_EXPIRED_TOTAL,
        "Sessions evicted on access after their TTL"
    );
    describe_counter!(names::LOGIN_FAILURES_TOTAL, "Failed login attempts");
    describe_gauge!(names::ACTIVE_SESSIONS, "Sessions currently held in memory");
    describe_gauge!(
        names::RATE_LIMIT_VISITORS,
        "Client IPs currently tracked by the rate limiter"
    );

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Try to initialize metrics, logging any errors but not failing.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        error!(error = %e, "Failed to initialize metrics, continuing without metrics");
    }
}

// =============================================================================
// Request Timing
// =============================================================================

/// Record HTTP request duration and, when slow, bump the slow counter.
pub fn record_request(method: &str, status: u16, duration_secs: f64, slow: bool) {
    histogram!(names::REQUEST_DURATION_SECONDS, "method" => method.to_string(), "status" => status.to_string())
        .record(duration_secs);
    if slow {
        counter!(names::SLOW_REQUESTS_TOTAL, "method" => method.to_string()).increment(1);
    }
}

// =============================================================================
// Sessions and Access Control
// =============================================================================

pub fn record_session_created(role: Role) {
    counter!(names::SESSIONS_CREATED_TOTAL, "role" => role.as_str()).increment(1);
}

pub fn record_session_expired() {
    counter!(names::SESSIONS_EXPIRED_TOTAL).increment(1);
}

/// Record a failed login. `reason` is a short fixed label, never user input.
pub fn record_login_failure(reason: &'static str) {
    counter!(names::LOGIN_FAILURES_TOTAL, "reason" => reason).increment(1);
}

pub fn record_rate_limit_denial() {
    counter!(names::RATE_LIMIT_DENIALS_TOTAL).increment(1);
}

// =============================================================================
// Gauges
// =============================================================================

pub fn set_active_sessions(count: usize) {
    gauge!(names::ACTIVE_SESSIONS).set(count as f64);
}

pub fn set_rate_limit_visitors(count: usize) {
    gauge!(names::RATE_LIMIT_VISITORS).set(count as f64);
}
