//! Shared application state for Axum handlers.
//!
//! This module provides thread-safe, clonable state that is shared across
//! all request handlers and middleware. It includes:
//!
//! - **Sessions**: The in-memory session store and cookie contract
//! - **Rate Limiting**: The per-IP limiter (when enabled) and login throttle
//! - **Observability**: The perf store behind `/admin/perf`
//! - **Credentials**: The verifier used by the login form
//!
//! # Structured Concurrency
//!
//! Background tasks are managed using `tokio_util::task::TaskTracker` and
//! `CancellationToken` for proper lifecycle management. Call `shutdown()`
//! to gracefully stop all background tasks before application exit.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::FromRef;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace};

use crate::config::Config;
use crate::metrics;
use crate::middleware::{ClientIpSource, LoginThrottle, RateLimitError, RateLimiter};
use crate::services::{CredentialVerifier, PerfStore, StaticAccounts};
use crate::session::{SessionCookie, SessionStore};

/// How often gauges are refreshed and idle throttle state is dropped.
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(30);

/// Shared application state for Axum handlers.
///
/// This struct is cloned for each request handler. All internal data
/// is wrapped in `Arc` for efficient sharing.
///
/// # Lifecycle
///
/// Background tasks are spawned when the state is created, so construction
/// must happen inside a Tokio runtime. Call `shutdown()` before dropping to
/// ensure clean task termination:
///
/// ```rust,ignore
/// let state = AppState::new(config, credentials)?;
/// // ... use state ...
/// state.shutdown().await;  // Wait for background tasks to complete
/// ```
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,
    /// Session store shared with the session layer
    pub sessions: SessionStore,
    /// Session cookie name and flags
    pub cookie: Arc<SessionCookie>,
    /// Per-IP request limiter (`None` when disabled)
    pub rate_limiter: Option<RateLimiter>,
    /// Brute-force guard for the login form
    pub login_throttle: LoginThrottle,
    /// Recent request timings
    pub perf: Arc<PerfStore>,
    /// Credential check for the login form
    pub credentials: Arc<dyn CredentialVerifier>,
    /// Timestamp when the application started
    pub started_at: Instant,
    /// Tracks spawned background tasks for graceful shutdown
    task_tracker: TaskTracker,
    /// Cancellation token for signaling background tasks to stop
    cancellation_token: CancellationToken,
}

impl AppState {
    /// Create application state and start its background tasks.
    ///
    /// # Errors
    ///
    /// Returns `RateLimitError` if rate limiting is enabled with an invalid
    /// refill interval.
    pub fn new(
        config: Config,
        credentials: Arc<dyn CredentialVerifier>,
    ) -> Result<Self, RateLimitError> {
        let rate_limiter = if config.rate_limiting_enabled() {
            Some(RateLimiter::new(
                config.rate_limit_capacity,
                config.rate_limit_interval,
                config.rate_limit_idle_ttl,
            )?)
        } else {
            None
        };

        let state = Self {
            sessions: SessionStore::new(),
            cookie: Arc::new(SessionCookie::new(
                config.session_cookie_name.clone(),
                config.session_cookie_secure,
            )),
            rate_limiter,
            login_throttle: LoginThrottle::new(
                config.login_failure_limit,
                config.login_failure_burst,
            ),
            perf: Arc::new(PerfStore::new(config.perf_buffer_size)),
            credentials,
            started_at: Instant::now(),
            config: Arc::new(config),
            task_tracker: TaskTracker::new(),
            cancellation_token: CancellationToken::new(),
        };

        // Spawn background tasks
        if let Some(limiter) = &state.rate_limiter {
            limiter.spawn_sweeper(
                &state.task_tracker,
                state.cancellation_token.clone(),
                state.config.rate_limit_sweep_interval,
            );
        }
        state.spawn_housekeeping_task();

        Ok(state)
    }

    /// State whose only accounts come from the bootstrap admin configuration.
    ///
    /// # Errors
    ///
    /// See [`AppState::new`].
    pub fn with_bootstrap_accounts(config: Config) -> Result<Self, RateLimitError> {
        let accounts = StaticAccounts::from_bootstrap(config.bootstrap_admin.as_ref());
        if accounts.is_empty() {
            info!("No bootstrap admin configured, logins will be rejected");
        }
        Self::new(config, Arc::new(accounts))
    }

    /// Spawn the housekeeping task.
    ///
    /// Refreshes the session and visitor gauges and lets the login throttle
    /// forget IPs whose budget has fully recovered.
    fn spawn_housekeeping_task(&self) {
        let sessions = self.sessions.clone();
        let rate_limiter = self.rate_limiter.clone();
        let login_throttle = self.login_throttle.clone();
        let cancel = self.cancellation_token.clone();

        self.task_tracker.spawn(async move {
            let mut ticker = interval(HOUSEKEEPING_INTERVAL);
            ticker.tick().await; // Skip the first immediate tick

            loop {
                tokio::select! {
                    biased; // Check cancellation first

                    _ = cancel.cancelled() => {
                        debug!("Housekeeping task received cancellation signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        let active_sessions = sessions.active_count();
                        metrics::set_active_sessions(active_sessions);
                        if let Some(limiter) = &rate_limiter {
                            metrics::set_rate_limit_visitors(limiter.tracked_clients());
                        }
                        login_throttle.retain_recent();
                        trace!(
                            active_sessions,
                            throttled_ips = login_throttle.len(),
                            "Housekeeping pass complete"
                        );
                    }
                }
            }

            debug!("Housekeeping task shutting down");
        });
    }

    /// Whether `shutdown()` has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Signal background tasks to stop and mark the service as not ready.
    ///
    /// In-flight requests keep being served; call `shutdown()` once the
    /// server has drained.
    pub fn begin_shutdown(&self) {
        self.cancellation_token.cancel();
    }

    /// Gracefully shutdown all background tasks.
    ///
    /// This method:
    /// 1. Signals all tasks to stop via cancellation token
    /// 2. Closes the task tracker (prevents new tasks)
    /// 3. Waits for all tasks to complete
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown of background tasks");

        self.begin_shutdown();
        self.task_tracker.close();
        self.task_tracker.wait().await;

        info!("All background tasks have completed");
    }

    /// Get the application uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

impl FromRef<AppState> for ClientIpSource {
    fn from_ref(state: &AppState) -> Self {
        ClientIpSource::new(state.config.trust_proxy_headers)
    }
}
