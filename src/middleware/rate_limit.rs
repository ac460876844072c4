//! Per-client-IP rate limiting using a coarse token bucket.
//!
//! # Algorithm
//!
//! Each client IP owns a bucket of at most `capacity` tokens:
//!
//! - First request from an IP: the bucket starts at `capacity - 1` (the
//!   request itself spends one) and the request is allowed.
//! - Later requests: `intervals = floor(elapsed / refill_interval)` whole
//!   intervals since the client was last seen add `intervals * capacity`
//!   tokens, clamped to `capacity`, and `last_seen` moves to now. An empty
//!   bucket denies without going negative; otherwise one token is spent.
//!
//! `last_seen` advances on every request, so partial intervals never
//! accumulate, and a client straddling an interval boundary can get close to
//! two buckets' worth in a short window. Both are properties of this
//! algorithm and are kept as-is.
//!
//! # Memory
//!
//! A background sweep (see [`RateLimiter::spawn_sweeper`]) evicts clients
//! idle longer than `idle_ttl`. It shares the limiter's mutex.
//!
//! # Response Headers
//!
//! On rate limit exceeded (429):
//! - `Retry-After`: Seconds until the bucket refills
//! - `X-RateLimit-Limit`: Configured bucket capacity
//! - `X-RateLimit-Remaining`: Always 0

use std::collections::HashMap;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::response::IntoResponse;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower::{Layer, Service};
use tracing::{debug, trace, warn};

use super::ip::ClientIpSource;
use crate::metrics;

/// Error type for rate limiter configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RateLimitError {
    #[error("rate limit capacity must be greater than 0; leave the layer out to disable limiting")]
    ZeroCapacity,

    #[error("rate limit refill interval must be greater than 0")]
    ZeroInterval,
}

/// Bucket state for one client IP.
#[derive(Debug, Clone, Copy)]
struct Visitor {
    tokens: u32,
    last_seen: Instant,
}

/// Thread-safe per-IP token bucket limiter.
///
/// Cloning yields another handle to the same visitor map.
#[derive(Clone)]
pub struct RateLimiter {
    visitors: Arc<Mutex<HashMap<String, Visitor>>>,
    capacity: u32,
    refill_interval: Duration,
    idle_ttl: Duration,
}

impl RateLimiter {
    /// Create a limiter granting `capacity` requests per `refill_interval`.
    ///
    /// # Errors
    ///
    /// Returns `RateLimitError` if `capacity` or `refill_interval` is zero.
    pub fn new(
        capacity: u32,
        refill_interval: Duration,
        idle_ttl: Duration,
    ) -> Result<Self, RateLimitError> {
        if capacity == 0 {
            return Err(RateLimitError::ZeroCapacity);
        }
        if refill_interval.is_zero() {
            return Err(RateLimitError::ZeroInterval);
        }

        Ok(Self {
            visitors: Arc::new(Mutex::new(HashMap::new())),
            capacity,
            refill_interval,
            idle_ttl,
        })
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn refill_interval(&self) -> Duration {
        self.refill_interval
    }

    /// Spend one token for `client_ip`. Returns `false` when the bucket is empty.
    pub fn allow(&self, client_ip: &str) -> bool {
        self.allow_at(client_ip, Instant::now())
    }

    pub(crate) fn allow_at(&self, client_ip: &str, now: Instant) -> bool {
        let mut visitors = self.visitors.lock();

        let Some(visitor) = visitors.get_mut(client_ip) else {
            visitors.insert(
                client_ip.to_string(),
                Visitor {
                    tokens: self.capacity - 1,
                    last_seen: now,
                },
            );
            return true;
        };

        let elapsed = now.saturating_duration_since(visitor.last_seen);
        let intervals = elapsed.as_nanos() / self.refill_interval.as_nanos();
        let refilled = u128::from(visitor.tokens)
            .saturating_add(intervals.saturating_mul(u128::from(self.capacity)))
            .min(u128::from(self.capacity));
        visitor.tokens = u32::try_from(refilled).unwrap_or(self.capacity);
        visitor.last_seen = visitor.last_seen.max(now);

        if visitor.tokens == 0 {
            trace!(client_ip, "Bucket empty");
            return false;
        }
        visitor.tokens -= 1;
        true
    }

    /// Number of client IPs currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.visitors.lock().len()
    }

    /// Evict clients idle longer than the idle TTL. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub(crate) fn sweep_at(&self, now: Instant) -> usize {
        let mut visitors = self.visitors.lock();
        let before = visitors.len();
        visitors.retain(|_, v| now.saturating_duration_since(v.last_seen) <= self.idle_ttl);
        let removed = before - visitors.len();
        metrics::set_rate_limit_visitors(visitors.len());
        removed
    }

    /// Spawn the periodic idle sweep on `tracker`, stopping when `cancel` fires.
    pub fn spawn_sweeper(
        &self,
        tracker: &TaskTracker,
        cancel: CancellationToken,
        sweep_interval: Duration,
    ) {
        if sweep_interval.is_zero() {
            warn!("Rate limit sweep interval is zero, idle clients will not be evicted");
            return;
        }
        let limiter = self.clone();

        tracker.spawn(async move {
            let mut ticker = interval(sweep_interval);
            ticker.tick().await; // Skip the first immediate tick

            loop {
                tokio::select! {
                    biased; // Check cancellation first

                    _ = cancel.cancelled() => {
                        debug!("Rate limit sweeper received cancellation signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        let removed = limiter.sweep();
                        if removed > 0 {
                            debug!(removed, remaining = limiter.tracked_clients(), "Swept idle rate limit clients");
                        }
                    }
                }
            }

            debug!("Rate limit sweeper shutting down");
        });
    }
}

/// Rate limiting layer for Tower middleware stack.
///
/// # Example
///
/// ```rust,ignore
/// let limiter = RateLimiter::new(60, Duration::from_secs(60), Duration::from_secs(300))?;
/// let app = Router::new()
///     .route("/", get(handler))
///     .layer(RateLimitLayer::new(limiter, ClientIpSource::peer_only()));
/// ```
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: RateLimiter,
    ip_source: ClientIpSource,
}

impl RateLimitLayer {
    pub fn new(limiter: RateLimiter, ip_source: ClientIpSource) -> Self {
        Self { limiter, ip_source }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiter: self.limiter.clone(),
            ip_source: self.ip_source,
        }
    }
}

/// Rate limiting service wrapper.
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: RateLimiter,
    ip_source: ClientIpSource,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let client_ip = self.ip_source.client_ip(&req);

        if self.limiter.allow(&client_ip) {
            let mut inner = self.inner.clone();
            return Box::pin(async move { inner.call(req).await });
        }

        let retry_after = self.limiter.refill_interval().as_secs().max(1);
        warn!(
            client_ip = %client_ip,
            path = %req.uri().path(),
            retry_after_secs = retry_after,
            "Rate limit exceeded for IP"
        );
        metrics::record_rate_limit_denial();

        let response = (
            StatusCode::TOO_MANY_REQUESTS,
            [
                ("Retry-After", retry_after.to_string()),
                ("X-RateLimit-Limit", self.limiter.capacity().to_string()),
                ("X-RateLimit-Remaining", "0".to_string()),
            ],
            "Rate limit exceeded. Please retry later.",
        )
            .into_response();

        Box::pin(async move { Ok(response) })
    }
}
