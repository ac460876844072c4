//! Request timing and slow-request detection.
//!
//! Every non-static request is timed around the inner service and produces:
//!
//! - one structured log record (`info!` when normal, `warn!` when slow)
//! - a sample in the request-duration histogram
//! - a [`TimingEntry`] for the configured [`PerfCollector`]
//!
//! A request is slow when its duration is **at or above** the threshold.

use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{Request, Response};
use chrono::Utc;
use tower::{Layer, Service};
use tracing::{info, warn};

use crate::metrics;
use crate::services::perf::{PerfCollector, TimingEntry};

/// Outcome of comparing a request duration against the slow threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    Normal,
    Slow,
}

/// Classify `duration` against `threshold`; the boundary itself is slow.
pub fn classify(duration: Duration, threshold: Duration) -> RequestClass {
    if duration >= threshold {
        RequestClass::Slow
    } else {
        RequestClass::Normal
    }
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
fn whole_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Timing layer.
///
/// # Example
///
/// ```rust,ignore
/// let app = Router::new()
///     .route("/", get(handler))
///     .layer(TimingLayer::new(Duration::from_millis(200), vec!["/static/".into()], perf));
/// ```
#[derive(Clone)]
pub struct TimingLayer {
    threshold: Duration,
    static_prefixes: Arc<[String]>,
    collector: Arc<dyn PerfCollector>,
}

impl TimingLayer {
    pub fn new(
        threshold: Duration,
        static_prefixes: Vec<String>,
        collector: Arc<dyn PerfCollector>,
    ) -> Self {
        Self {
            threshold,
            static_prefixes: static_prefixes.into(),
            collector,
        }
    }
}

impl<S> Layer<S> for TimingLayer {
    type Service = TimingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TimingService {
            inner,
            threshold: self.threshold,
            static_prefixes: self.static_prefixes.clone(),
            collector: self.collector.clone(),
        }
    }
}

#[derive(Clone)]
pub struct TimingService<S> {
    inner: S,
    threshold: Duration,
    static_prefixes: Arc<[String]>,
    collector: Arc<dyn PerfCollector>,
}

impl<S> TimingService<S> {
    fn is_static(&self, path: &str) -> bool {
        self.static_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }
}

impl<S> Service<Request<Body>> for TimingService<S>
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
        let mut inner = self.inner.clone();

        if self.is_static(req.uri().path()) {
            return Box::pin(async move { inner.call(req).await });
        }

        let method = req.method().to_string();
        let path = req.uri().path().to_string();
        let threshold = self.threshold;
        let collector = self.collector.clone();

        Box::pin(async move {
            let started_at = Utc::now();
            let start = Instant::now();

            let response = inner.call(req).await?;

            let duration = start.elapsed();
            let status = response.status().as_u16();
            let duration_ms = duration.as_secs_f64() * 1000.0;
            let class = classify(duration, threshold);

            match class {
                RequestClass::Normal => info!(
                    method = %method,
                    path = %path,
                    status,
                    duration_ms,
                    "Request completed"
                ),
                RequestClass::Slow => warn!(
                    method = %method,
                    path = %path,
                    status,
                    duration_ms,
                    threshold_ms = whole_millis(threshold),
                    "Slow request"
                ),
            }

            let slow = class == RequestClass::Slow;
            metrics::record_request(&method, status, duration.as_secs_f64(), slow);
            collector.record(TimingEntry {
                route: format!("{method} {path}"),
                status,
                duration_ms,
                slow,
                started_at,
            });

            Ok(response)
        })
    }
}
