//! Request timing collection for the admin performance dashboard.
//!
//! [`TimingLayer`](crate::middleware::TimingLayer) forwards one
//! [`TimingEntry`] per request to a [`PerfCollector`]. Collection is
//! fire-and-forget: collectors never fail and never block for long.
//!
//! [`PerfStore`] is the in-memory collector: a bounded ring buffer of recent
//! entries plus lifetime counters that survive eviction.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

/// Number of slowest entries reported in a snapshot.
const SLOWEST_LIMIT: usize = 10;

/// Timing record for one completed request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimingEntry {
    /// `"METHOD /path"`
    pub route: String,
    pub status: u16,
    pub duration_ms: f64,
    pub slow: bool,
    pub started_at: DateTime<Utc>,
}

/// Sink for request timings.
pub trait PerfCollector: Send + Sync {
    fn record(&self, entry: TimingEntry);
}

/// Collector that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCollector;

impl PerfCollector for NoopCollector {
    fn record(&self, _entry: TimingEntry) {}
}

#[derive(Debug, Default)]
struct PerfInner {
    entries: VecDeque<TimingEntry>,
    total_requests: u64,
    slow_requests: u64,
}

/// Bounded in-memory timing store.
#[derive(Debug)]
pub struct PerfStore {
    capacity: usize,
    inner: Mutex<PerfInner>,
}

/// Point-in-time view of the perf store.
#[derive(Debug, Clone, Serialize)]
pub struct PerfSnapshot {
    pub total_requests: u64,
    pub slow_requests: u64,
    pub buffered: usize,
    pub capacity: usize,
    /// Newest first.
    pub recent: Vec<TimingEntry>,
    /// Slowest buffered entries, slowest first.
    pub slowest: Vec<TimingEntry>,
}

impl PerfStore {
    /// Create a store retaining at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: Mutex::new(PerfInner {
                entries: VecDeque::with_capacity(capacity),
                ..PerfInner::default()
            }),
        }
    }

    pub fn snapshot(&self) -> PerfSnapshot {
        let inner = self.inner.lock();

        let recent: Vec<TimingEntry> = inner.entries.iter().rev().cloned().collect();
        let mut slowest = recent.clone();
        slowest.sort_by(|a, b| b.duration_ms.total_cmp(&a.duration_ms));
        slowest.truncate(SLOWEST_LIMIT);

        PerfSnapshot {
            total_requests: inner.total_requests,
            slow_requests: inner.slow_requests,
            buffered: inner.entries.len(),
            capacity: self.capacity,
            recent,
            slowest,
        }
    }
}

impl PerfCollector for PerfStore {
    fn record(&self, entry: TimingEntry) {
        let mut inner = self.inner.lock();
        inner.total_requests += 1;
        if entry.slow {
            inner.slow_requests += 1;
        }
        if inner.entries.len() == self.capacity {
            inner.entries.pop_front();
        }
        inner.entries.push_back(entry);
    }
}
