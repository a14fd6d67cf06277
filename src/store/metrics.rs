//! Request counters and latency percentiles.
//!
//! Counters are monotonic for the process lifetime. Latencies live in a
//! fixed-capacity window (most recent 1000 samples); median and p95 are
//! computed on demand from a sorted copy, never mutating the window.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde::Serialize;

/// Number of latency samples retained.
const LATENCY_WINDOW: usize = 1000;

/// Source tags with this prefix count as remote-provider requests.
const REMOTE_SOURCE_PREFIX: &str = "gemini";
/// Source tags with this prefix count as local-provider requests.
const LOCAL_SOURCE_PREFIX: &str = "local";

#[derive(Debug, Default)]
struct MetricsInner {
    total_requests: u64,
    gemini_requests: u64,
    local_requests: u64,
    fallback_requests: u64,
    rate_limited_requests: u64,
    latencies: VecDeque<u64>,
}

/// Point-in-time view of the tracked metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub gemini_requests: u64,
    pub local_requests: u64,
    pub fallback_requests: u64,
    pub rate_limited_requests: u64,
    pub latency_median_ms: u64,
    pub latency_p95_ms: u64,
}

/// Aggregate usage tracker shared by all exchanges.
#[derive(Default)]
pub struct MetricsTracker {
    inner: Mutex<MetricsInner>,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed request: bumps the total, classifies the source
    /// by prefix (remote / local / everything else as fallback), and pushes
    /// the latency sample, dropping the oldest once the window is full.
    pub fn record_request(&self, latency_ms: u64, source: &str) {
        let mut inner = self.inner.lock().expect("metrics lock poisoned");
        inner.total_requests += 1;

        if source.starts_with(REMOTE_SOURCE_PREFIX) {
            inner.gemini_requests += 1;
        } else if source.starts_with(LOCAL_SOURCE_PREFIX) {
            inner.local_requests += 1;
        } else {
            inner.fallback_requests += 1;
        }

        inner.latencies.push_back(latency_ms);
        while inner.latencies.len() > LATENCY_WINDOW {
            inner.latencies.pop_front();
        }
    }

    /// Record a request rejected by the rate limiter.
    pub fn record_rate_limit(&self) {
        let mut inner = self.inner.lock().expect("metrics lock poisoned");
        inner.rate_limited_requests += 1;
    }

    /// Compute a snapshot of the current counters and latency percentiles.
    ///
    /// Median is the lower-middle element on an even sample count; the p95
    /// index is `floor(count * 0.95)` clamped to the last valid index.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.lock().expect("metrics lock poisoned");

        let (median, p95) = if inner.latencies.is_empty() {
            (0, 0)
        } else {
            let mut sorted: Vec<u64> = inner.latencies.iter().copied().collect();
            sorted.sort_unstable();
            let median = sorted[(sorted.len() - 1) / 2];
            let p95_idx = (sorted.len() * 95 / 100).min(sorted.len() - 1);
            (median, sorted[p95_idx])
        };

        MetricsSnapshot {
            total_requests: inner.total_requests,
            gemini_requests: inner.gemini_requests,
            local_requests: inner.local_requests,
            fallback_requests: inner.fallback_requests,
            rate_limited_requests: inner.rate_limited_requests,
            latency_median_ms: median,
            latency_p95_ms: p95,
        }
    }
}
