use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use hyper::StatusCode;
use serde::Serialize;
use tokio::sync::RwLock;

/// Process-wide request counters, published at `/debug/vars`.
#[derive(Clone, Debug)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    total_requests_received: AtomicU64,
    total_responses_sent: AtomicU64,
    /// Sum of handling time across all finished requests, in microseconds
    total_processing_time_us: AtomicU64,
    /// Requests currently being processed
    in_flight: AtomicUsize,
    /// Requests turned away by the rate limiter
    rate_limited: AtomicU64,
    /// Requests that hit a panic and were answered with a 500
    panics_recovered: AtomicU64,
    responses_by_status: RwLock<BTreeMap<u16, u64>>,
    /// Request latencies (circular buffer)
    latencies: RwLock<LatencyTracker>,
    start_time: Instant,
}

#[derive(Debug)]
struct LatencyTracker {
    buffer: Vec<Duration>,
    index: usize,
    capacity: usize,
}

impl LatencyTracker {
    fn new(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
            index: 0,
            capacity,
        }
    }

    fn record(&mut self, duration: Duration) {
        if self.buffer.len() < self.capacity {
            self.buffer.push(duration);
        } else {
            self.buffer[self.index] = duration;
            self.index = (self.index + 1) % self.capacity;
        }
    }

    fn percentile(&self, p: f64) -> Option<Duration> {
        if self.buffer.is_empty() {
            return None;
        }

        let mut sorted = self.buffer.clone();
        sorted.sort();

        let index = ((p / 100.0) * sorted.len() as f64) as usize;
        sorted.get(index.min(sorted.len() - 1)).copied()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                total_requests_received: AtomicU64::new(0),
                total_responses_sent: AtomicU64::new(0),
                total_processing_time_us: AtomicU64::new(0),
                in_flight: AtomicUsize::new(0),
                rate_limited: AtomicU64::new(0),
                panics_recovered: AtomicU64::new(0),
                responses_by_status: RwLock::new(BTreeMap::new()),
                latencies: RwLock::new(LatencyTracker::new(1000)),
                start_time: Instant::now(),
            }),
        }
    }

    /// Count a new request. It stays in flight until the returned guard is
    /// dropped, so an abandoned request is released as well.
    pub fn request_start(&self) -> InFlightGuard {
        self.inner
            .total_requests_received
            .fetch_add(1, Ordering::Relaxed);
        self.inner.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlightGuard {
            inner: self.inner.clone(),
        }
    }

    /// Record a finished request. `status` is `None` when the inner service
    /// failed without producing a response.
    pub async fn request_end(&self, status: Option<StatusCode>, duration: Duration) {
        self.inner.total_responses_sent.fetch_add(1, Ordering::Relaxed);
        self.inner.total_processing_time_us.fetch_add(
            u64::try_from(duration.as_micros()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );

        if let Some(status) = status {
            *self
                .inner
                .responses_by_status
                .write()
                .await
                .entry(status.as_u16())
                .or_insert(0) += 1;
        }
        self.inner.latencies.write().await.record(duration);
    }

    pub fn record_rate_limited(&self) {
        self.inner.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_panic(&self) {
        self.inner.panics_recovered.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current snapshot of metrics
    pub async fn snapshot(&self) -> MetricsSnapshot {
        let latencies = self.inner.latencies.read().await;
        let by_status = self.inner.responses_by_status.read().await;

        MetricsSnapshot {
            total_requests_received: self.inner.total_requests_received.load(Ordering::Relaxed),
            total_responses_sent: self.inner.total_responses_sent.load(Ordering::Relaxed),
            total_processing_time_us: self.inner.total_processing_time_us.load(Ordering::Relaxed),
            in_flight: self.inner.in_flight.load(Ordering::Relaxed),
            rate_limited: self.inner.rate_limited.load(Ordering::Relaxed),
            panics_recovered: self.inner.panics_recovered.load(Ordering::Relaxed),
            total_responses_sent_by_status: by_status
                .iter()
                .map(|(code, count)| (code.to_string(), *count))
                .collect(),
            uptime_secs: self.inner.start_time.elapsed().as_secs(),
            latency_p50_us: latencies.percentile(50.0).map(|d| d.as_micros() as u64),
            latency_p99_us: latencies.percentile(99.0).map(|d| d.as_micros() as u64),
        }
    }
}

/// One in-flight request.
#[must_use]
#[derive(Debug)]
pub struct InFlightGuard {
    inner: Arc<MetricsInner>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.inner.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests_received: u64,
    pub total_responses_sent: u64,
    #[serde(rename = "total_processing_time_μs")]
    pub total_processing_time_us: u64,
    pub in_flight: usize,
    pub rate_limited: u64,
    pub panics_recovered: u64,
    pub total_responses_sent_by_status: BTreeMap<String, u64>,
    pub uptime_secs: u64,
    pub latency_p50_us: Option<u64>,
    pub latency_p99_us: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counts_requests_by_status() {
        let metrics = Metrics::new();

        let first = metrics.request_start();
        let second = metrics.request_start();
        let _third = metrics.request_start();
        metrics
            .request_end(Some(StatusCode::OK), Duration::from_millis(3))
            .await;
        drop(first);
        metrics
            .request_end(Some(StatusCode::OK), Duration::from_millis(5))
            .await;
        drop(second);
        metrics.record_rate_limited();

        let snap = metrics.snapshot().await;
        assert_eq!(snap.total_requests_received, 3);
        assert_eq!(snap.total_responses_sent, 2);
        assert_eq!(snap.in_flight, 1);
        assert_eq!(snap.total_processing_time_us, 8_000);
        assert_eq!(snap.total_responses_sent_by_status["200"], 2);
        assert_eq!(snap.rate_limited, 1);
        assert_eq!(snap.latency_p99_us, Some(5_000));
    }

    #[test]
    fn percentile_of_empty_tracker_is_none() {
        let tracker = LatencyTracker::new(4);
        assert!(tracker.percentile(50.0).is_none());
    }

    #[test]
    fn tracker_overwrites_oldest_when_full() {
        let mut tracker = LatencyTracker::new(2);
        tracker.record(Duration::from_millis(100));
        tracker.record(Duration::from_millis(1));
        tracker.record(Duration::from_millis(2));
        assert_eq!(tracker.percentile(99.0), Some(Duration::from_millis(2)));
    }
}
