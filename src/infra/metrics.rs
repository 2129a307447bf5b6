//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! All counter updates are lock-free; reporting is the only operation
//! that resets anything (via atomic swap).
//!
//! NOTE: All atomics use Relaxed ordering intentionally. These are statistical
//! counters only. Do NOT use them for coordination or logic decisions.

use crate::domain::error::ParkingError;
use crate::domain::types::Channel;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Request latency bucket boundaries (milliseconds)
/// Buckets: ≤5, ≤10, ≤25, ≤50, ≤100, ≤250, ≤500, ≤1000, ≤2500, ≤5000, >5000
pub const LATENCY_BUCKET_BOUNDS_MS: [u64; 10] = [5, 10, 25, 50, 100, 250, 500, 1000, 2500, 5000];
pub const NUM_BUCKETS: usize = 11;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_ms: u64) -> usize {
    LATENCY_BUCKET_BOUNDS_MS.partition_point(|&bound| bound < latency_ms)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = ((total as f64 * percentile).ceil() as u64).max(1);
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [5, 10, 25, 50, 100, 250, 500, 1000, 2500, 5000, 10000];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
pub struct Metrics {
    started_at: Instant,
    /// Requests per channel (monotonic)
    ussd_requests_total: AtomicU64,
    whatsapp_messages_total: AtomicU64,
    ivr_requests_total: AtomicU64,
    /// Inputs that resolved to no route (monotonic)
    invalid_inputs_total: AtomicU64,
    not_found_total: AtomicU64,
    cross_operator_refusals_total: AtomicU64,
    upstream_failures_total: AtomicU64,
    /// Swallowed side-effect failures: phone links, notifications (monotonic)
    best_effort_failures_total: AtomicU64,
    fees_computed_total: AtomicU64,
    pushes_sent_total: AtomicU64,
    pushes_failed_total: AtomicU64,
    /// Request latency histogram buckets (monotonic, exported cumulatively)
    latency_buckets: [AtomicU64; NUM_BUCKETS],
    latency_sum_ms: AtomicU64,
    /// Window values (reset on report)
    window_buckets: [AtomicU64; NUM_BUCKETS],
    window_latency_max_ms: AtomicU64,
    window_requests: AtomicU64,
    last_report: parking_lot::Mutex<Instant>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            started_at: now,
            ussd_requests_total: AtomicU64::new(0),
            whatsapp_messages_total: AtomicU64::new(0),
            ivr_requests_total: AtomicU64::new(0),
            invalid_inputs_total: AtomicU64::new(0),
            not_found_total: AtomicU64::new(0),
            cross_operator_refusals_total: AtomicU64::new(0),
            upstream_failures_total: AtomicU64::new(0),
            best_effort_failures_total: AtomicU64::new(0),
            fees_computed_total: AtomicU64::new(0),
            pushes_sent_total: AtomicU64::new(0),
            pushes_failed_total: AtomicU64::new(0),
            latency_buckets: Default::default(),
            latency_sum_ms: AtomicU64::new(0),
            window_buckets: Default::default(),
            window_latency_max_ms: AtomicU64::new(0),
            window_requests: AtomicU64::new(0),
            last_report: parking_lot::Mutex::new(now),
        }
    }

    #[inline]
    pub fn record_request(&self, channel: Channel) {
        let counter = match channel {
            Channel::Ussd => &self.ussd_requests_total,
            Channel::WhatsApp => &self.whatsapp_messages_total,
            Channel::Ivr => &self.ivr_requests_total,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_latency(&self, latency_ms: u64) {
        let idx = bucket_index(latency_ms);
        self.latency_buckets[idx].fetch_add(1, Ordering::Relaxed);
        self.window_buckets[idx].fetch_add(1, Ordering::Relaxed);
        self.latency_sum_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.window_requests.fetch_add(1, Ordering::Relaxed);
        update_atomic_max(&self.window_latency_max_ms, latency_ms);
    }

    #[inline]
    pub fn record_invalid_input(&self) {
        self.invalid_inputs_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a request that ended in a `ParkingError`
    pub fn record_error(&self, err: &ParkingError) {
        let counter = match err {
            ParkingError::NotFound(_) => &self.not_found_total,
            ParkingError::CrossOperatorConflict { .. } => &self.cross_operator_refusals_total,
            ParkingError::Upstream { .. } => &self.upstream_failures_total,
            ParkingError::MalformedInput(_) => &self.invalid_inputs_total,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_best_effort_failure(&self) {
        self.best_effort_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_fee_computed(&self) {
        self.fees_computed_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_push(&self, sent: bool) {
        if sent {
            self.pushes_sent_total.fetch_add(1, Ordering::Relaxed);
        } else {
            self.pushes_failed_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn requests_total(&self) -> u64 {
        self.ussd_requests_total.load(Ordering::Relaxed)
            + self.whatsapp_messages_total.load(Ordering::Relaxed)
            + self.ivr_requests_total.load(Ordering::Relaxed)
    }

    /// Snapshot of all counters; window values are reset
    pub fn report(&self) -> MetricsSummary {
        self.summarize(true)
    }

    /// Snapshot of all counters, leaving the reporting window untouched
    pub fn snapshot(&self) -> MetricsSummary {
        self.summarize(false)
    }

    fn summarize(&self, reset_window: bool) -> MetricsSummary {
        let (window_buckets, window_requests, window_max_ms, elapsed_secs) = if reset_window {
            let mut last_report = self.last_report.lock();
            let elapsed_secs = last_report.elapsed().as_secs_f64();
            *last_report = Instant::now();
            drop(last_report);
            (
                swap_buckets(&self.window_buckets),
                self.window_requests.swap(0, Ordering::Relaxed),
                self.window_latency_max_ms.swap(0, Ordering::Relaxed),
                elapsed_secs,
            )
        } else {
            let mut buckets = [0u64; NUM_BUCKETS];
            for (i, bucket) in self.window_buckets.iter().enumerate() {
                buckets[i] = bucket.load(Ordering::Relaxed);
            }
            (
                buckets,
                self.window_requests.load(Ordering::Relaxed),
                self.window_latency_max_ms.load(Ordering::Relaxed),
                self.last_report.lock().elapsed().as_secs_f64(),
            )
        };
        let requests_per_sec =
            if elapsed_secs > 0.0 { window_requests as f64 / elapsed_secs } else { 0.0 };

        let mut latency_buckets = [0u64; NUM_BUCKETS];
        for (i, bucket) in self.latency_buckets.iter().enumerate() {
            latency_buckets[i] = bucket.load(Ordering::Relaxed);
        }

        MetricsSummary {
            uptime_secs: self.started_at.elapsed().as_secs(),
            ussd_requests_total: self.ussd_requests_total.load(Ordering::Relaxed),
            whatsapp_messages_total: self.whatsapp_messages_total.load(Ordering::Relaxed),
            ivr_requests_total: self.ivr_requests_total.load(Ordering::Relaxed),
            invalid_inputs_total: self.invalid_inputs_total.load(Ordering::Relaxed),
            not_found_total: self.not_found_total.load(Ordering::Relaxed),
            cross_operator_refusals_total: self.cross_operator_refusals_total.load(Ordering::Relaxed),
            upstream_failures_total: self.upstream_failures_total.load(Ordering::Relaxed),
            best_effort_failures_total: self.best_effort_failures_total.load(Ordering::Relaxed),
            fees_computed_total: self.fees_computed_total.load(Ordering::Relaxed),
            pushes_sent_total: self.pushes_sent_total.load(Ordering::Relaxed),
            pushes_failed_total: self.pushes_failed_total.load(Ordering::Relaxed),
            latency_buckets,
            latency_sum_ms: self.latency_sum_ms.load(Ordering::Relaxed),
            requests_per_sec,
            window_p50_ms: percentile_from_buckets(&window_buckets, 0.50),
            window_p99_ms: percentile_from_buckets(&window_buckets, 0.99),
            window_max_ms,
        }
    }
}

/// Point-in-time metrics snapshot
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub uptime_secs: u64,
    pub ussd_requests_total: u64,
    pub whatsapp_messages_total: u64,
    pub ivr_requests_total: u64,
    pub invalid_inputs_total: u64,
    pub not_found_total: u64,
    pub cross_operator_refusals_total: u64,
    pub upstream_failures_total: u64,
    pub best_effort_failures_total: u64,
    pub fees_computed_total: u64,
    pub pushes_sent_total: u64,
    pub pushes_failed_total: u64,
    /// Cumulative latency histogram, bounds in `LATENCY_BUCKET_BOUNDS_MS`
    pub latency_buckets: [u64; NUM_BUCKETS],
    pub latency_sum_ms: u64,
    pub requests_per_sec: f64,
    pub window_p50_ms: u64,
    pub window_p99_ms: u64,
    pub window_max_ms: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            ussd = %self.ussd_requests_total,
            whatsapp = %self.whatsapp_messages_total,
            ivr = %self.ivr_requests_total,
            requests_per_sec = format!("{:.2}", self.requests_per_sec),
            p50_ms = %self.window_p50_ms,
            p99_ms = %self.window_p99_ms,
            max_ms = %self.window_max_ms,
            invalid = %self.invalid_inputs_total,
            refusals = %self.cross_operator_refusals_total,
            upstream_failures = %self.upstream_failures_total,
            pushes_sent = %self.pushes_sent_total,
            pushes_failed = %self.pushes_failed_total,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::Plate;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.requests_total(), 0);
        let summary = metrics.report();
        assert_eq!(summary.window_p50_ms, 0);
        assert_eq!(summary.latency_buckets.iter().sum::<u64>(), 0);
    }

    #[test]
    fn test_bucket_index() {
        assert_eq!(bucket_index(0), 0);
        assert_eq!(bucket_index(5), 0);
        assert_eq!(bucket_index(6), 1);
        assert_eq!(bucket_index(5000), 9);
        assert_eq!(bucket_index(5001), 10);
    }

    #[test]
    fn test_record_and_report() {
        let metrics = Metrics::new();
        metrics.record_request(Channel::Ussd);
        metrics.record_request(Channel::Ussd);
        metrics.record_request(Channel::Ivr);
        metrics.record_latency(3);
        metrics.record_latency(40);
        metrics.record_push(true);
        metrics.record_push(false);
        metrics.record_error(&ParkingError::NotFound(Plate::parse("KCA123X").unwrap()));

        let summary = metrics.report();
        assert_eq!(summary.ussd_requests_total, 2);
        assert_eq!(summary.ivr_requests_total, 1);
        assert_eq!(summary.pushes_sent_total, 1);
        assert_eq!(summary.pushes_failed_total, 1);
        assert_eq!(summary.not_found_total, 1);
        assert_eq!(summary.window_max_ms, 40);
        assert_eq!(summary.latency_sum_ms, 43);

        // Window values reset, cumulative histogram does not
        let next = metrics.report();
        assert_eq!(metrics.snapshot().window_max_ms, 0);
        assert_eq!(next.window_max_ms, 0);
        assert_eq!(next.latency_buckets.iter().sum::<u64>(), 2);
    }

    #[test]
    fn test_percentile_from_buckets() {
        let mut buckets = [0u64; NUM_BUCKETS];
        buckets[0] = 90;
        buckets[6] = 10;
        assert_eq!(percentile_from_buckets(&buckets, 0.50), 5);
        assert_eq!(percentile_from_buckets(&buckets, 0.99), 500);
    }
}
