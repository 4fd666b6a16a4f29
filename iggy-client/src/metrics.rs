//! Metrics collection for the Iggy client

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Per-client counters, shared by the facade and the dispatcher
#[derive(Debug, Default)]
pub struct ClientMetrics {
    // Dispatcher metrics
    pub ticks: AtomicU64,
    pub requests_drained: AtomicU64,
    pub requests_discarded: AtomicU64,

    // Send metrics
    pub batches_sent: AtomicU64,
    pub messages_sent: AtomicU64,
    pub send_errors: AtomicU64,
    pub send_latency_sum: AtomicU64,
    pub send_latency_count: AtomicU64,

    // Poll metrics
    pub polls: AtomicU64,
    pub messages_polled: AtomicU64,
    pub poll_errors: AtomicU64,
}

impl ClientMetrics {
    /// Record one dispatcher tick and how many requests it drained
    pub fn record_tick(&self, drained: usize) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.requests_drained
            .fetch_add(drained as u64, Ordering::Relaxed);
    }

    /// Record requests dropped from the channel at shutdown
    pub fn record_discarded(&self, count: usize) {
        self.requests_discarded
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Record a successful send of one request or batch
    pub fn record_send(&self, message_count: usize, latency: Duration) {
        self.batches_sent.fetch_add(1, Ordering::Relaxed);
        self.messages_sent
            .fetch_add(message_count as u64, Ordering::Relaxed);
        self.send_latency_sum
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
        self.send_latency_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_send_error(&self) {
        self.send_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_poll(&self, message_count: usize) {
        self.polls.fetch_add(1, Ordering::Relaxed);
        self.messages_polled
            .fetch_add(message_count as u64, Ordering::Relaxed);
    }

    pub fn record_poll_error(&self) {
        self.poll_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Average send latency in microseconds
    pub fn average_send_latency_us(&self) -> f64 {
        let sum = self.send_latency_sum.load(Ordering::Relaxed);
        let count = self.send_latency_count.load(Ordering::Relaxed);

        if count == 0 {
            0.0
        } else {
            sum as f64 / count as f64
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            requests_drained: self.requests_drained.load(Ordering::Relaxed),
            requests_discarded: self.requests_discarded.load(Ordering::Relaxed),
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            average_send_latency_us: self.average_send_latency_us(),
            polls: self.polls.load(Ordering::Relaxed),
            messages_polled: self.messages_polled.load(Ordering::Relaxed),
            poll_errors: self.poll_errors.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub ticks: u64,
    pub requests_drained: u64,
    pub requests_discarded: u64,
    pub batches_sent: u64,
    pub messages_sent: u64,
    pub send_errors: u64,
    pub average_send_latency_us: f64,
    pub polls: u64,
    pub messages_polled: u64,
    pub poll_errors: u64,
}

/// Timing helper for measuring operation latency
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(self) -> Duration {
        self.start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_counters() {
        let metrics = ClientMetrics::default();
        metrics.record_send(1000, Duration::from_micros(300));
        metrics.record_send(200, Duration::from_micros(100));
        metrics.record_send_error();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.batches_sent, 2);
        assert_eq!(snapshot.messages_sent, 1200);
        assert_eq!(snapshot.send_errors, 1);
        assert_eq!(snapshot.average_send_latency_us, 200.0);
    }

    #[test]
    fn test_tick_counters() {
        let metrics = ClientMetrics::default();
        metrics.record_tick(3);
        metrics.record_tick(0);
        metrics.record_discarded(2);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.ticks, 2);
        assert_eq!(snapshot.requests_drained, 3);
        assert_eq!(snapshot.requests_discarded, 2);
        assert_eq!(snapshot.average_send_latency_us, 0.0);
    }
}
