//! Wake-to-effect latency tracking for cluster workers.
//!
//! The delay between an accepted input event and the moment the floor is
//! in force is what the user perceives, so every worker run is sampled into
//! a fixed ring buffer. Recording does not allocate.

use std::time::Duration;

/// Wake latencies above this are counted as slow by default.
pub const DEFAULT_SLOW_WAKE: Duration = Duration::from_millis(5);

/// Latency samples with a fixed-size ring buffer.
#[derive(Debug)]
pub struct LatencyMetrics {
    /// Ring buffer of latencies in nanoseconds.
    samples: Box<[u64]>,
    /// Current write position in the ring buffer.
    write_pos: usize,
    /// Number of samples collected (saturates at buffer size).
    sample_count: usize,
    /// Total samples recorded.
    total: u64,
    min_ns: u64,
    max_ns: u64,
    sum_ns: u64,
    /// Samples above `slow_ns`.
    slow_count: u64,
    slow_ns: u64,
}

impl LatencyMetrics {
    /// Create a collector retaining `capacity` samples.
    ///
    /// Samples longer than `slow_threshold` are counted as slow wakes.
    #[must_use]
    pub fn new(capacity: usize, slow_threshold: Duration) -> Self {
        let size = capacity.max(1);
        Self {
            samples: vec![0u64; size].into_boxed_slice(),
            write_pos: 0,
            sample_count: 0,
            total: 0,
            min_ns: u64::MAX,
            max_ns: 0,
            sum_ns: 0,
            slow_count: 0,
            slow_ns: duration_ns(slow_threshold),
        }
    }

    /// Record one wake-to-effect latency.
    pub fn record(&mut self, latency: Duration) {
        let ns = duration_ns(latency);

        self.samples[self.write_pos] = ns;
        self.write_pos = (self.write_pos + 1) % self.samples.len();
        self.sample_count = self.sample_count.saturating_add(1).min(self.samples.len());

        self.total += 1;
        self.min_ns = self.min_ns.min(ns);
        self.max_ns = self.max_ns.max(ns);
        self.sum_ns = self.sum_ns.wrapping_add(ns);

        if ns > self.slow_ns {
            self.slow_count += 1;
        }
    }

    /// Total samples recorded.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Number of samples above the slow threshold.
    #[must_use]
    pub fn slow_count(&self) -> u64 {
        self.slow_count
    }

    /// Smallest recorded latency.
    #[must_use]
    pub fn min(&self) -> Option<Duration> {
        (self.total > 0).then(|| Duration::from_nanos(self.min_ns))
    }

    /// Largest recorded latency.
    #[must_use]
    pub fn max(&self) -> Option<Duration> {
        (self.total > 0).then(|| Duration::from_nanos(self.max_ns))
    }

    /// Mean latency.
    #[must_use]
    pub fn mean(&self) -> Option<Duration> {
        (self.total > 0).then(|| Duration::from_nanos(self.sum_ns / self.total))
    }

    /// Compute a percentile (0.0 to 100.0) over the retained samples.
    ///
    /// Returns `None` without samples or for an out-of-range percentile.
    #[must_use]
    pub fn percentile(&self, percentile: f64) -> Option<Duration> {
        if self.sample_count == 0 || !(0.0..=100.0).contains(&percentile) {
            return None;
        }

        let mut sorted: Vec<u64> = self.samples[..self.sample_count].to_vec();
        sorted.sort_unstable();

        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let idx = ((percentile / 100.0) * (sorted.len() - 1) as f64).round() as usize;
        Some(Duration::from_nanos(sorted[idx.min(sorted.len() - 1)]))
    }

    /// Get a snapshot of current metrics.
    #[must_use]
    pub fn snapshot(&self) -> LatencySnapshot {
        let recorded = self.total > 0;
        LatencySnapshot {
            total: self.total,
            min_ns: recorded.then_some(self.min_ns),
            max_ns: recorded.then_some(self.max_ns),
            mean_ns: recorded.then(|| self.sum_ns / self.total),
            p99_ns: self.percentile(99.0).map(duration_ns),
            slow_count: self.slow_count,
        }
    }
}

/// Immutable snapshot of latency metrics for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct LatencySnapshot {
    /// Total samples recorded.
    pub total: u64,
    /// Minimum latency in nanoseconds.
    pub min_ns: Option<u64>,
    /// Maximum latency in nanoseconds.
    pub max_ns: Option<u64>,
    /// Mean latency in nanoseconds.
    pub mean_ns: Option<u64>,
    /// 99th percentile over the retained window.
    pub p99_ns: Option<u64>,
    /// Samples above the slow threshold.
    pub slow_count: u64,
}

fn duration_ns(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_recording() {
        let mut metrics = LatencyMetrics::new(16, DEFAULT_SLOW_WAKE);
        assert!(metrics.min().is_none());

        metrics.record(Duration::from_micros(80));
        metrics.record(Duration::from_micros(120));
        metrics.record(Duration::from_micros(100));

        assert_eq!(metrics.total(), 3);
        assert_eq!(metrics.min(), Some(Duration::from_micros(80)));
        assert_eq!(metrics.max(), Some(Duration::from_micros(120)));
        assert_eq!(metrics.mean(), Some(Duration::from_micros(100)));
    }

    #[test]
    fn test_slow_wakes_counted() {
        let mut metrics = LatencyMetrics::new(16, Duration::from_millis(1));
        metrics.record(Duration::from_micros(900));
        metrics.record(Duration::from_millis(3));
        metrics.record(Duration::from_millis(2));
        assert_eq!(metrics.slow_count(), 2);
    }

    #[test]
    fn test_percentile() {
        let mut metrics = LatencyMetrics::new(100, DEFAULT_SLOW_WAKE);
        for i in 1..=100 {
            metrics.record(Duration::from_micros(i));
        }
        let p50 = metrics.percentile(50.0).unwrap();
        assert!((49..=51).contains(&p50.as_micros()));
        assert!(metrics.percentile(101.0).is_none());
        assert!(metrics.percentile(f64::NAN).is_none());
    }

    #[test]
    fn test_ring_buffer_wrapping() {
        let mut metrics = LatencyMetrics::new(4, DEFAULT_SLOW_WAKE);
        for i in 0..10 {
            metrics.record(Duration::from_micros(i));
        }
        assert_eq!(metrics.total(), 10);
        // Only the last four samples (6..=9) are retained for percentiles.
        assert_eq!(metrics.percentile(0.0), Some(Duration::from_micros(6)));
        // Min is tracked over every sample.
        assert_eq!(metrics.min(), Some(Duration::ZERO));
    }

    #[test]
    fn test_snapshot() {
        let mut metrics = LatencyMetrics::new(8, DEFAULT_SLOW_WAKE);
        assert_eq!(metrics.snapshot(), LatencySnapshot::default());

        metrics.record(Duration::from_micros(40));
        metrics.record(Duration::from_micros(60));
        let snap = metrics.snapshot();
        assert_eq!(snap.total, 2);
        assert_eq!(snap.min_ns, Some(40_000));
        assert_eq!(snap.max_ns, Some(60_000));
        assert_eq!(snap.mean_ns, Some(50_000));
        assert_eq!(snap.p99_ns, Some(60_000));
    }
}
