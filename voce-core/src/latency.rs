//! # Latency Monitoring
//!
//! A bounded sliding window of per-frame latency measurements (delivery
//! timestamp minus capture timestamp) with percentile summaries. The
//! worker pushes one sample per frame in O(1); sorting happens only when
//! a summary is requested.

use std::collections::VecDeque;
use std::time::Duration;

/// Summary of the current latency window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyStats {
    /// Number of samples in the window.
    pub count: usize,
    pub min: Duration,
    pub max: Duration,
    pub average: Duration,
    pub p50: Duration,
    pub p95: Duration,
    pub p99: Duration,
    /// Host-supplied estimate of the stage past the delivery boundary
    /// (synthesis), if one was registered.
    pub external_estimate: Option<Duration>,
    /// `average + external_estimate`, present only when an estimate was
    /// registered. Kept separate from the measured figure so the two are
    /// never conflated.
    pub estimated_total: Option<Duration>,
}

/// Bounded window of latency samples.
pub struct LatencyMonitor {
    window: VecDeque<Duration>,
    capacity: usize,
    external_estimate: Option<Duration>,
}

impl LatencyMonitor {
    pub fn new(capacity: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            external_estimate: None,
        }
    }

    /// Records one per-frame measurement, evicting the oldest sample
    /// once the window is full.
    pub fn record(&mut self, latency: Duration) {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(latency);
    }

    /// Registers (or clears) the host's estimate for the external
    /// synthesis stage.
    pub fn set_external_estimate(&mut self, estimate: Option<Duration>) {
        self.external_estimate = estimate;
    }

    /// Drops all recorded samples.
    pub fn clear(&mut self) {
        self.window.clear();
    }

    /// Summarizes the window, or `None` when no frame has been measured
    /// yet. An empty window is reported as absent, never as zeros.
    pub fn stats(&self) -> Option<LatencyStats> {
        if self.window.is_empty() {
            return None;
        }

        let mut sorted: Vec<Duration> = self.window.iter().copied().collect();
        sorted.sort_unstable();

        let count = sorted.len();
        let total: Duration = sorted.iter().sum();
        let average = total / count as u32;

        let percentile = |q: f64| -> Duration {
            let idx = ((count - 1) as f64 * q).round() as usize;
            sorted[idx.min(count - 1)]
        };

        let estimated_total = self.external_estimate.map(|ext| average + ext);
        Some(LatencyStats {
            count,
            min: sorted[0],
            max: sorted[count - 1],
            average,
            p50: percentile(0.50),
            p95: percentile(0.95),
            p99: percentile(0.99),
            external_estimate: self.external_estimate,
            estimated_total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_of_known_samples() {
        let mut monitor = LatencyMonitor::new(100);
        for ms in [10u64, 20, 30, 40, 50] {
            monitor.record(Duration::from_millis(ms));
        }
        let stats = monitor.stats().unwrap();
        assert_eq!(stats.count, 5);
        assert_eq!(stats.min, Duration::from_millis(10));
        assert_eq!(stats.max, Duration::from_millis(50));
        assert_eq!(stats.average, Duration::from_millis(30));
        assert_eq!(stats.p50, Duration::from_millis(30));
        assert_eq!(stats.p95, Duration::from_millis(50));
    }

    #[test]
    fn empty_window_reports_no_data() {
        let monitor = LatencyMonitor::new(100);
        assert!(monitor.stats().is_none());
    }

    #[test]
    fn window_is_bounded() {
        let mut monitor = LatencyMonitor::new(3);
        for ms in [100u64, 1, 2, 3] {
            monitor.record(Duration::from_millis(ms));
        }
        let stats = monitor.stats().unwrap();
        assert_eq!(stats.count, 3);
        // The 100 ms outlier was evicted.
        assert_eq!(stats.max, Duration::from_millis(3));
    }

    #[test]
    fn external_estimate_is_reported_separately() {
        let mut monitor = LatencyMonitor::new(10);
        monitor.record(Duration::from_millis(10));
        let stats = monitor.stats().unwrap();
        assert_eq!(stats.external_estimate, None);
        assert_eq!(stats.estimated_total, None);

        monitor.set_external_estimate(Some(Duration::from_millis(5)));
        let stats = monitor.stats().unwrap();
        assert_eq!(stats.average, Duration::from_millis(10));
        assert_eq!(stats.estimated_total, Some(Duration::from_millis(15)));
    }
}
