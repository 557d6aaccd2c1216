use std::collections::VecDeque;
use std::time::Instant;

/// Samples kept per probe; the oldest is evicted on overflow.
pub const MAX_SAMPLES: usize = 30;

/// One successful round.
#[derive(Debug, Clone, Copy)]
pub struct PingSample {
    pub latency_ms: f64,
    pub observed_at: Instant,
}

/// Rolling latency window plus lifetime attempt/failure counters.
///
/// Counters are monotonic for the probe's lifetime; loss is the raw ratio
/// with no smoothing, so it rises on the first failure and decays as
/// successes accumulate.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    samples: VecDeque<PingSample>,
    capacity: usize,
    attempts: u64,
    failures: u64,
}

impl SampleWindow {
    pub fn new() -> Self {
        Self::with_capacity(MAX_SAMPLES)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            attempts: 0,
            failures: 0,
        }
    }

    pub fn record_success(&mut self, latency_ms: f64, observed_at: Instant) {
        self.attempts += 1;
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(PingSample { latency_ms, observed_at });
    }

    pub fn record_failure(&mut self) {
        self.attempts += 1;
        self.failures += 1;
    }

    /// Latency of the most recent sample.
    pub fn current_ping(&self) -> Option<f64> {
        self.samples.back().map(|s| s.latency_ms)
    }

    /// Arithmetic mean of the window.
    pub fn average_ping(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: f64 = self.samples.iter().map(|s| s.latency_ms).sum();
        Some(sum / self.samples.len() as f64)
    }

    /// Mean absolute delta between consecutive samples, in arrival order.
    pub fn jitter(&self) -> Option<f64> {
        if self.samples.len() < 2 {
            return None;
        }
        let deltas: f64 = self
            .samples
            .iter()
            .zip(self.samples.iter().skip(1))
            .map(|(prev, next)| (next.latency_ms - prev.latency_ms).abs())
            .sum();
        Some(deltas / (self.samples.len() - 1) as f64)
    }

    /// `failures / max(attempts, 1) * 100`, clamped to [0, 100].
    pub fn packet_loss(&self) -> f64 {
        let ratio = self.failures as f64 / self.attempts.max(1) as f64 * 100.0;
        ratio.clamp(0.0, 100.0)
    }

    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl Default for SampleWindow {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window_with(latencies: &[f64]) -> SampleWindow {
        let mut w = SampleWindow::new();
        let now = Instant::now();
        for &l in latencies {
            w.record_success(l, now);
        }
        w
    }

    #[test]
    fn empty_window_reports_nothing() {
        let w = SampleWindow::new();
        assert_eq!(w.current_ping(), None);
        assert_eq!(w.average_ping(), None);
        assert_eq!(w.jitter(), None);
        assert_eq!(w.packet_loss(), 0.0);
    }

    #[test]
    fn jitter_needs_two_samples() {
        let w = window_with(&[12.0]);
        assert_eq!(w.current_ping(), Some(12.0));
        assert_eq!(w.jitter(), None);
    }

    #[test]
    fn jitter_is_order_sensitive() {
        // 10 → 20 → 10: deltas 10, 10
        let a = window_with(&[10.0, 20.0, 10.0]);
        // 10 → 10 → 20: deltas 0, 10
        let b = window_with(&[10.0, 10.0, 20.0]);
        assert_eq!(a.jitter(), Some(10.0));
        assert_eq!(b.jitter(), Some(5.0));
        // same multiset, same mean
        assert_eq!(a.average_ping(), b.average_ping());
    }

    #[test]
    fn window_evicts_oldest() {
        let latencies: Vec<f64> = (0..40).map(f64::from).collect();
        let w = window_with(&latencies);
        assert_eq!(w.len(), MAX_SAMPLES);
        assert_eq!(w.current_ping(), Some(39.0));
        // remaining samples are 10..=39
        assert_eq!(w.average_ping(), Some(24.5));
        assert_eq!(w.attempts(), 40);
    }

    #[test]
    fn loss_is_raw_ratio() {
        let mut w = SampleWindow::new();
        w.record_failure();
        assert_eq!(w.packet_loss(), 100.0);
        w.record_success(5.0, Instant::now());
        assert_eq!(w.packet_loss(), 50.0);
        w.record_success(5.0, Instant::now());
        w.record_success(5.0, Instant::now());
        assert_eq!(w.packet_loss(), 25.0);
    }

    #[test]
    fn loss_stays_in_range_for_any_sequence() {
        let mut w = SampleWindow::with_capacity(4);
        for i in 0..200u32 {
            if i % 3 == 0 || i % 7 == 0 {
                w.record_failure();
            } else {
                w.record_success(f64::from(i), Instant::now());
            }
            let loss = w.packet_loss();
            assert!((0.0..=100.0).contains(&loss));
            let expected = w.failures() as f64 / w.attempts() as f64 * 100.0;
            assert!((loss - expected).abs() < 1e-9);
        }
    }
}
