//! Throughput tracking for the processing loop.

use std::time::Instant;

/// Counts processed iterations since construction.
pub struct FrameRateTracker {
    start: Instant,
    last: Instant,
    count: u64,
}

impl FrameRateTracker {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(start: Instant) -> Self {
        Self {
            start,
            last: start,
            count: 0,
        }
    }

    pub fn record_iteration(&mut self) {
        self.record_iteration_at(Instant::now());
    }

    pub fn record_iteration_at(&mut self, now: Instant) {
        self.last = now.max(self.last);
        self.count += 1;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Iterations per second between start and the last recorded iteration.
    /// Returns 0.0 before any elapsed time has been observed.
    pub fn current_fps(&self) -> f64 {
        let elapsed = self.last.duration_since(self.start).as_secs_f64();
        if self.count == 0 || elapsed <= 0.0 {
            return 0.0;
        }
        self.count as f64 / elapsed
    }
}

impl Default for FrameRateTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_empty_tracker() {
        let fps = FrameRateTracker::new();
        assert_eq!(fps.count(), 0);
        assert_eq!(fps.current_fps(), 0.0);
    }

    #[test]
    fn test_no_elapsed_time() {
        let start = Instant::now();
        let mut fps = FrameRateTracker::starting_at(start);
        fps.record_iteration_at(start);
        assert_eq!(fps.count(), 1);
        assert_eq!(fps.current_fps(), 0.0);
    }

    #[test]
    fn test_rate() {
        let start = Instant::now();
        let mut fps = FrameRateTracker::starting_at(start);
        for i in 1..=30 {
            fps.record_iteration_at(start + Duration::from_millis(i * 100));
        }
        assert_eq!(fps.count(), 30);
        assert!((fps.current_fps() - 10.0).abs() < 1e-6, "fps = {}", fps.current_fps());
    }

    #[test]
    fn test_count_and_finite() {
        let mut fps = FrameRateTracker::new();
        for _ in 0..1000 {
            fps.record_iteration();
        }
        assert_eq!(fps.count(), 1000);
        let value = fps.current_fps();
        assert!(value.is_finite() && value >= 0.0, "fps = {value}");
    }
}
