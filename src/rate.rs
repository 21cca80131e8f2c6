//! Frame-Rate Estimator: exponential moving average over draw intervals

use std::time::Instant;

/// Weight kept from the previous estimate on every update
const SMOOTHING: f32 = 0.9;
/// Weight given to the newest instantaneous rate
const SAMPLE_WEIGHT: f32 = 0.1;

/// Smoothed draw rate in frames per second
#[derive(Debug, Clone, Copy)]
pub struct FrameRateEstimator {
    rate: f32,
    last: Instant,
}

impl FrameRateEstimator {
    pub fn new(now: Instant) -> Self {
        Self { rate: 0.0, last: now }
    }

    /// Forget history: rate back to zero, next interval measured from `now`
    pub fn reset(&mut self, now: Instant) {
        self.rate = 0.0;
        self.last = now;
    }

    /// Fold in the interval since the previous call and return the new rate
    ///
    /// A zero (or backwards) interval leaves the rate untouched.
    pub fn update(&mut self, now: Instant) -> f32 {
        let delta = now.saturating_duration_since(self.last).as_secs_f32();
        self.last = now;
        if delta > 0.0 {
            self.rate = self.rate * SMOOTHING + (1.0 / delta) * SAMPLE_WEIGHT;
        }
        self.rate
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_one_second_from_zero() {
        let start = Instant::now();
        let mut fps = FrameRateEstimator::new(start);

        let rate = fps.update(start + Duration::from_secs(1));
        assert!((rate - 0.1).abs() < 1e-6, "got {rate}");
    }

    #[test]
    fn test_zero_interval_keeps_rate() {
        let start = Instant::now();
        let mut fps = FrameRateEstimator::new(start);
        let t1 = start + Duration::from_millis(20);

        let rate = fps.update(t1);
        assert_eq!(fps.update(t1), rate);
    }

    #[test]
    fn test_converges_to_steady_rate() {
        let start = Instant::now();
        let mut fps = FrameRateEstimator::new(start);
        let mut now = start;
        for _ in 0..200 {
            now += Duration::from_millis(16);
            fps.update(now);
        }
        assert!((fps.rate() - 62.5).abs() < 0.5, "got {}", fps.rate());
    }

    #[test]
    fn test_single_spike_is_damped() {
        let start = Instant::now();
        let mut fps = FrameRateEstimator::new(start);
        let mut now = start;
        for _ in 0..200 {
            now += Duration::from_millis(10);
            fps.update(now);
        }
        // One 1µs interval would read as 1,000,000 fps on its own
        now += Duration::from_micros(1);
        let rate = fps.update(now);
        assert!((rate - 100_090.0).abs() < 50.0, "got {rate}");
    }

    #[test]
    fn test_reset_zeroes_rate() {
        let start = Instant::now();
        let mut fps = FrameRateEstimator::new(start);
        fps.update(start + Duration::from_millis(10));
        assert!(fps.rate() > 0.0);

        fps.reset(start + Duration::from_millis(20));
        assert_eq!(fps.rate(), 0.0);
    }
}
