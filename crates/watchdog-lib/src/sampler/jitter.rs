//! Logarithmically distributed sampling delay
//!
//! A uniform draw `u` in `(0.01, 1]` is mapped to
//! `ln(u) / ln(0.01) * randomization_factor`, which concentrates delays
//! near zero with a tail bounded by the factor.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Lower bound of the uniform draw (excluded)
pub const JITTER_FLOOR: f64 = 0.01;

/// Delay in seconds for a given draw. `u` is clamped into `[0.01, 1]` so
/// the logarithm is always defined.
pub fn jittered_delay_secs(u: f64, randomization_factor: f64) -> f64 {
    let u = if u.is_nan() { 1.0 } else { u.clamp(JITTER_FLOOR, 1.0) };
    let factor = randomization_factor.max(0.0);
    (u.ln() / JITTER_FLOOR.ln() * factor).max(0.0)
}

/// Random source for the sampler's inter-sample delay
pub struct JitterScheduler {
    rng: StdRng,
}

impl Default for JitterScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl JitterScheduler {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic scheduler for tests and replays
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Uniform draw in `(0.01, 1]`; zero is never produced
    pub fn draw(&mut self) -> f64 {
        let unit: f64 = self.rng.gen(); // [0, 1)
        1.0 - unit * (1.0 - JITTER_FLOOR)
    }

    /// Next sleep duration for the given randomization factor
    pub fn next_delay(&mut self, randomization_factor: f64) -> Duration {
        let u = self.draw();
        Duration::try_from_secs_f64(jittered_delay_secs(u, randomization_factor))
            .unwrap_or(Duration::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_endpoints() {
        assert_eq!(jittered_delay_secs(1.0, 5.0), 0.0);
        assert!((jittered_delay_secs(0.1, 5.0) - 2.5).abs() < 1e-9);
        assert!((jittered_delay_secs(JITTER_FLOOR, 5.0) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_draws_are_guarded() {
        assert!(jittered_delay_secs(0.0, 5.0).is_finite());
        assert!(jittered_delay_secs(-3.0, 5.0) <= 5.0);
        assert_eq!(jittered_delay_secs(f64::NAN, 5.0), 0.0);
        assert_eq!(jittered_delay_secs(0.5, -1.0), 0.0);
    }

    #[test]
    fn test_draws_stay_in_open_closed_interval() {
        let mut scheduler = JitterScheduler::with_seed(7);
        for _ in 0..10_000 {
            let u = scheduler.draw();
            assert!(u > JITTER_FLOOR && u <= 1.0, "draw {} out of range", u);
        }
    }

    #[test]
    fn test_delays_bounded_by_factor() {
        let mut scheduler = JitterScheduler::with_seed(42);
        let factor = 3.0;
        for _ in 0..10_000 {
            let delay = scheduler.next_delay(factor).as_secs_f64();
            assert!((0.0..factor).contains(&delay), "delay {} out of range", delay);
        }
    }

    #[test]
    fn test_delays_skew_towards_zero() {
        let mut scheduler = JitterScheduler::with_seed(1);
        let factor = 10.0;
        let below_half = (0..10_000)
            .filter(|_| scheduler.next_delay(factor).as_secs_f64() < factor / 2.0)
            .count();
        // P(delay < factor/2) = P(u > 0.1) ~ 0.909
        assert!(below_half > 8_800, "only {} draws below half", below_half);
    }

    #[test]
    fn test_huge_factor_saturates() {
        let mut scheduler = JitterScheduler::with_seed(1);
        let delays: Vec<Duration> = (0..100).map(|_| scheduler.next_delay(1e30)).collect();
        assert!(delays.contains(&Duration::MAX));

        assert!(scheduler.next_delay(f64::INFINITY) >= Duration::ZERO);
    }

    #[test]
    fn test_zero_factor_means_no_delay() {
        let mut scheduler = JitterScheduler::with_seed(3);
        assert_eq!(scheduler.next_delay(0.0), Duration::ZERO);
    }
}
