//! Randomized, capped exponential backoff for recovery probes.

use rand::Rng;
use std::time::{Duration, Instant};

/// Default multiplier applied to the interval after every Open entry.
pub const DEFAULT_GROWTH_FACTOR: f64 = 1.5;

/// Default jitter factor.
pub const DEFAULT_JITTER: f64 = 0.5;

/// Intervals are rounded down to this granularity (two-decimal seconds).
const GRANULARITY_MS: f64 = 10.0;

/// Computes how long an open breaker waits before letting a probe through.
///
/// Each call to [`Backoff::next_deadline`] grows the interval by the growth
/// factor until it reaches the cap. A cap equal to the base interval disables
/// growth entirely.
#[derive(Debug, Clone)]
pub struct Backoff {
    base_ms: f64,
    cap_ms: f64,
    growth_factor: f64,
    jitter: f64,
    current_ms: f64,
}

impl Backoff {
    /// Creates a calculator starting at `base`.
    ///
    /// A zero `cap`, or one below `base`, is raised to `base`. `growth_factor`
    /// below 1 is treated as 1 and `jitter` is clamped to `[0, 1]`.
    pub fn new(base: Duration, cap: Duration, growth_factor: f64, jitter: f64) -> Self {
        let base_ms = base.as_secs_f64() * 1000.0;
        let cap_ms = (cap.as_secs_f64() * 1000.0).max(base_ms);

        Self {
            base_ms,
            cap_ms,
            growth_factor: if growth_factor.is_finite() {
                growth_factor.max(1.0)
            } else {
                1.0
            },
            jitter: if jitter.is_nan() {
                0.0
            } else {
                jitter.clamp(0.0, 1.0)
            },
            current_ms: base_ms,
        }
    }

    /// A fixed interval with no growth and no jitter.
    pub fn fixed(interval: Duration) -> Self {
        Self::new(interval, Duration::ZERO, 1.0, 0.0)
    }

    /// Returns `anchor` plus a jittered interval, then grows the interval.
    pub fn next_deadline(&mut self, anchor: Instant) -> Instant {
        let interval = self.pick_jittered_interval();
        self.grow();
        anchor + interval
    }

    /// Draws the next interval around the current one without advancing it.
    pub fn pick_jittered_interval(&self) -> Duration {
        let mut rng = rand::thread_rng();
        self.interval_from(rng.gen::<f64>(), rng.gen::<f64>())
    }

    /// Puts the interval back to the base.
    pub fn reset(&mut self) {
        self.current_ms = self.base_ms;
    }

    /// Interval the next deadline will be centred on.
    pub fn current_interval(&self) -> Duration {
        Duration::from_secs_f64(self.current_ms / 1000.0)
    }

    /// Base interval.
    pub fn base_interval(&self) -> Duration {
        Duration::from_secs_f64(self.base_ms / 1000.0)
    }

    /// Upper bound on the centre interval.
    pub fn cap(&self) -> Duration {
        Duration::from_secs_f64(self.cap_ms / 1000.0)
    }

    fn grow(&mut self) {
        self.current_ms = (self.current_ms * self.growth_factor).min(self.cap_ms);
    }

    // `spread` picks the jitter width, `pick` the position inside it.
    fn interval_from(&self, spread: f64, pick: f64) -> Duration {
        let delta = self.jitter * spread * self.current_ms;
        let low = self.current_ms - delta;
        let high = self.current_ms + delta;
        let raw = low + pick * (high - low);
        let floored = (raw / GRANULARITY_MS).floor() * GRANULARITY_MS;
        Duration::from_millis(floored.max(0.0) as u64)
    }
}
