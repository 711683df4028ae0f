//! Policies deciding when a closed breaker trips.

use crate::metrics::{OutcomeWindow, WINDOW_SIZE};

/// Decides whether the breaker has reached its melting point.
///
/// Policies only read the values they are given; the breaker serializes
/// every call.
pub trait FailurePolicy: Send + Sync + 'static {
    /// Returns true when the breaker should open.
    fn is_melting_point(&self, fail_counter: u32, window: &OutcomeWindow) -> bool;

    /// The configured threshold, for diagnostics.
    fn threshold(&self) -> f64;
}

/// Selects which built-in policy a numeric threshold configures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolicyKind {
    /// Trip after an absolute number of failures.
    #[default]
    Count,

    /// Trip when too few of the recent outcomes succeeded.
    Percent,
}

/// Trips once the failure counter reaches `max_failures`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountPolicy {
    max_failures: u32,
}

impl CountPolicy {
    /// Creates a count policy.
    pub fn new(max_failures: u32) -> Self {
        Self { max_failures }
    }

    /// Failures needed to trip.
    pub fn max_failures(&self) -> u32 {
        self.max_failures
    }
}

impl FailurePolicy for CountPolicy {
    fn is_melting_point(&self, fail_counter: u32, _window: &OutcomeWindow) -> bool {
        fail_counter >= self.max_failures
    }

    fn threshold(&self) -> f64 {
        f64::from(self.max_failures)
    }
}

/// Sliding-window policy over the last [`WINDOW_SIZE`] outcomes.
///
/// Trips when the newest entry is a failure and
/// `successes <= len - min_successes`. Only a failure can trip, so a run of
/// successes never flaps the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PercentPolicy {
    min_successes: u32,
}

impl PercentPolicy {
    /// Creates a policy requiring `min_successes` of the last
    /// [`WINDOW_SIZE`] outcomes.
    pub fn new(min_successes: u32) -> Self {
        Self { min_successes }
    }

    /// Creates a policy from a success fraction in `[0, 1]`.
    ///
    /// Returns `None` if the fraction is out of range.
    pub fn from_fraction(fraction: f64) -> Option<Self> {
        if !(0.0..=1.0).contains(&fraction) {
            return None;
        }
        let min_successes = (fraction * WINDOW_SIZE as f64).round() as u32;
        Some(Self::new(min_successes))
    }

    /// Successes required within the window.
    pub fn min_successes(&self) -> u32 {
        self.min_successes
    }
}

impl FailurePolicy for PercentPolicy {
    fn is_melting_point(&self, _fail_counter: u32, window: &OutcomeWindow) -> bool {
        if window.is_empty() {
            return false;
        }
        if window.last() != Some(false) {
            return false;
        }

        let allowed = window.len().saturating_sub(self.min_successes as usize);
        window.successes() <= allowed
    }

    fn threshold(&self) -> f64 {
        f64::from(self.min_successes)
    }
}
