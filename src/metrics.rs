//! Outcome tracking and metric sinks.

use smallvec::SmallVec;
use std::time::Duration;

use crate::state::State;

/// Number of outcomes kept in the sliding window.
pub const WINDOW_SIZE: usize = 10;

/// Trait for metrics sinks that can receive circuit breaker events.
pub trait MetricSink: Send + Sync + 'static {
    /// Records a state transition event.
    fn record_state_transition(&self, breaker: &str, from: State, to: State);

    /// Records a call refused while the breaker was open.
    fn record_rejection(&self, breaker: &str);

    /// Records an outcome reported to the breaker.
    fn record_outcome(&self, breaker: &str, success: bool);

    /// Records a call made through the call wrapper.
    fn record_call(&self, breaker: &str, success: bool, duration: Duration);
}

/// A null metrics sink that discards all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMetricSink;

impl MetricSink for NullMetricSink {
    fn record_state_transition(&self, _breaker: &str, _from: State, _to: State) {}
    fn record_rejection(&self, _breaker: &str) {}
    fn record_outcome(&self, _breaker: &str, _success: bool) {}
    fn record_call(&self, _breaker: &str, _success: bool, _duration: Duration) {}
}

/// The most recent [`WINDOW_SIZE`] outcomes, oldest evicted first.
///
/// A new window is full of successes so a fresh breaker starts healthy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeWindow {
    slots: [bool; WINDOW_SIZE],
    // Index of the oldest entry; the next push overwrites it.
    head: usize,
}

impl Default for OutcomeWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl OutcomeWindow {
    /// Creates a window of all successes.
    pub fn new() -> Self {
        Self {
            slots: [true; WINDOW_SIZE],
            head: 0,
        }
    }

    /// Builds a window from outcomes listed oldest first.
    ///
    /// Only the last [`WINDOW_SIZE`] entries are kept; missing entries are
    /// successes.
    pub fn from_outcomes<I>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = bool>,
    {
        let mut window = Self::new();
        for outcome in outcomes {
            window.push(outcome);
        }
        window
    }

    /// Appends an outcome, evicting the oldest.
    pub fn push(&mut self, success: bool) {
        self.slots[self.head] = success;
        self.head = (self.head + 1) % WINDOW_SIZE;
    }

    /// Most recent outcome.
    pub fn last(&self) -> Option<bool> {
        let newest = (self.head + WINDOW_SIZE - 1) % WINDOW_SIZE;
        Some(self.slots[newest])
    }

    /// Number of successes in the window.
    pub fn successes(&self) -> usize {
        self.slots.iter().filter(|s| **s).count()
    }

    /// Number of failures in the window.
    pub fn failures(&self) -> usize {
        WINDOW_SIZE - self.successes()
    }

    /// Always [`WINDOW_SIZE`].
    pub fn len(&self) -> usize {
        WINDOW_SIZE
    }

    /// Always false; the window is never empty.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Outcomes from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        self.slots[self.head..]
            .iter()
            .chain(self.slots[..self.head].iter())
            .copied()
    }

    /// Copies the outcomes out, oldest first.
    pub fn snapshot(&self) -> SmallVec<[bool; WINDOW_SIZE]> {
        self.iter().collect()
    }
}
