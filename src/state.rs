//! Circuit breaker state machine implementation.

use std::fmt::{self, Display, Formatter};
use std::time::{Instant, SystemTime};

use crate::backoff::Backoff;
use crate::error::SignalKind;
use crate::metrics::OutcomeWindow;
use crate::policy::FailurePolicy;

/// Represents the possible states of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Circuit is closed and operations are allowed.
    Closed,

    /// Circuit is open and operations are rejected.
    Open,

    /// Circuit is letting probes through to test recovery.
    HalfOpen,
}

impl State {
    /// Lowercase name used in logs, metrics and diagnostics.
    pub fn as_str(self) -> &'static str {
        match self {
            State::Closed => "closed",
            State::Open => "open",
            State::HalfOpen => "half_open",
        }
    }
}

impl Display for State {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The active state with its per-state data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Closed,
    Open { deadline: Instant },
    HalfOpen,
}

impl Phase {
    pub(crate) fn state(self) -> State {
        match self {
            Phase::Closed => State::Closed,
            Phase::Open { .. } => State::Open,
            Phase::HalfOpen => State::HalfOpen,
        }
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Event {
    /// Admission check before the protected call.
    Admit,
    /// The protected call succeeded.
    Success,
    /// The protected call failed in a breaker-relevant way.
    Failure,
}

/// Result of applying one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Step {
    pub(crate) from: State,
    pub(crate) to: State,
    pub(crate) signal: Option<SignalKind>,
}

impl Step {
    pub(crate) fn transitioned(&self) -> bool {
        self.from != self.to
    }
}

/// Counters, history and state of one breaker.
///
/// Not synchronized; the breaker keeps it behind its lock.
#[derive(Debug)]
pub(crate) struct Machine {
    phase: Phase,
    fail_counter: u32,
    try_counter: u32,
    window: OutcomeWindow,
    backoff: Backoff,
    last_transition: Instant,
    last_transition_wall: SystemTime,
}

impl Machine {
    pub(crate) fn new(backoff: Backoff, now: Instant, wall: SystemTime) -> Self {
        Self {
            phase: Phase::Closed,
            fail_counter: 0,
            try_counter: 0,
            window: OutcomeWindow::new(),
            backoff,
            last_transition: now,
            last_transition_wall: wall,
        }
    }

    pub(crate) fn phase(&self) -> Phase {
        self.phase
    }

    pub(crate) fn fail_counter(&self) -> u32 {
        self.fail_counter
    }

    pub(crate) fn try_counter(&self) -> u32 {
        self.try_counter
    }

    pub(crate) fn window(&self) -> &OutcomeWindow {
        &self.window
    }

    pub(crate) fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    pub(crate) fn backoff_mut(&mut self) -> &mut Backoff {
        &mut self.backoff
    }

    pub(crate) fn last_transition(&self) -> (Instant, SystemTime) {
        (self.last_transition, self.last_transition_wall)
    }

    /// Applies `event` and returns the transition it caused, if any.
    pub(crate) fn apply(
        &mut self,
        event: Event,
        policy: &dyn FailurePolicy,
        now: Instant,
        wall: SystemTime,
    ) -> Step {
        let from = self.phase.state();

        let signal = match (self.phase, event) {
            (Phase::Closed, Event::Admit) | (Phase::HalfOpen, Event::Admit) => None,

            (Phase::Open { deadline }, Event::Admit) => {
                if now > deadline {
                    self.enter(Phase::HalfOpen, now, wall);
                    None
                } else {
                    Some(SignalKind::Rejected)
                }
            }

            (Phase::Closed, Event::Success) => {
                self.fail_counter = 0;
                self.window.push(true);
                None
            }

            (Phase::Closed, Event::Failure) => {
                self.window.push(false);
                self.fail_counter = self.fail_counter.saturating_add(1);
                if policy.is_melting_point(self.fail_counter, &self.window) {
                    self.enter_open(now, wall);
                    Some(SignalKind::Tripped)
                } else {
                    None
                }
            }

            // The operation never runs while open.
            (Phase::Open { .. }, Event::Success) | (Phase::Open { .. }, Event::Failure) => None,

            (Phase::HalfOpen, Event::Success) => {
                self.window.push(true);
                self.fail_counter = 0;
                if policy.is_melting_point(self.fail_counter, &self.window) {
                    Some(SignalKind::StillHalfOpen)
                } else {
                    self.enter_closed(now, wall);
                    Some(SignalKind::Closed)
                }
            }

            (Phase::HalfOpen, Event::Failure) => {
                self.fail_counter = self.fail_counter.saturating_add(1);
                self.window.push(false);
                self.enter_open(now, wall);
                Some(SignalKind::Reopened)
            }
        };

        Step {
            from,
            to: self.phase.state(),
            signal,
        }
    }

    /// Opens from any state. Returns false if already open.
    pub(crate) fn force_open(&mut self, now: Instant, wall: SystemTime) -> bool {
        if matches!(self.phase, Phase::Open { .. }) {
            return false;
        }
        self.enter_open(now, wall);
        true
    }

    /// Closes from any state. Returns false if already closed.
    pub(crate) fn force_closed(&mut self, now: Instant, wall: SystemTime) -> bool {
        if self.phase == Phase::Closed {
            return false;
        }
        self.enter_closed(now, wall);
        true
    }

    fn enter_open(&mut self, now: Instant, wall: SystemTime) {
        self.try_counter = self.try_counter.saturating_add(1);
        let deadline = self.backoff.next_deadline(now);
        self.enter(Phase::Open { deadline }, now, wall);
    }

    fn enter_closed(&mut self, now: Instant, wall: SystemTime) {
        self.fail_counter = 0;
        self.try_counter = 0;
        self.backoff.reset();
        self.enter(Phase::Closed, now, wall);
    }

    fn enter(&mut self, phase: Phase, now: Instant, wall: SystemTime) {
        self.phase = phase;
        self.last_transition = now;
        self.last_transition_wall = wall;
    }
}
