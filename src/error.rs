//! Error and signal types for the circuit breaker library.

use smallvec::SmallVec;
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::metrics::WINDOW_SIZE;
use crate::policy::PolicyKind;
use crate::state::State;

/// Result type for calls made through a circuit breaker.
pub type BreakerResult<T, E> = Result<T, BreakerError<E>>;

/// Diagnostic context captured when a signal is raised.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Breaker name.
    pub name: Arc<str>,
    /// State after the event was handled.
    pub state: State,
    /// Failure counter.
    pub fail_counter: u32,
    /// Probe attempt counter.
    pub try_counter: u32,
    /// Identifier of the current process.
    pub process_id: u32,
    /// Wall-clock time of the last state transition.
    pub last_transition: SystemTime,
    /// Recent outcomes, oldest first; `true` is a success.
    pub window: SmallVec<[bool; WINDOW_SIZE]>,
    /// Threshold of the active policy.
    pub threshold: f64,
    /// Earliest wall-clock time a probe is let through, while open.
    pub recovery_deadline: Option<SystemTime>,
}

impl Snapshot {
    /// Time left until the recovery deadline, measured from `now`.
    pub fn retry_after(&self, now: SystemTime) -> Option<Duration> {
        self.recovery_deadline
            .map(|deadline| deadline.duration_since(now).unwrap_or_default())
    }
}

impl Display for Snapshot {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "name={} state={} fail_counter={} try_counter={} threshold={} pid={} window=[",
            self.name,
            self.state,
            self.fail_counter,
            self.try_counter,
            self.threshold,
            self.process_id
        )?;
        for outcome in &self.window {
            f.write_str(if *outcome { "1" } else { "0" })?;
        }
        f.write_str("]")?;
        if let Some(wait) = self.retry_after(SystemTime::now()) {
            write!(f, " retry_after={:.2}s", wait.as_secs_f64())?;
        }
        Ok(())
    }
}

/// What a [`Signal`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    /// The breaker is open and the call was not admitted.
    Rejected,

    /// A failure in the closed state tripped the breaker open.
    Tripped,

    /// A half-open probe failed and the breaker opened again.
    Reopened,

    /// A half-open probe succeeded and the breaker closed.
    Closed,

    /// A half-open probe succeeded but the window still looks unhealthy.
    StillHalfOpen,
}

impl SignalKind {
    /// True for the signals that mean the breaker is now open.
    pub fn is_open(self) -> bool {
        matches!(
            self,
            SignalKind::Rejected | SignalKind::Tripped | SignalKind::Reopened
        )
    }
}

impl Display for SignalKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SignalKind::Rejected => write!(f, "breaker open, call rejected"),
            SignalKind::Tripped => write!(f, "breaker opened"),
            SignalKind::Reopened => write!(f, "breaker reopened"),
            SignalKind::Closed => write!(f, "breaker closed"),
            SignalKind::StillHalfOpen => write!(f, "breaker still half-open"),
        }
    }
}

/// A state-related signal raised to the caller.
///
/// Not every signal is a failure: [`SignalKind::Closed`] reports a
/// successful recovery.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    kind: SignalKind,
    snapshot: Box<Snapshot>,
}

impl Signal {
    pub(crate) fn new(kind: SignalKind, snapshot: Snapshot) -> Self {
        Self {
            kind,
            snapshot: Box::new(snapshot),
        }
    }

    /// What happened.
    pub fn kind(&self) -> SignalKind {
        self.kind
    }

    /// Breaker state and counters when the signal was raised.
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// True if the breaker is open after this signal.
    pub fn is_open(&self) -> bool {
        self.kind.is_open()
    }
}

impl Display for Signal {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.kind, self.snapshot)
    }
}

impl Error for Signal {}

/// Error type for calls made through a circuit breaker.
#[derive(Debug)]
pub enum BreakerError<E> {
    /// The circuit is open, the operation was not run.
    Open(Signal),

    /// The operation failed and the failure opened the circuit.
    Tripped {
        /// The open signal.
        signal: Signal,
        /// The operation's error.
        error: E,
    },

    /// The underlying operation failed.
    Operation(E),
}

impl<E> BreakerError<E> {
    /// The breaker signal, if any.
    pub fn signal(&self) -> Option<&Signal> {
        match self {
            BreakerError::Open(signal) | BreakerError::Tripped { signal, .. } => Some(signal),
            BreakerError::Operation(_) => None,
        }
    }

    /// The operation's error, if the operation ran.
    pub fn into_inner(self) -> Option<E> {
        match self {
            BreakerError::Open(_) => None,
            BreakerError::Tripped { error, .. } | BreakerError::Operation(error) => Some(error),
        }
    }
}

impl<E> Display for BreakerError<E>
where
    E: Display,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BreakerError::Open(signal) => write!(f, "Circuit breaker is open: {}", signal),
            BreakerError::Tripped { signal, error } => {
                write!(f, "Operation error: {}; {}", error, signal)
            }
            BreakerError::Operation(e) => write!(f, "Operation error: {}", e),
        }
    }
}

impl<E: Error + 'static> Error for BreakerError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BreakerError::Open(signal) => Some(signal),
            BreakerError::Tripped { error, .. } => Some(error),
            BreakerError::Operation(e) => Some(e),
        }
    }
}

/// Invalid breaker configuration, reported at construction.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// The breaker name is empty.
    EmptyName,

    /// The threshold is not valid for the selected policy.
    InvalidThreshold {
        /// Selected policy.
        policy: PolicyKind,
        /// Rejected value.
        value: f64,
    },

    /// A non-zero backoff cap is below the base timeout.
    CapBelowTimeout {
        /// Configured cap.
        cap: Duration,
        /// Configured timeout.
        timeout: Duration,
    },

    /// The growth factor is below 1 or not finite.
    InvalidGrowthFactor(f64),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::EmptyName => write!(f, "breaker name must not be empty"),
            ConfigError::InvalidThreshold { policy, value } => match policy {
                PolicyKind::Count => {
                    write!(f, "count threshold must be a whole number >= 1, got {}", value)
                }
                PolicyKind::Percent => {
                    write!(f, "percent threshold must be within [0, 1], got {}", value)
                }
            },
            ConfigError::CapBelowTimeout { cap, timeout } => write!(
                f,
                "backoff cap {:?} is below the recovery timeout {:?}",
                cap, timeout
            ),
            ConfigError::InvalidGrowthFactor(factor) => {
                write!(f, "growth factor must be finite and >= 1, got {}", factor)
            }
        }
    }
}

impl Error for ConfigError {}
