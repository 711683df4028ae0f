//! Core circuit breaker implementation.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use crate::backoff::Backoff;
use crate::clock::Clock;
use crate::config::{BreakerBuilder, Classifier};
use crate::error::{BreakerError, BreakerResult, Signal, SignalKind, Snapshot};
use crate::hook::HookRegistry;
use crate::metrics::MetricSink;
use crate::policy::FailurePolicy;
use crate::state::{Event, Machine, Phase, State, Step};

/// Inner state of the circuit breaker, shared between handles.
struct BreakerInner<E> {
    name: Arc<str>,
    policy: Box<dyn FailurePolicy>,
    machine: Mutex<Machine>,
    classifier: Classifier<E>,
    metric_sink: Arc<dyn MetricSink>,
    hooks: Arc<HookRegistry>,
    clock: Arc<dyn Clock>,
    process_id: u32,
}

/// A circuit breaker guarding one protected resource.
///
/// Every admission check and outcome report runs under a single lock per
/// breaker, including any transition it causes. The protected operation
/// itself runs outside the lock, between [`Breaker::pre_handle`] and
/// [`Breaker::on_success`] or [`Breaker::on_error`].
///
/// Cloning is cheap and yields another handle to the same breaker.
pub struct Breaker<E>
where
    E: std::error::Error + 'static,
{
    inner: Arc<BreakerInner<E>>,
}

impl<E> Breaker<E>
where
    E: std::error::Error + 'static,
{
    pub(crate) fn new(
        name: String,
        policy: Box<dyn FailurePolicy>,
        backoff: Backoff,
        classifier: Classifier<E>,
        metric_sink: Arc<dyn MetricSink>,
        hooks: Arc<HookRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let machine = Machine::new(backoff, clock.now(), clock.system_time());
        let inner = BreakerInner {
            name: Arc::from(name),
            policy,
            machine: Mutex::new(machine),
            classifier,
            metric_sink,
            hooks,
            clock,
            process_id: std::process::id(),
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    /// Creates a new builder for a breaker called `name`.
    pub fn builder(name: impl Into<String>) -> BreakerBuilder<E> {
        BreakerBuilder::new(name)
    }

    /// The breaker's name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Gets the current state of the circuit breaker.
    pub fn state(&self) -> State {
        self.inner.machine.lock().phase().state()
    }

    /// Failures counted since the breaker last closed or saw a success.
    pub fn fail_counter(&self) -> u32 {
        self.inner.machine.lock().fail_counter()
    }

    /// Open entries since the breaker last closed.
    pub fn try_counter(&self) -> u32 {
        self.inner.machine.lock().try_counter()
    }

    /// Centre of the next recovery interval.
    pub fn recovery_interval(&self) -> Duration {
        self.inner.machine.lock().backoff().current_interval()
    }

    /// Captures the breaker's current diagnostic context.
    pub fn snapshot(&self) -> Snapshot {
        let machine = self.inner.machine.lock();
        self.snapshot_of(&machine, self.inner.clock.now(), self.inner.clock.system_time())
    }

    /// Returns true if `error` should be reported through [`Breaker::on_error`].
    pub fn is_relevant(&self, error: &E) -> bool {
        self.inner.classifier.is_relevant(error)
    }

    /// Admission check; call before the protected operation.
    ///
    /// Returns the state the call is admitted in. An open breaker whose
    /// recovery deadline has passed moves to half-open and admits the call as
    /// a probe. Otherwise an open breaker refuses with a
    /// [`SignalKind::Rejected`] signal and the operation must not run.
    pub fn pre_handle(&self) -> Result<State, Signal> {
        let (step, snapshot) = self.apply(Event::Admit);
        self.publish(Event::Admit, &step, &snapshot);

        match step.signal {
            Some(kind) => Err(Signal::new(kind, snapshot)),
            None => Ok(step.to),
        }
    }

    /// Reports that the protected operation succeeded.
    ///
    /// From half-open this returns [`SignalKind::Closed`] when the breaker
    /// recovered, or [`SignalKind::StillHalfOpen`] when the policy still
    /// considers the window unhealthy. Both are informational.
    pub fn on_success(&self) -> Result<(), Signal> {
        self.report(Event::Success)
    }

    /// Reports a breaker-relevant failure of the protected operation.
    ///
    /// Returns [`SignalKind::Tripped`] when a closed breaker opened, or
    /// [`SignalKind::Reopened`] when a half-open probe failed.
    pub fn on_error(&self) -> Result<(), Signal> {
        self.report(Event::Failure)
    }

    /// Executes a function wrapped by the circuit breaker.
    ///
    /// Errors the classifier does not consider breaker-relevant come back as
    /// [`BreakerError::Operation`] without being reported.
    pub fn call<F, T>(&self, f: F) -> BreakerResult<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        self.pre_handle().map_err(BreakerError::Open)?;

        let start = Instant::now();
        let result = f();
        let duration = start.elapsed();

        self.settle(result, duration)
    }

    /// Forces the circuit breaker to the open state.
    ///
    /// Counts as an Open entry: the try counter grows and a new recovery
    /// deadline is drawn. Returns false if already open.
    pub fn force_open(&self) -> bool {
        self.force(|machine, now, wall| machine.force_open(now, wall))
    }

    /// Forces the circuit breaker to the closed state.
    ///
    /// Resets the counters and the backoff growth. Returns false if already
    /// closed.
    pub fn force_closed(&self) -> bool {
        self.force(|machine, now, wall| machine.force_closed(now, wall))
    }

    /// Puts the recovery interval back to its base value.
    pub fn reset_backoff(&self) {
        self.inner.machine.lock().backoff_mut().reset();
    }

    fn report(&self, event: Event) -> Result<(), Signal> {
        let (step, snapshot) = self.apply(event);
        self.publish(event, &step, &snapshot);

        match step.signal {
            Some(kind) => Err(Signal::new(kind, snapshot)),
            None => Ok(()),
        }
    }

    fn settle<T>(&self, result: Result<T, E>, duration: Duration) -> BreakerResult<T, E> {
        let sink = &self.inner.metric_sink;

        match result {
            Ok(value) => {
                sink.record_call(&self.inner.name, true, duration);
                // Closed and StillHalfOpen only inform; the value stands.
                let _ = self.on_success();
                Ok(value)
            }
            Err(error) if self.is_relevant(&error) => {
                sink.record_call(&self.inner.name, false, duration);
                match self.on_error() {
                    Ok(()) => Err(BreakerError::Operation(error)),
                    Err(signal) => Err(BreakerError::Tripped { signal, error }),
                }
            }
            Err(error) => Err(BreakerError::Operation(error)),
        }
    }

    fn apply(&self, event: Event) -> (Step, Snapshot) {
        let mut machine = self.inner.machine.lock();
        let now = self.inner.clock.now();
        let wall = self.inner.clock.system_time();

        let step = machine.apply(event, self.inner.policy.as_ref(), now, wall);
        let snapshot = self.snapshot_of(&machine, now, wall);
        (step, snapshot)
    }

    fn force<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut Machine, Instant, SystemTime) -> bool,
    {
        let (step, snapshot) = {
            let mut machine = self.inner.machine.lock();
            let now = self.inner.clock.now();
            let wall = self.inner.clock.system_time();

            let from = machine.phase().state();
            if !f(&mut *machine, now, wall) {
                return false;
            }
            let step = Step {
                from,
                to: machine.phase().state(),
                signal: None,
            };
            (step, self.snapshot_of(&machine, now, wall))
        };

        self.publish_transition(&step, &snapshot);
        true
    }

    fn snapshot_of(&self, machine: &Machine, now: Instant, wall: SystemTime) -> Snapshot {
        let recovery_deadline = match machine.phase() {
            Phase::Open { deadline } => Some(wall + deadline.saturating_duration_since(now)),
            _ => None,
        };

        Snapshot {
            name: Arc::clone(&self.inner.name),
            state: machine.phase().state(),
            fail_counter: machine.fail_counter(),
            try_counter: machine.try_counter(),
            process_id: self.inner.process_id,
            last_transition: machine.last_transition().1,
            window: machine.window().snapshot(),
            threshold: self.inner.policy.threshold(),
            recovery_deadline,
        }
    }

    // Runs outside the lock.
    fn publish(&self, event: Event, step: &Step, snapshot: &Snapshot) {
        let name = &self.inner.name;
        let sink = &self.inner.metric_sink;
        let hooks = &self.inner.hooks;

        match event {
            Event::Admit => {}
            Event::Success => {
                sink.record_outcome(name, true);
                hooks.execute_success_hook(snapshot);
            }
            Event::Failure => {
                sink.record_outcome(name, false);
                hooks.execute_failure_hook(snapshot);
            }
        }

        match step.signal {
            Some(SignalKind::Rejected) => {
                tracing::debug!(
                    breaker = %name,
                    try_counter = snapshot.try_counter,
                    "circuit breaker open, call rejected"
                );
                sink.record_rejection(name);
                hooks.execute_reject_hook(snapshot);
            }
            Some(SignalKind::StillHalfOpen) => {
                tracing::debug!(
                    breaker = %name,
                    successes = snapshot.window.iter().filter(|s| **s).count(),
                    "probe succeeded but recent outcomes are still unhealthy"
                );
            }
            _ => {}
        }

        if step.transitioned() {
            self.publish_transition(step, snapshot);
        }
    }

    fn publish_transition(&self, step: &Step, snapshot: &Snapshot) {
        let name = &self.inner.name;

        match step.to {
            State::Open => tracing::warn!(
                breaker = %name,
                from = %step.from,
                fail_counter = snapshot.fail_counter,
                try_counter = snapshot.try_counter,
                "circuit breaker opened"
            ),
            State::HalfOpen => tracing::info!(
                breaker = %name,
                try_counter = snapshot.try_counter,
                "circuit breaker half-open, probing recovery"
            ),
            State::Closed => tracing::info!(
                breaker = %name,
                from = %step.from,
                "circuit breaker closed"
            ),
        }

        self.inner
            .metric_sink
            .record_state_transition(name, step.from, step.to);
        self.inner
            .hooks
            .execute_state_transition_hook(step.to, snapshot);
    }
}

// Allow cloning of circuit breakers - cheap because inner state is Arc'd
impl<E> Clone for Breaker<E>
where
    E: std::error::Error + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E> fmt::Debug for Breaker<E>
where
    E: std::error::Error + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Breaker")
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// Implement Async support when the feature is enabled
#[cfg(feature = "async")]
impl<E> Breaker<E>
where
    E: std::error::Error + 'static,
{
    /// Executes an async function wrapped by the circuit breaker.
    ///
    /// The breaker's lock is never held across the await.
    pub async fn call_async<F, Fut, T>(&self, f: F) -> BreakerResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        self.pre_handle().map_err(BreakerError::Open)?;

        let start = Instant::now();
        let result = f().await;
        let duration = start.elapsed();

        self.settle(result, duration)
    }
}
