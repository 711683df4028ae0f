//! Configuration for circuit breakers.

use ahash::AHashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::backoff::{Backoff, DEFAULT_GROWTH_FACTOR, DEFAULT_JITTER};
use crate::breaker::Breaker;
use crate::clock::{Clock, SystemClock};
use crate::error::ConfigError;
use crate::hook::HookRegistry;
use crate::metrics::{MetricSink, NullMetricSink};
use crate::policy::{CountPolicy, FailurePolicy, PercentPolicy, PolicyKind};

/// Decides which operation errors count against the breaker.
///
/// Errors the classifier rejects are handed back to the caller untouched and
/// never reported to the breaker.
pub struct Classifier<E> {
    predicate: Arc<dyn Fn(&E) -> bool + Send + Sync + 'static>,
}

impl<E> Clone for Classifier<E> {
    fn clone(&self) -> Self {
        Self {
            predicate: Arc::clone(&self.predicate),
        }
    }
}

impl<E> fmt::Debug for Classifier<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Classifier").finish_non_exhaustive()
    }
}

impl<E: 'static> Classifier<E> {
    /// Every error is breaker-relevant.
    pub fn all() -> Self {
        Self::predicate(|_| true)
    }

    /// Errors matching `f` are breaker-relevant.
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(f),
        }
    }

    /// Errors whose kind, as reported by `kind_of`, is in `kinds` are
    /// breaker-relevant.
    pub fn kinds<I, S, K>(kinds: I, kind_of: K) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        K: Fn(&E) -> &str + Send + Sync + 'static,
    {
        let kinds: AHashSet<String> = kinds.into_iter().map(Into::into).collect();
        Self::predicate(move |error| kinds.contains(kind_of(error)))
    }

    /// Returns true if `error` should be reported to the breaker.
    pub fn is_relevant(&self, error: &E) -> bool {
        (self.predicate)(error)
    }
}

/// Builder for creating circuit breakers with custom configurations.
pub struct BreakerBuilder<E>
where
    E: std::error::Error + 'static,
{
    name: String,
    threshold: f64,
    policy_kind: PolicyKind,
    custom_policy: Option<Box<dyn FailurePolicy>>,
    timeout: Duration,
    backoff_cap: Duration,
    growth_factor: f64,
    jitter: f64,
    all_errors: bool,
    classifier: Option<Classifier<E>>,
    metric_sink: Arc<dyn MetricSink>,
    hook_registry: Arc<HookRegistry>,
    clock: Arc<dyn Clock>,
}

impl<E> BreakerBuilder<E>
where
    E: std::error::Error + 'static,
{
    /// Creates a new builder with default settings.
    ///
    /// Defaults: count policy with threshold 5, 30 second timeout, no backoff
    /// growth, jitter 0.5, every error breaker-relevant.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            threshold: 5.0,
            policy_kind: PolicyKind::Count,
            custom_policy: None,
            timeout: Duration::from_secs(30),
            backoff_cap: Duration::ZERO,
            growth_factor: DEFAULT_GROWTH_FACTOR,
            jitter: DEFAULT_JITTER,
            all_errors: false,
            classifier: None,
            metric_sink: Arc::new(NullMetricSink),
            hook_registry: Arc::new(HookRegistry::new()),
            clock: Arc::new(SystemClock),
        }
    }

    /// Name the breaker will be registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sets the trip threshold; its meaning depends on the policy.
    ///
    /// For [`PolicyKind::Count`] it is the number of failures that trips the
    /// breaker. For [`PolicyKind::Percent`] it is the fraction of the recent
    /// outcomes that must have succeeded.
    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Selects the built-in policy the threshold configures.
    pub fn policy(mut self, kind: PolicyKind) -> Self {
        self.policy_kind = kind;
        self
    }

    /// Uses a custom policy; the threshold is then ignored.
    pub fn custom_policy<P: FailurePolicy>(mut self, policy: P) -> Self {
        self.custom_policy = Some(Box::new(policy));
        self
    }

    /// Sets the base recovery interval.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the upper bound for the recovery interval.
    ///
    /// Zero keeps the interval fixed at the timeout.
    pub fn backoff_cap(mut self, cap: Duration) -> Self {
        self.backoff_cap = cap;
        self
    }

    /// Sets how much the recovery interval grows per Open entry.
    pub fn growth_factor(mut self, factor: f64) -> Self {
        self.growth_factor = factor;
        self
    }

    /// Sets the jitter factor, clamped to `[0, 1]`.
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    /// Treats every error as breaker-relevant, whatever the classifier says.
    pub fn all_errors(mut self, all: bool) -> Self {
        self.all_errors = all;
        self
    }

    /// Only errors whose kind is listed count against the breaker.
    pub fn exception_kinds<I, S, K>(self, kinds: I, kind_of: K) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        K: Fn(&E) -> &str + Send + Sync + 'static,
    {
        self.classifier(Classifier::kinds(kinds, kind_of))
    }

    /// Only errors matching `predicate` count against the breaker.
    pub fn trip_on<F>(self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.classifier(Classifier::predicate(predicate))
    }

    /// Sets the error classifier.
    pub fn classifier(mut self, classifier: Classifier<E>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Sets a metric sink for the circuit breaker.
    pub fn metric_sink<M: MetricSink>(mut self, sink: M) -> Self {
        self.metric_sink = Arc::new(sink);
        self
    }

    /// Sets a hook registry for the circuit breaker.
    pub fn hooks(mut self, hooks: HookRegistry) -> Self {
        self.hook_registry = Arc::new(hooks);
        self
    }

    /// Shares a hook registry between several breakers.
    pub fn shared_hooks(mut self, hooks: Arc<HookRegistry>) -> Self {
        self.hook_registry = hooks;
        self
    }

    /// Sets the time source.
    pub fn clock<C: Clock>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Validates the configuration and builds the breaker.
    pub fn build(self) -> Result<Breaker<E>, ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if !self.growth_factor.is_finite() || self.growth_factor < 1.0 {
            return Err(ConfigError::InvalidGrowthFactor(self.growth_factor));
        }
        if !self.backoff_cap.is_zero() && self.backoff_cap < self.timeout {
            return Err(ConfigError::CapBelowTimeout {
                cap: self.backoff_cap,
                timeout: self.timeout,
            });
        }

        let policy = match self.custom_policy {
            Some(policy) => policy,
            None => build_policy(self.policy_kind, self.threshold)?,
        };

        let classifier = match (self.all_errors, self.classifier) {
            (false, Some(classifier)) => classifier,
            _ => Classifier::all(),
        };

        let backoff = Backoff::new(
            self.timeout,
            self.backoff_cap,
            self.growth_factor,
            self.jitter,
        );

        Ok(Breaker::new(
            self.name,
            policy,
            backoff,
            classifier,
            self.metric_sink,
            self.hook_registry,
            self.clock,
        ))
    }
}

fn build_policy(kind: PolicyKind, threshold: f64) -> Result<Box<dyn FailurePolicy>, ConfigError> {
    let invalid = ConfigError::InvalidThreshold {
        policy: kind,
        value: threshold,
    };

    match kind {
        PolicyKind::Count => {
            let whole = threshold.is_finite() && threshold.fract() == 0.0;
            if !whole || threshold < 1.0 || threshold > f64::from(u32::MAX) {
                return Err(invalid);
            }
            Ok(Box::new(CountPolicy::new(threshold as u32)))
        }
        PolicyKind::Percent => match PercentPolicy::from_fraction(threshold) {
            Some(policy) => Ok(Box::new(policy)),
            None => Err(invalid),
        },
    }
}
