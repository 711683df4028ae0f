//! Prometheus metric sink.

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;
use std::time::Duration;

use crate::metrics::MetricSink;
use crate::state::State;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct BreakerLabels {
    breaker: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct TransitionLabels {
    breaker: String,
    from: String,
    to: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct OutcomeLabels {
    breaker: String,
    outcome: String,
}

/// Exports breaker events to a `prometheus-client` registry.
#[derive(Clone)]
pub struct PrometheusSink {
    transitions: Family<TransitionLabels, Counter>,
    state: Family<BreakerLabels, Gauge>,
    rejections: Family<BreakerLabels, Counter>,
    outcomes: Family<OutcomeLabels, Counter>,
    call_duration: Family<OutcomeLabels, Histogram, fn() -> Histogram>,
}

fn duration_histogram() -> Histogram {
    Histogram::new(exponential_buckets(0.001, 2.0, 16))
}

impl PrometheusSink {
    /// Creates the metrics and registers them under `registry`.
    pub fn new(registry: &mut Registry) -> Self {
        let sink = Self {
            transitions: Family::default(),
            state: Family::default(),
            rejections: Family::default(),
            outcomes: Family::default(),
            call_duration: Family::new_with_constructor(duration_histogram as fn() -> Histogram),
        };

        registry.register(
            "breaker_transitions",
            "State transitions per breaker",
            sink.transitions.clone(),
        );
        registry.register(
            "breaker_state",
            "Current state per breaker (0 closed, 1 open, 2 half-open)",
            sink.state.clone(),
        );
        registry.register(
            "breaker_rejections",
            "Calls refused while open",
            sink.rejections.clone(),
        );
        registry.register(
            "breaker_outcomes",
            "Outcomes reported to the breaker",
            sink.outcomes.clone(),
        );
        registry.register(
            "breaker_call_duration_seconds",
            "Duration of calls made through the breaker",
            sink.call_duration.clone(),
        );

        sink
    }
}

fn outcome(breaker: &str, success: bool) -> OutcomeLabels {
    OutcomeLabels {
        breaker: breaker.to_owned(),
        outcome: if success { "success" } else { "failure" }.to_owned(),
    }
}

impl MetricSink for PrometheusSink {
    fn record_state_transition(&self, breaker: &str, from: State, to: State) {
        self.transitions
            .get_or_create(&TransitionLabels {
                breaker: breaker.to_owned(),
                from: from.as_str().to_owned(),
                to: to.as_str().to_owned(),
            })
            .inc();

        let value = match to {
            State::Closed => 0,
            State::Open => 1,
            State::HalfOpen => 2,
        };
        self.state
            .get_or_create(&BreakerLabels {
                breaker: breaker.to_owned(),
            })
            .set(value);
    }

    fn record_rejection(&self, breaker: &str) {
        self.rejections
            .get_or_create(&BreakerLabels {
                breaker: breaker.to_owned(),
            })
            .inc();
    }

    fn record_outcome(&self, breaker: &str, success: bool) {
        self.outcomes.get_or_create(&outcome(breaker, success)).inc();
    }

    fn record_call(&self, breaker: &str, success: bool, duration: Duration) {
        self.call_duration
            .get_or_create(&outcome(breaker, success))
            .observe(duration.as_secs_f64());
    }
}
