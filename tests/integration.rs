use fuses::{
    Breaker, BreakerError, Clock, BreakerRegistry, FailurePolicy, HookRegistry, ManualClock,
    OutcomeWindow, PercentPolicy, PolicyKind, SignalKind, State,
};
use proptest::prelude::*;
use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

// Custom error type that implements Error trait
#[derive(Debug, Clone, PartialEq)]
enum TestError {
    Timeout,
    BadRequest,
}

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestError::Timeout => write!(f, "Test error: timeout"),
            TestError::BadRequest => write!(f, "Test error: bad request"),
        }
    }
}

impl Error for TestError {}

fn kind_of(error: &TestError) -> &str {
    match error {
        TestError::Timeout => "Timeout",
        TestError::BadRequest => "BadRequest",
    }
}

fn count_breaker(threshold: u32, clock: &ManualClock) -> Breaker<TestError> {
    Breaker::builder("integration")
        .threshold(f64::from(threshold))
        .timeout(Duration::from_secs(1))
        .jitter(0.0)
        .clock(clock.clone())
        .build()
        .expect("valid config")
}

#[test]
fn test_circuit_breaker_basic_functionality() {
    let clock = ManualClock::new();
    let breaker = count_breaker(2, &clock);

    assert_eq!(breaker.state(), State::Closed);

    let result = breaker.call(|| -> Result<String, TestError> { Ok("success".to_string()) });
    assert_eq!(result.ok().as_deref(), Some("success"));

    let result = breaker.call(|| -> Result<String, TestError> { Err(TestError::Timeout) });
    assert!(matches!(result, Err(BreakerError::Operation(TestError::Timeout))));
    assert_eq!(breaker.state(), State::Closed);

    // Second failure trips
    let result = breaker.call(|| -> Result<String, TestError> { Err(TestError::Timeout) });
    match result {
        Err(BreakerError::Tripped { signal, error }) => {
            assert_eq!(signal.kind(), SignalKind::Tripped);
            assert_eq!(error, TestError::Timeout);
            assert_eq!(signal.snapshot().fail_counter, 2);
            assert_eq!(signal.snapshot().try_counter, 1);
        }
        other => panic!("expected trip, got {:?}", other),
    }
    assert_eq!(breaker.state(), State::Open);

    // Open breaker must not run the operation
    let ran = AtomicUsize::new(0);
    let result = breaker.call(|| -> Result<String, TestError> {
        ran.fetch_add(1, Ordering::SeqCst);
        Ok("success".to_string())
    });
    match result {
        Err(BreakerError::Open(signal)) => assert_eq!(signal.kind(), SignalKind::Rejected),
        other => panic!("expected rejection, got {:?}", other),
    }
    assert_eq!(ran.load(Ordering::SeqCst), 0);

    // Exactly at the deadline is still too early
    clock.advance(Duration::from_secs(1));
    assert!(breaker.pre_handle().is_err());

    clock.advance(Duration::from_millis(1));
    let result = breaker.call(|| -> Result<String, TestError> { Ok("recovered".to_string()) });
    assert!(result.is_ok());
    assert_eq!(breaker.state(), State::Closed);
    assert_eq!(breaker.fail_counter(), 0);
    assert_eq!(breaker.try_counter(), 0);
}

#[test]
fn test_manual_protocol_signals() {
    let clock = ManualClock::new();
    let breaker = count_breaker(1, &clock);

    assert_eq!(breaker.pre_handle().ok(), Some(State::Closed));
    let signal = breaker.on_error().unwrap_err();
    assert_eq!(signal.kind(), SignalKind::Tripped);
    assert!(signal.is_open());

    let signal = breaker.pre_handle().unwrap_err();
    assert_eq!(signal.kind(), SignalKind::Rejected);
    assert!(signal.snapshot().recovery_deadline.is_some());

    clock.advance(Duration::from_millis(1001));
    assert_eq!(breaker.pre_handle().ok(), Some(State::HalfOpen));
    assert_eq!(breaker.state(), State::HalfOpen);

    // Half-open admits without further checks
    assert_eq!(breaker.pre_handle().ok(), Some(State::HalfOpen));

    let signal = breaker.on_success().unwrap_err();
    assert_eq!(signal.kind(), SignalKind::Closed);
    assert!(!signal.is_open());
    assert_eq!(signal.snapshot().state, State::Closed);
}

#[test]
fn test_circuit_breaker_half_open_failure() {
    let clock = ManualClock::new();
    let breaker = count_breaker(1, &clock);

    let _ = breaker.call(|| -> Result<String, TestError> { Err(TestError::Timeout) });
    assert_eq!(breaker.state(), State::Open);
    assert_eq!(breaker.try_counter(), 1);

    clock.advance(Duration::from_millis(1500));

    let result = breaker.call(|| -> Result<String, TestError> { Err(TestError::Timeout) });
    match result {
        Err(BreakerError::Tripped { signal, .. }) => {
            assert_eq!(signal.kind(), SignalKind::Reopened)
        }
        other => panic!("expected reopen, got {:?}", other),
    }
    assert_eq!(breaker.state(), State::Open);
    assert_eq!(breaker.try_counter(), 2);
}

#[test]
fn test_backoff_grows_and_resets_on_close() {
    let clock = ManualClock::new();
    let breaker: Breaker<TestError> = Breaker::builder("backoff")
        .threshold(1.0)
        .timeout(Duration::from_secs(1))
        .backoff_cap(Duration::from_secs(4))
        .growth_factor(2.0)
        .jitter(0.0)
        .clock(clock.clone())
        .build()
        .expect("valid config");

    let waits: Vec<Duration> = (0..4)
        .map(|_| {
            let signal = if breaker.state() == State::Closed {
                breaker.on_error().unwrap_err()
            } else {
                clock.advance(Duration::from_secs(10));
                assert_eq!(breaker.pre_handle().ok(), Some(State::HalfOpen));
                breaker.on_error().unwrap_err()
            };
            signal
                .snapshot()
                .retry_after(clock.system_time())
                .expect("open signals carry a deadline")
        })
        .collect();

    assert_eq!(
        waits,
        vec![
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(4),
            Duration::from_secs(4),
        ]
    );

    clock.advance(Duration::from_secs(10));
    breaker.pre_handle().expect("deadline passed");
    assert!(breaker.on_success().is_err());
    assert_eq!(breaker.state(), State::Closed);
    assert_eq!(breaker.recovery_interval(), Duration::from_secs(1));
}

#[test]
fn test_fixed_interval_without_cap() {
    let clock = ManualClock::new();
    let breaker = count_breaker(1, &clock);

    for _ in 0..3 {
        if breaker.state() == State::Closed {
            breaker.on_error().unwrap_err();
        } else {
            clock.advance(Duration::from_secs(2));
            breaker.pre_handle().expect("probe admitted");
            breaker.on_error().unwrap_err();
        }
        assert_eq!(breaker.recovery_interval(), Duration::from_secs(1));
    }
}

#[test]
fn test_unrelated_errors_bypass_breaker() {
    let clock = ManualClock::new();
    let breaker: Breaker<TestError> = Breaker::builder("classified")
        .threshold(1.0)
        .exception_kinds(["Timeout"], kind_of)
        .clock(clock)
        .build()
        .expect("valid config");

    for _ in 0..5 {
        let result = breaker.call(|| -> Result<(), TestError> { Err(TestError::BadRequest) });
        assert!(matches!(result, Err(BreakerError::Operation(TestError::BadRequest))));
    }
    assert_eq!(breaker.state(), State::Closed);
    assert_eq!(breaker.fail_counter(), 0);
    assert!(breaker.snapshot().window.iter().all(|s| *s));

    let result = breaker.call(|| -> Result<(), TestError> { Err(TestError::Timeout) });
    assert!(matches!(result, Err(BreakerError::Tripped { .. })));
}

#[test]
fn test_pre_handle_is_idempotent_while_closed() {
    let clock = ManualClock::new();
    let breaker = count_breaker(5, &clock);
    breaker.on_error().expect("below threshold");
    let before = breaker.snapshot();

    for _ in 0..100 {
        assert_eq!(breaker.pre_handle().ok(), Some(State::Closed));
    }

    let after = breaker.snapshot();
    assert_eq!(after.fail_counter, before.fail_counter);
    assert_eq!(after.try_counter, before.try_counter);
    assert_eq!(after.window, before.window);
}

#[test]
fn test_concurrent_failures_trip_once() {
    const THREADS: u32 = 16;

    let breaker = Arc::new(
        Breaker::<TestError>::builder("concurrent")
            .threshold(f64::from(THREADS))
            .timeout(Duration::from_secs(60))
            .build()
            .expect("valid config"),
    );
    let barrier = Arc::new(Barrier::new(THREADS as usize));
    let trips = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let breaker = Arc::clone(&breaker);
            let barrier = Arc::clone(&barrier);
            let trips = Arc::clone(&trips);
            thread::spawn(move || {
                barrier.wait();
                if let Err(signal) = breaker.on_error() {
                    assert_eq!(signal.kind(), SignalKind::Tripped);
                    trips.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("thread panicked");
    }

    assert_eq!(trips.load(Ordering::SeqCst), 1);
    assert_eq!(breaker.state(), State::Open);
    assert_eq!(breaker.fail_counter(), THREADS);
    assert_eq!(breaker.try_counter(), 1);
}

#[test]
fn test_hooks_fire_once_per_transition() {
    let clock = ManualClock::new();
    let hooks = HookRegistry::new();
    let opens = Arc::new(AtomicUsize::new(0));
    let half_opens = Arc::new(AtomicUsize::new(0));
    let closes = Arc::new(AtomicUsize::new(0));
    let rejects = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&opens);
    hooks.set_on_open(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let counter = Arc::clone(&half_opens);
    hooks.set_on_half_open(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let counter = Arc::clone(&closes);
    hooks.set_on_close(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let counter = Arc::clone(&rejects);
    hooks.set_on_reject(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let breaker: Breaker<TestError> = Breaker::builder("hooks")
        .threshold(1.0)
        .timeout(Duration::from_secs(1))
        .jitter(0.0)
        .hooks(hooks)
        .clock(clock.clone())
        .build()
        .expect("valid config");

    breaker.on_error().unwrap_err();
    breaker.pre_handle().unwrap_err();
    breaker.pre_handle().unwrap_err();
    clock.advance(Duration::from_secs(2));
    breaker.pre_handle().expect("probe admitted");
    breaker.on_success().unwrap_err();

    assert_eq!(opens.load(Ordering::SeqCst), 1);
    assert_eq!(rejects.load(Ordering::SeqCst), 2);
    assert_eq!(half_opens.load(Ordering::SeqCst), 1);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[test]
fn test_circuit_breaker_manual_control() {
    let breaker = Breaker::<TestError>::builder("manual").build().expect("valid");

    assert!(breaker.force_open());
    assert_eq!(breaker.state(), State::Open);

    let result = breaker.call(|| -> Result<String, TestError> { Ok("success".to_string()) });
    assert!(matches!(result, Err(BreakerError::Open(_))));

    assert!(!breaker.force_open());

    assert!(breaker.force_closed());
    assert_eq!(breaker.state(), State::Closed);
    assert!(!breaker.force_closed());
}

#[test]
fn test_registry_shares_breakers() {
    let registry = BreakerRegistry::<TestError>::new();
    let a = registry
        .get_or_create(Breaker::builder("payments").threshold(2.0))
        .expect("valid");
    let b = registry
        .get_or_create(Breaker::builder("payments").threshold(9.0))
        .expect("valid");
    registry
        .get_or_create(Breaker::builder("search").policy(PolicyKind::Percent).threshold(0.5))
        .expect("valid");

    a.on_error().expect("below threshold");
    assert!(b.on_error().is_err());
    assert_eq!(a.state(), State::Open);
    assert_eq!(registry.names(), vec!["payments".to_string(), "search".to_string()]);
}

proptest! {
    #[test]
    fn trips_exactly_at_first_melting_point(
        min_successes in 1u32..=10,
        outcomes in proptest::collection::vec(any::<bool>(), 1..40),
    ) {
        let breaker: Breaker<TestError> = Breaker::builder("model")
            .custom_policy(PercentPolicy::new(min_successes))
            .clock(ManualClock::new())
            .build()
            .expect("valid config");

        let policy = PercentPolicy::new(min_successes);
        let mut model = OutcomeWindow::new();
        let mut fail_counter = 0u32;

        for outcome in outcomes {
            prop_assert_eq!(breaker.state(), State::Closed);
            model.push(outcome);
            if outcome {
                fail_counter = 0;
                prop_assert!(breaker.on_success().is_ok());
            } else {
                fail_counter += 1;
                let expected = policy.is_melting_point(fail_counter, &model);
                let result = breaker.on_error();
                prop_assert_eq!(result.is_err(), expected);
                if expected {
                    prop_assert_eq!(breaker.state(), State::Open);
                    break;
                }
            }
        }
    }
}

#[cfg(feature = "async")]
mod async_tests {
    use super::*;

    #[test]
    fn test_async_circuit_breaker() {
        let clock = ManualClock::new();
        let breaker = count_breaker(2, &clock);

        tokio_test::block_on(async {
            for _ in 0..5 {
                let result = breaker
                    .call_async(|| async { Result::<String, TestError>::Ok("success".to_string()) })
                    .await;
                assert!(result.is_ok());
            }

            let result = breaker
                .call_async(|| async { Result::<String, TestError>::Err(TestError::Timeout) })
                .await;
            assert!(matches!(result, Err(BreakerError::Operation(_))));

            let result = breaker
                .call_async(|| async { Result::<String, TestError>::Err(TestError::Timeout) })
                .await;
            assert!(matches!(result, Err(BreakerError::Tripped { .. })));

            let result = breaker
                .call_async(|| async { Result::<String, TestError>::Ok("success".to_string()) })
                .await;
            assert!(matches!(result, Err(BreakerError::Open(_))));
        });

        assert_eq!(breaker.state(), State::Open);
    }
}
