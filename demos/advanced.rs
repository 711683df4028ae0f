//! Advanced Circuit Breaker Example
//!
//! This example demonstrates:
//! 1. Sharing breakers by name through a registry
//! 2. A sliding-window policy with classified errors
//! 3. Hooks and tracing output for breaker events
//! 4. Driving the breaker by hand around a non-closure operation

use fuses::{Breaker, BreakerRegistry, HookRegistry, PolicyKind, SignalKind};
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug)]
enum ServiceError {
    Unavailable,
    Validation(String),
}

impl ServiceError {
    fn kind(&self) -> &str {
        match self {
            ServiceError::Unavailable => "Unavailable",
            ServiceError::Validation(_) => "Validation",
        }
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::Unavailable => write!(f, "service unavailable"),
            ServiceError::Validation(msg) => write!(f, "invalid request: {}", msg),
        }
    }
}

impl Error for ServiceError {}

// Simulates a backend that goes down for a while and comes back
fn external_service_call(call: u32) -> Result<String, ServiceError> {
    match call {
        5 | 9 => Err(ServiceError::Validation(format!("call {}", call))),
        6..=16 => Err(ServiceError::Unavailable),
        _ => Ok(format!("response {}", call)),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("fuses=debug")),
        )
        .init();

    println!("=== Advanced Circuit Breaker Example ===\n");

    let hooks = Arc::new(HookRegistry::new());
    hooks.set_on_open(|s| println!("-> OPEN   {}", s));
    hooks.set_on_half_open(|s| println!("-> PROBE  {}", s));
    hooks.set_on_close(|s| println!("-> CLOSED {}", s));

    let registry = BreakerRegistry::<ServiceError>::new();
    let builder = || {
        Breaker::builder("inventory")
            .policy(PolicyKind::Percent)
            .threshold(0.7) // Trip when fewer than 7 of the last 10 calls succeeded
            .timeout(Duration::from_millis(300))
            .backoff_cap(Duration::from_secs(2))
            .jitter(0.2)
            .exception_kinds(["Unavailable"], ServiceError::kind)
            .shared_hooks(Arc::clone(&hooks))
    };

    for call in 1..=30 {
        // Every lookup returns the same breaker
        let breaker = registry
            .get_or_create(builder())
            .expect("valid configuration");

        match breaker.pre_handle() {
            Err(signal) => {
                let wait = signal
                    .snapshot()
                    .retry_after(std::time::SystemTime::now())
                    .unwrap_or_default();
                println!("call {:>2}: rejected, retry in {:.2}s", call, wait.as_secs_f64());
            }
            Ok(state) => {
                let result = external_service_call(call);
                let report = match &result {
                    Ok(_) => breaker.on_success(),
                    Err(err) if breaker.is_relevant(err) => breaker.on_error(),
                    Err(_) => Ok(()),
                };
                let note = match report {
                    Err(signal) if signal.kind() == SignalKind::Closed => " (recovered)",
                    Err(signal) if signal.is_open() => " (breaker opened)",
                    _ => "",
                };
                match result {
                    Ok(body) => println!("call {:>2} [{}]: {}{}", call, state, body, note),
                    Err(err) => println!("call {:>2} [{}]: {}{}", call, state, err, note),
                }
            }
        }

        thread::sleep(Duration::from_millis(150));
    }

    let breaker = registry.get("inventory").expect("registered above");
    println!("\nFinal state: {}", breaker.state());

    println!("\n=== Example Completed ===");
}
