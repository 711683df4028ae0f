use fuses::{Breaker, BreakerError};
use std::error::Error;
use std::fmt;
use std::thread;
use std::time::Duration;

// Custom error type that implements Error trait
#[derive(Debug)]
struct ServiceError(String);

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Service error: {}", self.0)
    }
}

impl Error for ServiceError {}

fn main() {
    let breaker = Breaker::<ServiceError>::builder("demo")
        .threshold(3.0) // Three failures trip the circuit
        .timeout(Duration::from_secs(1)) // First probe after about a second
        .backoff_cap(Duration::from_secs(4)) // Repeated trips wait longer
        .build()
        .expect("valid configuration");

    println!("Circuit initial state: {}", breaker.state());

    let mut calls = 0;

    // Calls 4 to 9 fail, everything else succeeds
    let mut call_service = || -> Result<String, ServiceError> {
        calls += 1;
        if (4..10).contains(&calls) {
            Err(ServiceError("External service error".to_string()))
        } else {
            Ok("Success".to_string())
        }
    };

    for i in 1..=20 {
        println!("\nAttempt {}: ", i);

        match breaker.call(&mut call_service) {
            Ok(result) => println!("Call succeeded with result: {}", result),
            Err(BreakerError::Open(signal)) => {
                println!("Circuit is open: {}", signal);
                thread::sleep(Duration::from_millis(500));
            }
            Err(BreakerError::Tripped { signal, error }) => {
                println!("{} -> {}", error, signal.kind());
            }
            Err(BreakerError::Operation(err)) => {
                println!("Call failed with error: {}", err);
            }
        }

        println!(
            "Current state: {}, fail counter: {}, try counter: {}",
            breaker.state(),
            breaker.fail_counter(),
            breaker.try_counter()
        );

        thread::sleep(Duration::from_millis(200));
    }
}
