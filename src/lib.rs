//! # fuses
//!
//! A concurrent circuit breaker with absolute-count and sliding-window
//! failure policies and a randomized, capped exponential backoff for
//! recovery probes.
//!
//! ## What is a Circuit Breaker?
//!
//! The Circuit Breaker pattern stops callers from hammering an operation
//! that keeps failing. It operates in three states:
//!
//! - **Closed**: Normal operation. Calls pass through and failures are counted.
//! - **Open**: Calls are rejected without reaching the resource until the
//!   recovery deadline passes.
//! - **Half-Open**: The next call is let through as a probe. Success closes
//!   the breaker, failure opens it again with a longer deadline.
//!
//! ## Basic Usage
//!
//! ```rust
//! use fuses::{Breaker, BreakerError, SignalKind};
//! use std::error::Error;
//! use std::fmt;
//! use std::time::Duration;
//!
//! #[derive(Debug)]
//! struct ServiceError(String);
//!
//! impl fmt::Display for ServiceError {
//!     fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
//!         write!(f, "Service error: {}", self.0)
//!     }
//! }
//!
//! impl Error for ServiceError {}
//!
//! let breaker = Breaker::<ServiceError>::builder("inventory")
//!     .threshold(3.0) // Trip after three failures
//!     .timeout(Duration::from_secs(5)) // First probe after about five seconds
//!     .backoff_cap(Duration::from_secs(60)) // Later probes wait up to a minute
//!     .build()
//!     .expect("valid configuration");
//!
//! match breaker.call(|| Ok::<_, ServiceError>("Success".to_string())) {
//!     Ok(result) => println!("Call succeeded: {}", result),
//!     Err(BreakerError::Open(signal)) => println!("Rejected: {}", signal),
//!     Err(BreakerError::Tripped { signal, error }) => {
//!         assert_eq!(signal.kind(), SignalKind::Tripped);
//!         println!("{} opened the breaker", error);
//!     }
//!     Err(BreakerError::Operation(err)) => println!("Call failed: {}", err),
//! }
//! ```
//!
//! ## Manual protocol
//!
//! When the protected operation does not fit in a closure, drive the breaker
//! directly with [`Breaker::pre_handle`], then [`Breaker::on_success`] or
//! [`Breaker::on_error`].
//!
//! ```rust
//! # use fuses::{Breaker, State};
//! let breaker = Breaker::<std::io::Error>::builder("push").build().unwrap();
//!
//! match breaker.pre_handle() {
//!     Ok(State::Closed) | Ok(State::HalfOpen) => {
//!         // ... run the operation, then report
//!         let _ = breaker.on_success();
//!     }
//!     Ok(State::Open) => unreachable!("an open breaker never admits"),
//!     Err(signal) => println!("skipped: {}", signal),
//! }
//! ```
//!
//! ## Features
//!
//! - `std` - Standard library support (default)
//! - `async` - [`Breaker::call_async`]
//! - `prometheus` - Prometheus metrics integration

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod backoff;
mod breaker;
mod clock;
mod config;
mod error;
mod hook;
mod metrics;
mod policy;
pub mod prelude;
#[cfg(feature = "prometheus")]
mod prometheus;
mod registry;
mod state;

// Re-exports
pub use backoff::Backoff;
pub use breaker::Breaker;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BreakerBuilder, Classifier};
pub use error::{BreakerError, BreakerResult, ConfigError, Signal, SignalKind, Snapshot};
pub use hook::HookRegistry;
pub use metrics::{MetricSink, NullMetricSink, OutcomeWindow, WINDOW_SIZE};
pub use policy::{CountPolicy, FailurePolicy, PercentPolicy, PolicyKind};
#[cfg(feature = "prometheus")]
pub use prometheus::PrometheusSink;
pub use registry::BreakerRegistry;
pub use state::State;
