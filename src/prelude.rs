//! Re-exports common types for convenient usage.
//!
//! # Example
//! ```rust,no_run
//! use fuses::prelude::*;
//!
//! let registry = BreakerRegistry::<std::io::Error>::new();
//! let breaker = registry
//!     .get_or_create(Breaker::builder("push").policy(PolicyKind::Percent).threshold(0.6))
//!     .unwrap();
//! assert_eq!(breaker.state(), State::Closed);
//! ```

pub use crate::{
    Breaker, BreakerBuilder, BreakerError, BreakerRegistry, BreakerResult, PolicyKind, Signal,
    SignalKind, State,
};
