//! Resilience patterns for whisperfire-runtime.
//!
//! This module provides:
//! - A per-provider circuit breaker to contain failing backends
//! - Bounded retry with linear backoff for a single provider hop

mod circuit_breaker;
mod retry;

pub use circuit_breaker::{
    BreakerSnapshot, BreakerStatus, CircuitBreaker, CircuitBreakerConfig, CircuitState,
};
pub use retry::{LinearBackoff, LinearBuilder, RetryPolicy};
