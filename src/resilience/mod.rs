//! # Resilience
//!
//! Fault-isolation primitives protecting the Authority and the caller from
//! cascading failure. The circuit breaker here is shared between
//! request-time transmissions and the background replay job.

pub mod circuit_breaker;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot, CircuitState,
};
