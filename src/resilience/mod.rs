//! Resilience primitives for the execution boundary.

pub mod circuit_breaker;

pub use circuit_breaker::{BreakerState, ExecutionBreaker};
