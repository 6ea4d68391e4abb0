//! Resilience patterns for conform-runtime.
//!
//! This module provides:
//! - Circuit breaker keyed by correction service
//! - Exponential backoff for transient failures
//! - Usage counters for rounds, calls and tokens

mod circuit_breaker;
mod retry;
mod usage;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use usage::{CorrectionUsage, LlmUsage};
