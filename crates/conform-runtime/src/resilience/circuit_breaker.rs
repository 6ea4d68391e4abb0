//! Circuit breaker for correction services.
//!
//! When a service fails repeatedly, the circuit opens and subsequent rounds
//! skip it and go straight to local repair.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::human_duration;

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failed rounds before opening the circuit
    pub failure_threshold: u32,

    /// Time before a test call is allowed through
    #[serde(with = "human_duration")]
    pub recovery_timeout: Duration,

    /// Successes needed to close the circuit again
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 1,
        }
    }
}

/// State of a circuit.
#[derive(Debug, Clone, PartialEq)]
pub enum CircuitState {
    /// Normal operation
    Closed { failures: u32 },

    /// Circuit is open, all rounds bypass the service
    Open { opened_at: Instant },

    /// Testing if circuit can close
    HalfOpen { successes: u32 },
}

/// Circuit breaker keyed by correction service name.
///
/// Each service has its own circuit so one flaky backend does not disable
/// the others.
pub struct CircuitBreaker {
    states: RwLock<HashMap<String, CircuitState>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    /// Create a new circuit breaker.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Check if the circuit is open for a service.
    ///
    /// Returns true if the round should skip the service and use fallback.
    pub fn is_open(&self, service: &str) -> bool {
        let states = self.states.read();
        match states.get(service) {
            Some(CircuitState::Open { opened_at }) => {
                if opened_at.elapsed() >= self.config.recovery_timeout {
                    drop(states);
                    self.transition_to_half_open(service);
                    false
                } else {
                    true
                }
            }
            _ => false,
        }
    }

    /// Record a round in which the service answered.
    pub fn record_success(&self, service: &str) {
        let mut states = self.states.write();
        match states.get(service).cloned() {
            Some(CircuitState::HalfOpen { successes }) => {
                if successes + 1 >= self.config.success_threshold {
                    states.insert(service.to_string(), CircuitState::Closed { failures: 0 });
                    tracing::info!(service, "Circuit closed after successful recovery");
                } else {
                    states.insert(
                        service.to_string(),
                        CircuitState::HalfOpen {
                            successes: successes + 1,
                        },
                    );
                }
            }
            Some(CircuitState::Closed { failures }) if failures > 0 => {
                states.insert(service.to_string(), CircuitState::Closed { failures: 0 });
            }
            _ => {}
        }
    }

    /// Record a round in which every call to the service failed.
    pub fn record_failure(&self, service: &str) {
        let mut states = self.states.write();
        let current = states
            .get(service)
            .cloned()
            .unwrap_or(CircuitState::Closed { failures: 0 });

        match current {
            CircuitState::Closed { failures } => {
                if failures + 1 >= self.config.failure_threshold {
                    states.insert(
                        service.to_string(),
                        CircuitState::Open {
                            opened_at: Instant::now(),
                        },
                    );
                    tracing::warn!(
                        service,
                        failures = failures + 1,
                        "Circuit opened after repeated failures"
                    );
                } else {
                    states.insert(
                        service.to_string(),
                        CircuitState::Closed {
                            failures: failures + 1,
                        },
                    );
                }
            }
            CircuitState::HalfOpen { .. } => {
                states.insert(
                    service.to_string(),
                    CircuitState::Open {
                        opened_at: Instant::now(),
                    },
                );
                tracing::warn!(service, "Circuit reopened after failed recovery attempt");
            }
            CircuitState::Open { .. } => {}
        }
    }

    fn transition_to_half_open(&self, service: &str) {
        let mut states = self.states.write();
        if matches!(states.get(service), Some(CircuitState::Open { .. })) {
            states.insert(service.to_string(), CircuitState::HalfOpen { successes: 0 });
            tracing::info!(service, "Circuit transitioning to half-open for recovery test");
        }
    }

    /// Get current state of a circuit.
    pub fn state(&self, service: &str) -> CircuitState {
        self.states
            .read()
            .get(service)
            .cloned()
            .unwrap_or(CircuitState::Closed { failures: 0 })
    }

    /// Reset all circuits to closed.
    pub fn reset(&self) {
        self.states.write().clear();
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
