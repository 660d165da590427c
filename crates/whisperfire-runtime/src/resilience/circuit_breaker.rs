//! Circuit breaker to contain provider failures.
//!
//! When a provider fails repeatedly its circuit opens and calls to it are
//! refused until the reset window passes. One trial call is then admitted;
//! its outcome closes or reopens the circuit. A trial that never reports
//! back is replaced after another reset window.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::time::Instant;

use crate::config::duration_str;
use crate::providers::ProviderId;

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening circuit
    pub failure_threshold: u32,

    /// Time an open circuit refuses calls before admitting a trial
    #[serde(with = "duration_str")]
    pub reset_window: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_window: Duration::from_secs(30),
        }
    }
}

/// State of a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation
    Closed,

    /// Refusing calls since `opened_at`
    Open { opened_at: Instant },

    /// One trial call has been in flight since `since`; everyone else is
    /// refused. A trial that reports nothing within the reset window is
    /// presumed lost and another is admitted.
    HalfOpen { since: Instant },
}

/// Serializable view of a circuit for health reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BreakerSnapshot {
    pub state: BreakerStatus,
    pub consecutive_failures: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerStatus {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
struct Circuit {
    state: CircuitState,
    consecutive_failures: u32,
}

impl Default for Circuit {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
        }
    }
}

/// Per-provider circuit breaker.
///
/// Each provider has its own circuit so an unstable primary never blocks a
/// healthy fallback.
#[derive(Debug)]
pub struct CircuitBreaker {
    circuits: RwLock<HashMap<ProviderId, Circuit>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            circuits: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Ask to call `provider`.
    ///
    /// Admits exactly one trial once an open circuit's window has passed.
    /// A `true` answer must be followed by `record_success` or
    /// `record_failure`.
    pub fn can_call(&self, provider: &ProviderId) -> bool {
        let mut circuits = self.circuits.write();
        let Some(circuit) = circuits.get_mut(provider) else {
            return true;
        };

        match circuit.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen { since } => {
                if since.elapsed() >= self.config.reset_window {
                    circuit.state = CircuitState::HalfOpen {
                        since: Instant::now(),
                    };
                    tracing::warn!(provider = %provider, "Trial call never reported, admitting another");
                    true
                } else {
                    false
                }
            }
            CircuitState::Open { opened_at } => {
                if opened_at.elapsed() >= self.config.reset_window {
                    circuit.state = CircuitState::HalfOpen {
                        since: Instant::now(),
                    };
                    tracing::info!(provider = %provider, "Circuit half-open, admitting trial call");
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Whether `provider` would be refused right now. Does not consume the
    /// half-open trial.
    pub fn is_blocked(&self, provider: &ProviderId) -> bool {
        match self.circuits.read().get(provider).map(|c| c.state) {
            Some(CircuitState::Open { opened_at: since })
            | Some(CircuitState::HalfOpen { since }) => {
                since.elapsed() < self.config.reset_window
            }
            Some(CircuitState::Closed) | None => false,
        }
    }

    /// Record a successful call.
    pub fn record_success(&self, provider: &ProviderId) {
        let mut circuits = self.circuits.write();
        let circuit = circuits.entry(provider.clone()).or_default();
        if circuit.state != CircuitState::Closed {
            tracing::info!(provider = %provider, "Circuit closed after successful call");
        }
        circuit.state = CircuitState::Closed;
        circuit.consecutive_failures = 0;
    }

    /// Record a failed call.
    pub fn record_failure(&self, provider: &ProviderId) {
        let mut circuits = self.circuits.write();
        let circuit = circuits.entry(provider.clone()).or_default();
        circuit.consecutive_failures = circuit.consecutive_failures.saturating_add(1);

        match circuit.state {
            CircuitState::HalfOpen { .. } => {
                circuit.state = CircuitState::Open {
                    opened_at: Instant::now(),
                };
                tracing::warn!(provider = %provider, "Circuit reopened after failed trial call");
            }
            CircuitState::Closed
                if circuit.consecutive_failures >= self.config.failure_threshold =>
            {
                circuit.state = CircuitState::Open {
                    opened_at: Instant::now(),
                };
                tracing::warn!(
                    provider = %provider,
                    failures = circuit.consecutive_failures,
                    "Circuit opened after repeated failures"
                );
            }
            _ => {}
        }
    }

    /// Current state of a circuit.
    pub fn state(&self, provider: &ProviderId) -> CircuitState {
        self.circuits
            .read()
            .get(provider)
            .map(|c| c.state)
            .unwrap_or(CircuitState::Closed)
    }

    pub fn snapshot(&self, provider: &ProviderId) -> BreakerSnapshot {
        let circuit = self
            .circuits
            .read()
            .get(provider)
            .copied()
            .unwrap_or_default();

        let state = match circuit.state {
            CircuitState::Closed => BreakerStatus::Closed,
            CircuitState::HalfOpen { .. } => BreakerStatus::HalfOpen,
            CircuitState::Open { .. } => BreakerStatus::Open,
        };

        BreakerSnapshot {
            state,
            consecutive_failures: circuit.consecutive_failures,
        }
    }

    /// Snapshots of every provider that has recorded an outcome.
    pub fn snapshots(&self) -> BTreeMap<ProviderId, BreakerSnapshot> {
        let ids: Vec<ProviderId> = self.circuits.read().keys().cloned().collect();
        ids.into_iter()
            .map(|id| {
                let snapshot = self.snapshot(&id);
                (id, snapshot)
            })
            .collect()
    }

    /// Reset all circuits to closed.
    pub fn reset(&self) {
        self.circuits.write().clear();
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
