//! Circuit breaker pattern for provider resilience.
//!
//! After `failure_threshold` consecutive failures the circuit opens and
//! calls fail fast. Once `recovery_timeout` has passed since the last
//! failure, exactly one probe is let through (half-open). The probe's
//! outcome either closes the circuit or re-opens it.
//!
//! Phase changes only happen inside [`CircuitBreaker::allow`] and
//! [`CircuitBreaker::report`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::catalog::domain::ProviderId;

/// Configuration for circuit breaker behavior.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// Time after the last failure before a probe is allowed.
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

/// Current phase of a provider's circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitPhase {
    /// Requests flow normally.
    Closed,
    /// Requests are rejected without I/O.
    Open,
    /// A single probe request is in flight.
    HalfOpen,
}

#[derive(Debug)]
struct CircuitState {
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
    phase: CircuitPhase,
    /// When the current half-open probe was admitted
    probe_started_at: Option<Instant>,
}

impl CircuitState {
    fn new() -> Self {
        Self {
            consecutive_failures: 0,
            last_failure_at: None,
            phase: CircuitPhase::Closed,
            probe_started_at: None,
        }
    }

    fn recovery_elapsed(&self, config: &CircuitBreakerConfig, now: Instant) -> bool {
        match self.last_failure_at {
            Some(at) => now.saturating_duration_since(at) > config.recovery_timeout,
            None => true,
        }
    }
}

/// Point-in-time view of one provider's circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CircuitSnapshot {
    pub phase: CircuitPhase,
    pub consecutive_failures: u32,
}

/// Circuit breakers for all providers, each behind its own lock.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    circuits: RwLock<HashMap<ProviderId, Arc<Mutex<CircuitState>>>>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            circuits: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn circuit(&self, provider: &ProviderId) -> Arc<Mutex<CircuitState>> {
        if let Some(state) = self.circuits.read().get(provider) {
            return Arc::clone(state);
        }
        let mut circuits = self.circuits.write();
        Arc::clone(
            circuits
                .entry(provider.clone())
                .or_insert_with(|| Arc::new(Mutex::new(CircuitState::new()))),
        )
    }

    /// May a request to `provider` be attempted?
    ///
    /// In the open phase this is where the half-open transition happens:
    /// the first call after the recovery timeout gets the probe, every
    /// other call is refused until the probe reports back.
    pub fn allow(&self, provider: &ProviderId) -> bool {
        let circuit = self.circuit(provider);
        let mut state = circuit.lock();
        let now = Instant::now();

        match state.phase {
            CircuitPhase::Closed => true,
            CircuitPhase::Open => {
                if state.recovery_elapsed(&self.config, now) {
                    state.phase = CircuitPhase::HalfOpen;
                    state.probe_started_at = Some(now);
                    tracing::info!("Circuit for {} half-open, sending probe", provider);
                    true
                } else {
                    false
                }
            }
            CircuitPhase::HalfOpen => {
                // A probe that never reported back (cancelled caller) must not
                // wedge the circuit; admit a new probe after another timeout.
                let stale = state
                    .probe_started_at
                    .is_some_and(|at| now.saturating_duration_since(at) > self.config.recovery_timeout);
                if stale {
                    state.probe_started_at = Some(now);
                    tracing::warn!("Probe for {} never settled, admitting another", provider);
                }
                stale
            }
        }
    }

    /// Record the outcome of an attempted request.
    pub fn report(&self, provider: &ProviderId, success: bool) {
        let circuit = self.circuit(provider);
        let mut state = circuit.lock();
        let now = Instant::now();

        if success {
            match state.phase {
                // Open -> Closed is only reachable through a probe; a late
                // success from a request admitted earlier is ignored.
                CircuitPhase::Open => {}
                CircuitPhase::HalfOpen => {
                    tracing::info!("Circuit for {} closed after successful probe", provider);
                    state.phase = CircuitPhase::Closed;
                    state.consecutive_failures = 0;
                    state.probe_started_at = None;
                }
                CircuitPhase::Closed => state.consecutive_failures = 0,
            }
            return;
        }

        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.last_failure_at = Some(now);

        match state.phase {
            CircuitPhase::Closed => {
                if state.consecutive_failures >= self.config.failure_threshold {
                    state.phase = CircuitPhase::Open;
                    tracing::warn!(
                        "Circuit for {} opened after {} consecutive failures",
                        provider,
                        state.consecutive_failures
                    );
                }
            }
            CircuitPhase::HalfOpen => {
                state.phase = CircuitPhase::Open;
                state.probe_started_at = None;
                tracing::warn!("Probe for {} failed, circuit re-opened", provider);
            }
            CircuitPhase::Open => {}
        }
    }

    /// Give back a probe admitted by [`allow`](Self::allow) that was never sent.
    ///
    /// The circuit returns to open with its failure timestamp untouched, so
    /// the next `allow` admits a new probe. No-op outside half-open.
    pub fn abandon_probe(&self, provider: &ProviderId) {
        let circuit = self.circuit(provider);
        let mut state = circuit.lock();
        if state.phase == CircuitPhase::HalfOpen {
            state.phase = CircuitPhase::Open;
            state.probe_started_at = None;
            tracing::debug!("Probe for {} abandoned before sending", provider);
        }
    }

    /// Current phase and failure count for `provider`.
    pub fn snapshot(&self, provider: &ProviderId) -> CircuitSnapshot {
        let circuit = self.circuit(provider);
        let state = circuit.lock();
        CircuitSnapshot {
            phase: state.phase,
            consecutive_failures: state.consecutive_failures,
        }
    }

    pub fn phase(&self, provider: &ProviderId) -> CircuitPhase {
        self.snapshot(provider).phase
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
