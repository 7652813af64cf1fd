//! Per-provider request budgets.
//!
//! Each provider gets a fixed window (`window_limit` requests per `window`)
//! plus a minimum spacing between consecutive requests. The limiter is
//! advisory: it reports a decision and the caller decides what to do with
//! a denial.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::catalog::domain::ProviderId;

/// Budget for one provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests allowed per window
    pub window_limit: u32,
    /// Window length
    pub window: Duration,
    /// Minimum gap between two requests
    pub min_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_limit: 100,
            window: Duration::from_secs(60),
            min_interval: Duration::from_millis(100),
        }
    }
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    /// Denied; the caller should wait at least this long
    Denied { wait: Duration },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }
}

#[derive(Debug)]
struct RateLimitState {
    window_start: Instant,
    requests_in_window: u32,
    last_request_at: Option<Instant>,
}

impl RateLimitState {
    fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            requests_in_window: 0,
            last_request_at: None,
        }
    }

    /// `None` when the window is too long to end at a representable instant.
    fn window_end(&self, config: &RateLimitConfig) -> Option<Instant> {
        self.window_start.checked_add(config.window)
    }

    fn roll_window(&mut self, config: &RateLimitConfig, now: Instant) {
        if self.window_end(config).is_some_and(|end| now > end) {
            self.window_start = now;
            self.requests_in_window = 0;
        }
    }

    fn decide(&mut self, config: &RateLimitConfig, now: Instant) -> Decision {
        self.roll_window(config, now);

        if self.requests_in_window >= config.window_limit {
            let wait = self
                .window_end(config)
                .map_or(Duration::MAX, |end| end.saturating_duration_since(now));
            return Decision::Denied { wait };
        }

        if let Some(last) = self.last_request_at {
            let since = now.saturating_duration_since(last);
            if since < config.min_interval {
                return Decision::Denied {
                    wait: config.min_interval - since,
                };
            }
        }

        Decision::Allowed
    }

    fn record(&mut self, config: &RateLimitConfig, now: Instant) {
        self.roll_window(config, now);
        self.requests_in_window += 1;
        self.last_request_at = Some(now);
    }
}

/// Rate limiter keyed by provider. Each provider has its own lock.
pub struct RateLimiter {
    default_config: RateLimitConfig,
    overrides: HashMap<ProviderId, RateLimitConfig>,
    states: RwLock<HashMap<ProviderId, Arc<Mutex<RateLimitState>>>>,
}

impl RateLimiter {
    pub fn new(default_config: RateLimitConfig) -> Self {
        Self {
            default_config,
            overrides: HashMap::new(),
            states: RwLock::new(HashMap::new()),
        }
    }

    /// Use a different budget for one provider.
    pub fn with_provider_config(mut self, provider: ProviderId, config: RateLimitConfig) -> Self {
        self.overrides.insert(provider, config);
        self
    }

    fn config_for(&self, provider: &ProviderId) -> &RateLimitConfig {
        self.overrides.get(provider).unwrap_or(&self.default_config)
    }

    fn state_for(&self, provider: &ProviderId) -> Arc<Mutex<RateLimitState>> {
        if let Some(state) = self.states.read().get(provider) {
            return Arc::clone(state);
        }
        let mut states = self.states.write();
        Arc::clone(
            states
                .entry(provider.clone())
                .or_insert_with(|| Arc::new(Mutex::new(RateLimitState::new(Instant::now())))),
        )
    }

    /// Would a request to `provider` be allowed right now?
    pub fn check(&self, provider: &ProviderId) -> Decision {
        let config = self.config_for(provider);
        let state = self.state_for(provider);
        let mut state = state.lock();
        state.decide(config, Instant::now())
    }

    /// Count a request that was sent to `provider`.
    pub fn record(&self, provider: &ProviderId) {
        let config = self.config_for(provider);
        let state = self.state_for(provider);
        state.lock().record(config, Instant::now());
    }

    /// Check and, if allowed, record in one step so concurrent callers
    /// cannot both squeeze through the last slot.
    pub fn acquire(&self, provider: &ProviderId) -> Decision {
        let config = self.config_for(provider);
        let state = self.state_for(provider);
        let mut state = state.lock();
        let now = Instant::now();
        let decision = state.decide(config, now);
        if decision.is_allowed() {
            state.record(config, now);
        } else {
            tracing::debug!("Rate limit denied request to {}: {:?}", provider, decision);
        }
        decision
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}
