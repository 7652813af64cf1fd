//! Resilience primitives wrapped around every provider call.
//!
//! - [`RateLimiter`] - per-provider request budgets
//! - [`CircuitBreaker`] - per-provider closed/open/half-open state machine
//! - [`TtlCache`] - lazily-expiring result cache
//! - [`RetryExecutor`] - bounded exponential backoff
//! - [`ErrorStats`] - rolling error counters and recent-error log

pub mod cache;
pub mod circuit_breaker;
pub mod rate_limit;
pub mod retry;
pub mod stats;

pub use cache::TtlCache;
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitPhase, CircuitSnapshot};
pub use rate_limit::{Decision, RateLimitConfig, RateLimiter};
pub use retry::{RetryExecutor, RetryPolicy};
pub use stats::{ErrorRecord, ErrorStats, ErrorStatsSnapshot};
