//! Retry logic with exponential backoff for transient failures.
//!
//! Delay before retry `n` (1-based) is `min(base_delay * 2^(n-1), max_delay)`,
//! optionally with random jitter. Every attempt is reported to
//! [`ErrorStats`] with its attempt index.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::stats::ErrorStats;
use crate::catalog::domain::{CatalogError, ProviderId};

/// Configuration for retry behavior.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Add up to 50% random jitter on top of each delay.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            jitter: false,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max;
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Backoff before the retry that follows failed attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay);

        if self.jitter && !delay.is_zero() {
            let extra = rand::rng().random_range(0..=delay.as_millis() as u64 / 2);
            delay.saturating_add(Duration::from_millis(extra))
        } else {
            delay
        }
    }
}

/// Runs fallible operations under a [`RetryPolicy`].
#[derive(Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    stats: Arc<ErrorStats>,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy, stats: Arc<ErrorStats>) -> Self {
        Self { policy, stats }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` with the default retry classification.
    pub async fn run<T, F, Fut>(&self, provider: &ProviderId, operation: F) -> Result<T, CatalogError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, CatalogError>>,
    {
        self.run_with(provider, operation, CatalogError::is_retryable)
            .await
    }

    /// Run `operation`, retrying failures that `classify` deems retryable.
    ///
    /// The operation receives the 1-based attempt index. The last error is
    /// surfaced when the error is terminal or attempts are exhausted.
    pub async fn run_with<T, F, Fut, C>(
        &self,
        provider: &ProviderId,
        mut operation: F,
        classify: C,
    ) -> Result<T, CatalogError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, CatalogError>>,
        C: Fn(&CatalogError) -> bool,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match operation(attempt).await {
                Ok(value) => {
                    self.stats.record_attempt(provider, attempt, Ok(()));
                    return Ok(value);
                }
                Err(e) => {
                    self.stats.record_attempt(provider, attempt, Err(&e));

                    if !classify(&e) {
                        tracing::debug!("{}: terminal error on attempt {}: {}", provider, attempt, e);
                        return Err(e);
                    }
                    if attempt >= max_attempts {
                        tracing::warn!(
                            "{}: giving up after {} attempts: {}",
                            provider,
                            attempt,
                            e
                        );
                        return Err(e);
                    }

                    let delay = match &e {
                        // Honor the provider's hint when it is within our ceiling
                        CatalogError::RateLimited {
                            retry_after: Some(after),
                        } => (*after).min(self.policy.max_delay),
                        _ => self.policy.delay_for(attempt),
                    };
                    tracing::debug!(
                        "{}: attempt {} failed ({}), retrying in {:?}",
                        provider,
                        attempt,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use tokio::time::Instant;

    fn executor() -> (RetryExecutor, Arc<ErrorStats>) {
        let stats = Arc::new(ErrorStats::new());
        (
            RetryExecutor::new(RetryPolicy::default(), Arc::clone(&stats)),
            stats,
        )
    }

    fn provider() -> ProviderId {
        ProviderId::new("spotify")
    }

    #[test]
    fn test_delay_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(4000));
        assert_eq!(policy.delay_for(4), Duration::from_millis(8000));
        assert_eq!(policy.delay_for(5), Duration::from_millis(10_000));
        assert_eq!(policy.delay_for(40), Duration::from_millis(10_000));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy::default().with_jitter(true);
        for _ in 0..50 {
            let delay = policy.delay_for(2);
            assert!(delay >= Duration::from_millis(2000));
            assert!(delay <= Duration::from_millis(3000));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_third_attempt_with_backoff() {
        let (executor, stats) = executor();
        let started = Instant::now();
        let seen = Mutex::new(Vec::new());

        let result = executor
            .run(&provider(), |attempt| {
                seen.lock().push(started.elapsed());
                async move {
                    if attempt < 3 {
                        Err(CatalogError::Network("connection reset".into()))
                    } else {
                        Ok("tracks")
                    }
                }
            })
            .await;

        assert_eq!(result, Ok("tracks"));
        let seen = seen.lock();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[1] - seen[0], Duration::from_millis(1000));
        assert_eq!(seen[2] - seen[1], Duration::from_millis(2000));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.attempts, 3);
        assert_eq!(snapshot.failed_attempts, 2);
        assert_eq!(snapshot.total_errors, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_attempts_surface_last_error() {
        let (executor, _) = executor();
        let calls = Mutex::new(0u32);

        let result: Result<(), _> = executor
            .run(&provider(), |attempt| {
                *calls.lock() += 1;
                async move {
                    Err(CatalogError::Server {
                        status: 503,
                        message: format!("attempt {}", attempt),
                    })
                }
            })
            .await;

        assert_eq!(*calls.lock(), 3);
        assert_eq!(
            result,
            Err(CatalogError::Server {
                status: 503,
                message: "attempt 3".into()
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_error_not_retried() {
        let (executor, _) = executor();
        let calls = Mutex::new(0u32);

        let result: Result<(), _> = executor
            .run(&provider(), |_| {
                *calls.lock() += 1;
                async { Err(CatalogError::from_status(400, "bad query")) }
            })
            .await;

        assert_eq!(*calls.lock(), 1);
        assert!(matches!(result, Err(CatalogError::Validation { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_classifier() {
        let (executor, _) = executor();
        let calls = Mutex::new(0u32);

        let result: Result<(), _> = executor
            .run_with(
                &provider(),
                |_| {
                    *calls.lock() += 1;
                    async { Err(CatalogError::Network("down".into())) }
                },
                |_| false,
            )
            .await;

        assert_eq!(*calls.lock(), 1);
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_hint_is_honored() {
        let (executor, _) = executor();
        let started = Instant::now();
        let seen = Mutex::new(Vec::new());

        let _ = executor
            .run(&provider(), |attempt| {
                seen.lock().push(started.elapsed());
                async move {
                    if attempt == 1 {
                        Err(CatalogError::RateLimited {
                            retry_after: Some(Duration::from_millis(250)),
                        })
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        let seen = seen.lock();
        assert_eq!(seen[1] - seen[0], Duration::from_millis(250));
    }
}
