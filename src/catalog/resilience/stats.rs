//! Rolling error statistics.
//!
//! Keeps cumulative counters by provider and by error kind plus a bounded
//! log of the most recent errors (newest first). Attempts are tracked on
//! separate counters so retries don't inflate the error totals.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::catalog::domain::{CatalogError, ErrorKind, ProviderId};

/// How many recent errors are retained.
pub const RECENT_ERROR_CAPACITY: usize = 50;

/// A single recorded error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRecord {
    pub timestamp: DateTime<Utc>,
    pub provider: ProviderId,
    pub kind: ErrorKind,
    pub message: String,
}

/// Serializable copy of the recorder's state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ErrorStatsSnapshot {
    pub total_errors: u64,
    pub by_provider: BTreeMap<ProviderId, u64>,
    pub by_kind: BTreeMap<ErrorKind, u64>,
    /// Newest first
    pub recent: Vec<ErrorRecord>,
    pub attempts: u64,
    pub failed_attempts: u64,
}

#[derive(Debug, Default)]
struct StatsInner {
    total_errors: u64,
    by_provider: BTreeMap<ProviderId, u64>,
    by_kind: BTreeMap<ErrorKind, u64>,
    recent: VecDeque<ErrorRecord>,
    attempts: u64,
    failed_attempts: u64,
}

/// Thread-safe error statistics recorder.
#[derive(Debug, Default)]
pub struct ErrorStats {
    inner: Mutex<StatsInner>,
}

impl ErrorStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error that ended a provider's round.
    pub fn record_error(&self, provider: &ProviderId, error: &CatalogError) {
        let record = ErrorRecord {
            timestamp: Utc::now(),
            provider: provider.clone(),
            kind: error.kind(),
            message: error.to_string(),
        };
        tracing::debug!("Recording {} error for {}: {}", record.kind, provider, record.message);

        let mut inner = self.inner.lock();
        inner.total_errors += 1;
        *inner.by_provider.entry(provider.clone()).or_default() += 1;
        *inner.by_kind.entry(record.kind).or_default() += 1;
        inner.recent.push_front(record);
        inner.recent.truncate(RECENT_ERROR_CAPACITY);
    }

    /// Record one attempt of a (possibly retried) operation.
    pub fn record_attempt(
        &self,
        provider: &ProviderId,
        attempt: u32,
        outcome: Result<(), &CatalogError>,
    ) {
        let mut inner = self.inner.lock();
        inner.attempts += 1;
        match outcome {
            Ok(()) => tracing::debug!("{} attempt {} succeeded", provider, attempt),
            Err(e) => {
                inner.failed_attempts += 1;
                tracing::debug!("{} attempt {} failed: {}", provider, attempt, e);
            }
        }
    }

    pub fn total_errors(&self) -> u64 {
        self.inner.lock().total_errors
    }

    pub fn snapshot(&self) -> ErrorStatsSnapshot {
        let inner = self.inner.lock();
        ErrorStatsSnapshot {
            total_errors: inner.total_errors,
            by_provider: inner.by_provider.clone(),
            by_kind: inner.by_kind.clone(),
            recent: inner.recent.iter().cloned().collect(),
            attempts: inner.attempts,
            failed_attempts: inner.failed_attempts,
        }
    }

    pub fn reset(&self) {
        *self.inner.lock() = StatsInner::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_by_provider_and_kind() {
        let stats = ErrorStats::new();
        let spotify = ProviderId::new("spotify");
        let lastfm = ProviderId::new("lastfm");

        stats.record_error(&spotify, &CatalogError::Timeout("slow".into()));
        stats.record_error(&spotify, &CatalogError::from_status(503, "down"));
        stats.record_error(&lastfm, &CatalogError::Timeout("slow".into()));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_errors, 3);
        assert_eq!(snapshot.by_provider[&spotify], 2);
        assert_eq!(snapshot.by_provider[&lastfm], 1);
        assert_eq!(snapshot.by_kind[&ErrorKind::Timeout], 2);
        assert_eq!(snapshot.by_kind[&ErrorKind::Server], 1);
    }

    #[test]
    fn test_recent_log_is_bounded_newest_first() {
        let stats = ErrorStats::new();
        let provider = ProviderId::new("spotify");
        for i in 0..60 {
            stats.record_error(&provider, &CatalogError::Network(format!("error {}", i)));
        }

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_errors, 60);
        assert_eq!(snapshot.recent.len(), RECENT_ERROR_CAPACITY);
        assert!(snapshot.recent[0].message.contains("error 59"));
        assert!(snapshot.recent[49].message.contains("error 10"));
    }

    #[test]
    fn test_attempts_do_not_count_as_errors() {
        let stats = ErrorStats::new();
        let provider = ProviderId::new("spotify");
        let err = CatalogError::Network("reset".into());
        stats.record_attempt(&provider, 1, Err(&err));
        stats.record_attempt(&provider, 2, Ok(()));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_errors, 0);
        assert_eq!(snapshot.attempts, 2);
        assert_eq!(snapshot.failed_attempts, 1);
    }

    #[test]
    fn test_reset() {
        let stats = ErrorStats::new();
        stats.record_error(&ProviderId::new("a"), &CatalogError::Auth("no".into()));
        stats.reset();
        assert_eq!(stats.snapshot(), ErrorStatsSnapshot::default());
    }
}
