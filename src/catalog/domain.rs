//! Internal domain models for catalog access.
//!
//! These types are OUR types - they don't change when a provider's wire
//! format changes. Provider responses get converted into these via adapters.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Identifier of one upstream catalog provider (e.g. `spotify`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A track as returned by any provider, normalized to one shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedTrack {
    /// Provider-scoped track ID
    pub id: String,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub duration_ms: u64,
    pub artwork_url: Option<String>,
    pub preview_url: Option<String>,
    /// Which provider supplied this copy
    pub source_provider: ProviderId,
}

/// Separator between title and artist in a dedup key (U+241F).
const DEDUP_SEPARATOR: char = '\u{241F}';

impl NormalizedTrack {
    /// Key identifying "the same track" across providers.
    ///
    /// `lowercase(trim(title)) + "␟" + lowercase(trim(artist))`
    pub fn dedup_key(&self) -> String {
        dedup_key(&self.title, &self.artist)
    }
}

/// Build a dedup key from a raw title/artist pair.
pub fn dedup_key(title: &str, artist: &str) -> String {
    let mut key = title.trim().to_lowercase();
    key.push(DEDUP_SEPARATOR);
    key.push_str(&artist.trim().to_lowercase());
    key
}

/// One page of provider search results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchPage {
    pub items: Vec<NormalizedTrack>,
    /// Total matches the provider reports (may exceed `items.len()`)
    pub total: u32,
}

/// Seeds for a recommendation request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationSeeds {
    #[serde(default)]
    pub track_ids: Vec<String>,
    #[serde(default)]
    pub artists: Vec<String>,
    #[serde(default)]
    pub genres: Vec<String>,
}

impl RecommendationSeeds {
    pub fn is_empty(&self) -> bool {
        self.track_ids.is_empty() && self.artists.is_empty() && self.genres.is_empty()
    }
}

// ============================================================================
// Provider configuration
// ============================================================================

/// Per-provider routing configuration, mutable at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: ProviderId,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Lower is preferred when deduplicating
    #[serde(default)]
    pub priority: u32,
    /// Share of the requested result count (0.0 to 1.0)
    #[serde(default = "default_weight")]
    pub weight: f32,
}

fn default_enabled() -> bool {
    true
}

fn default_weight() -> f32 {
    0.5
}

impl ProviderConfig {
    pub fn new(id: impl Into<ProviderId>, priority: u32, weight: f32) -> Self {
        Self {
            id: id.into(),
            enabled: true,
            priority,
            weight,
        }
    }

    /// Number of results to request from this provider for an overall `limit`.
    ///
    /// Never less than one for an enabled provider.
    pub fn share_of(&self, limit: u32) -> u32 {
        // f32 weights like 0.3 widen to 0.30000001; don't let that round up
        let exact = f64::from(limit) * f64::from(self.weight);
        let share = (exact - 1e-4).ceil().max(0.0) as u32;
        share.clamp(1, limit.max(1))
    }

    /// Check the invariants a config must hold before it is used.
    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.id.as_str().trim().is_empty() {
            return Err(CatalogError::InvalidConfig(
                "provider id must not be empty".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.weight) || self.weight.is_nan() {
            return Err(CatalogError::InvalidConfig(format!(
                "weight for {} must be within 0..=1, got {}",
                self.id, self.weight
            )));
        }
        Ok(())
    }
}

/// Typed patch for a provider config. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderPatch {
    pub enabled: Option<bool>,
    pub priority: Option<u32>,
    pub weight: Option<f32>,
}

impl ProviderPatch {
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn priority(mut self, priority: u32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn weight(mut self, weight: f32) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.enabled.is_none() && self.priority.is_none() && self.weight.is_none()
    }

    /// Produce the patched config, validated. The original is untouched on error.
    pub fn apply_to(&self, config: &ProviderConfig) -> Result<ProviderConfig, CatalogError> {
        let mut patched = config.clone();
        if let Some(enabled) = self.enabled {
            patched.enabled = enabled;
        }
        if let Some(priority) = self.priority {
            patched.priority = priority;
        }
        if let Some(weight) = self.weight {
            patched.weight = weight;
        }
        patched.validate()?;
        Ok(patched)
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Coarse error classification used for statistics and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Timeout,
    Auth,
    RateLimit,
    Server,
    Validation,
    CircuitOpen,
    Unknown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Auth => "auth",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::Server => "server",
            ErrorKind::Validation => "validation",
            ErrorKind::CircuitOpen => "circuit_open",
            ErrorKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while talking to catalog providers
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CatalogError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    /// HTTP 429 from the provider itself
    #[error("Rate limited by provider")]
    RateLimited { retry_after: Option<Duration> },

    /// Local rate limiter refused the request
    #[error("Request budget exhausted, retry in {}ms", wait.as_millis())]
    Throttled { wait: Duration },

    #[error("Server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    #[error("Request rejected (HTTP {status}): {message}")]
    Validation { status: u16, message: String },

    #[error("Circuit open for {0}")]
    CircuitOpen(ProviderId),

    #[error("All providers failed: {0}")]
    AllProvidersFailed(String),

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Unknown provider: {0}")]
    UnknownProvider(ProviderId),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Catalog engine is shut down")]
    ShutDown,

    #[error("Unexpected error: {0}")]
    Unknown(String),
}

impl CatalogError {
    /// Classify a non-success HTTP status.
    ///
    /// Status 0 (no response) is a network failure.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message: String = body.chars().take(200).collect();
        match status {
            0 => CatalogError::Network("no response".to_string()),
            401 => CatalogError::Auth(message),
            429 => CatalogError::RateLimited { retry_after: None },
            400..=499 => CatalogError::Validation { status, message },
            500..=599 => CatalogError::Server { status, message },
            _ => CatalogError::Unknown(format!("HTTP {}: {}", status, message)),
        }
    }

    /// Taxonomy bucket for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CatalogError::Network(_) => ErrorKind::Network,
            CatalogError::Timeout(_) => ErrorKind::Timeout,
            CatalogError::Auth(_) => ErrorKind::Auth,
            CatalogError::RateLimited { .. } | CatalogError::Throttled { .. } => {
                ErrorKind::RateLimit
            }
            CatalogError::Server { .. } => ErrorKind::Server,
            CatalogError::Validation { .. }
            | CatalogError::Parse(_)
            | CatalogError::UnknownProvider(_)
            | CatalogError::InvalidConfig(_) => ErrorKind::Validation,
            CatalogError::CircuitOpen(_) => ErrorKind::CircuitOpen,
            CatalogError::AllProvidersFailed(_)
            | CatalogError::ShutDown
            | CatalogError::Unknown(_) => ErrorKind::Unknown,
        }
    }

    /// Default retry classification.
    ///
    /// Retryable: network, timeout, provider 429 and 5xx. A local
    /// `Throttled` denial is never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CatalogError::Network(_)
                | CatalogError::Timeout(_)
                | CatalogError::RateLimited { .. }
                | CatalogError::Server { .. }
        )
    }

    /// Whether this outcome counts against the provider's circuit breaker.
    ///
    /// Refusals that never reached the provider (open circuit, local
    /// throttling) and caller mistakes do not.
    pub fn counts_as_provider_failure(&self) -> bool {
        matches!(
            self,
            CatalogError::Network(_)
                | CatalogError::Timeout(_)
                | CatalogError::RateLimited { .. }
                | CatalogError::Server { .. }
                | CatalogError::Parse(_)
                | CatalogError::Unknown(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(title: &str, artist: &str) -> NormalizedTrack {
        NormalizedTrack {
            id: "1".to_string(),
            title: title.to_string(),
            artist: artist.to_string(),
            album: None,
            duration_ms: 1000,
            artwork_url: None,
            preview_url: None,
            source_provider: ProviderId::new("a"),
        }
    }

    #[test]
    fn test_dedup_key_normalizes_case_and_whitespace() {
        let a = track("  Hey Jude ", "The Beatles");
        let b = track("hey jude", "  the beatles  ");
        assert_eq!(a.dedup_key(), b.dedup_key());
        assert_eq!(a.dedup_key(), "hey jude\u{241F}the beatles");
    }

    #[test]
    fn test_dedup_key_separates_title_and_artist() {
        // "ab" + "c" must not collide with "a" + "bc"
        assert_ne!(dedup_key("ab", "c"), dedup_key("a", "bc"));
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            CatalogError::from_status(400, "bad"),
            CatalogError::Validation { status: 400, .. }
        ));
        assert!(matches!(CatalogError::from_status(401, ""), CatalogError::Auth(_)));
        assert!(matches!(
            CatalogError::from_status(429, ""),
            CatalogError::RateLimited { .. }
        ));
        assert!(matches!(
            CatalogError::from_status(503, ""),
            CatalogError::Server { status: 503, .. }
        ));
        assert!(matches!(CatalogError::from_status(0, ""), CatalogError::Network(_)));
        assert!(matches!(
            CatalogError::from_status(404, ""),
            CatalogError::Validation { status: 404, .. }
        ));
    }

    #[test]
    fn test_retry_classification() {
        assert!(CatalogError::Network("reset".into()).is_retryable());
        assert!(CatalogError::Timeout("slow".into()).is_retryable());
        assert!(CatalogError::RateLimited { retry_after: None }.is_retryable());
        assert!(CatalogError::from_status(500, "").is_retryable());
        assert!(CatalogError::from_status(503, "").is_retryable());
        assert!(!CatalogError::from_status(400, "").is_retryable());
        assert!(!CatalogError::Auth("expired".into()).is_retryable());
        assert!(
            !CatalogError::Throttled {
                wait: Duration::from_millis(10)
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_local_denial_and_remote_429_share_a_kind() {
        let local = CatalogError::Throttled {
            wait: Duration::from_millis(5),
        };
        let remote = CatalogError::RateLimited { retry_after: None };
        assert_eq!(local.kind(), ErrorKind::RateLimit);
        assert_eq!(remote.kind(), ErrorKind::RateLimit);
        assert!(!local.counts_as_provider_failure());
        assert!(remote.counts_as_provider_failure());
    }

    #[test]
    fn test_share_of_rounds_up() {
        let config = ProviderConfig::new("a", 1, 0.5);
        assert_eq!(config.share_of(5), 3);
        assert_eq!(config.share_of(10), 5);

        let tiny = ProviderConfig::new("b", 1, 0.0);
        assert_eq!(tiny.share_of(10), 1);

        let full = ProviderConfig::new("c", 1, 1.0);
        assert_eq!(full.share_of(7), 7);

        assert_eq!(ProviderConfig::new("d", 1, 0.3).share_of(10), 3);
        assert_eq!(ProviderConfig::new("e", 1, 0.7).share_of(10), 7);
    }

    #[test]
    fn test_patch_validates_weight() {
        let config = ProviderConfig::new("a", 1, 0.5);
        let result = ProviderPatch::default().weight(1.5).apply_to(&config);
        assert!(matches!(result, Err(CatalogError::InvalidConfig(_))));

        let patched = ProviderPatch::default()
            .enabled(false)
            .priority(7)
            .apply_to(&config)
            .unwrap();
        assert!(!patched.enabled);
        assert_eq!(patched.priority, 7);
        assert_eq!(patched.weight, 0.5);
    }
}
