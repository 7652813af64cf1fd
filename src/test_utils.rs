//! Test utilities and fixtures for catalog-fusion tests.
//!
//! This module provides common track fixtures, engine configuration and
//! gateway factories to reduce boilerplate in tests.
//!
//! # Example
//!
//! ```ignore
//! use crate::test_utils::{track_from, engine_config};
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_something() {
//!     let track = track_from("spotify", "Hey Jude", "The Beatles");
//!     let config = engine_config();
//!     // ... test logic
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::catalog::auth::transport::mocks::MockTransport;
use crate::catalog::auth::{AuthGateway, Credential, HttpTransport, MemoryTokenStore};
use crate::catalog::domain::{NormalizedTrack, ProviderId};
use crate::catalog::engine::EngineConfig;
use crate::catalog::resilience::RateLimitConfig;

/// A track from `provider` with an ID derived from the title.
///
/// Two calls with the same arguments produce equal tracks.
pub fn track_from(provider: &str, title: &str, artist: &str) -> NormalizedTrack {
    let id = title
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-");
    NormalizedTrack {
        id: format!("{}:{}", provider, id),
        title: title.to_string(),
        artist: artist.to_string(),
        album: None,
        duration_ms: 180_000,
        artwork_url: None,
        preview_url: None,
        source_provider: ProviderId::new(provider),
    }
}

/// Engine defaults with a rate budget generous enough that back-to-back
/// test calls are never throttled.
///
/// Breaker, retry, cache TTLs and deadline keep their production values.
pub fn engine_config() -> EngineConfig {
    EngineConfig {
        rate_limit: RateLimitConfig {
            window_limit: 10_000,
            window: Duration::from_secs(60),
            min_interval: Duration::ZERO,
        },
        ..EngineConfig::default()
    }
}

/// Gateway over a [`MockTransport`] that accepts `token`, seeded with it.
pub fn mock_gateway(token: &str) -> (AuthGateway, Arc<MockTransport>) {
    let transport = Arc::new(MockTransport::accepting(token));
    let tokens = Arc::new(MemoryTokenStore::new(Some(Credential::new(token, "refresh"))));
    let gateway = AuthGateway::new(Arc::clone(&transport) as Arc<dyn HttpTransport>, tokens);
    (gateway, transport)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_from_is_deterministic() {
        let a = track_from("spotify", "Hey Jude", "The Beatles");
        let b = track_from("spotify", "Hey Jude", "The Beatles");
        assert_eq!(a, b);
        assert_eq!(a.id, "spotify:hey-jude");
        assert_eq!(a.source_provider, ProviderId::new("spotify"));
    }

    #[test]
    fn test_engine_config_keeps_breaker_defaults() {
        let config = engine_config();
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.rate_limit.min_interval, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_mock_gateway_has_credential() {
        let (gateway, _transport) = mock_gateway("good");
        assert_eq!(gateway.credential().unwrap().access_token, "good");
    }
}
