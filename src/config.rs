//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\catalog-fusion\config.toml
//! - macOS: ~/Library/Application Support/catalog-fusion/config.toml
//! - Linux: ~/.config/catalog-fusion/config.toml
//!
//! The config file is human-readable and editable. Durations are stored
//! as milliseconds. Credentials refreshed at runtime are written back.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::catalog::auth::Credential;
use crate::catalog::domain::{ProviderConfig, ProviderId};
use crate::catalog::engine::{CacheTtls, EngineConfig};
use crate::catalog::resilience::{CircuitBreakerConfig, RateLimitConfig, RetryPolicy};

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Catalog backend location
    pub api: ApiConfig,

    /// Bearer credentials (keep separate for potential future encryption)
    pub credentials: Credentials,

    /// Upstream providers, in tie-break order
    pub providers: Vec<ProviderEntry>,

    /// Breaker, retry, rate limit and deadline tunables
    pub resilience: ResilienceConfig,

    /// Cache lifetimes
    pub cache: CacheConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            credentials: Credentials::default(),
            providers: vec![
                ProviderEntry::new("spotify", 1, 0.5),
                ProviderEntry::new("lastfm", 2, 0.5),
            ],
            resilience: ResilienceConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl Config {
    /// Engine tunables described by this config.
    pub fn engine_config(&self) -> EngineConfig {
        let r = &self.resilience;
        EngineConfig {
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: r.failure_threshold,
                recovery_timeout: Duration::from_millis(r.recovery_timeout_ms),
            },
            retry: RetryPolicy::default()
                .with_max_attempts(r.max_attempts)
                .with_base_delay(Duration::from_millis(r.base_delay_ms))
                .with_max_delay(Duration::from_millis(r.max_delay_ms))
                .with_jitter(r.jitter),
            rate_limit: RateLimitConfig {
                window_limit: r.window_limit,
                window: Duration::from_millis(r.window_ms),
                min_interval: Duration::from_millis(r.min_interval_ms),
            },
            cache_ttls: CacheTtls {
                merged_search: Duration::from_millis(self.cache.merged_search_ttl_ms),
                provider_search: Duration::from_millis(self.cache.provider_search_ttl_ms),
                recommendations: Duration::from_millis(self.cache.recommendations_ttl_ms),
                lookup: Duration::from_millis(self.cache.lookup_ttl_ms),
            },
            // 0 disables the outer deadline
            deadline: (r.deadline_ms > 0).then(|| Duration::from_millis(r.deadline_ms)),
        }
    }

    /// Stored credential, if an access token is configured.
    pub fn credential(&self) -> Option<Credential> {
        let access = self.credentials.access_token.as_deref()?;
        Some(Credential::new(
            access,
            self.credentials.refresh_token.as_deref().unwrap_or_default(),
        ))
    }

    pub fn set_credential(&mut self, credential: Option<&Credential>) {
        self.credentials = match credential {
            Some(c) => Credentials {
                access_token: Some(c.access_token.clone()),
                refresh_token: Some(c.refresh_token.clone()),
            },
            None => Credentials::default(),
        };
    }

    pub fn provider_mut(&mut self, id: &ProviderId) -> Option<&mut ProviderEntry> {
        self.providers.iter_mut().find(|p| &p.routing.id == id)
    }
}

/// Catalog backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,

    /// Per-request transport timeout
    pub request_timeout_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api".to_string(),
            request_timeout_ms: 10_000,
        }
    }
}

/// API credentials
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

/// One `[[providers]]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderEntry {
    #[serde(flatten)]
    pub routing: ProviderConfig,

    /// Base path on the backend (default `/<id>`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ProviderEntry {
    pub fn new(id: &str, priority: u32, weight: f32) -> Self {
        Self {
            routing: ProviderConfig::new(id, priority, weight),
            path: None,
        }
    }
}

/// Resilience tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub failure_threshold: u32,
    pub recovery_timeout_ms: u64,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
    pub window_limit: u32,
    pub window_ms: u64,
    pub min_interval_ms: u64,
    /// Outer deadline per provider call (0 = none)
    pub deadline_ms: u64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_ms: 60_000,
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 10_000,
            jitter: false,
            window_limit: 100,
            window_ms: 60_000,
            min_interval_ms: 100,
            deadline_ms: 30_000,
        }
    }
}

/// Cache TTLs in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub merged_search_ttl_ms: u64,
    pub provider_search_ttl_ms: u64,
    pub recommendations_ttl_ms: u64,
    pub lookup_ttl_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            merged_search_ttl_ms: 180_000,
            provider_search_ttl_ms: 240_000,
            recommendations_ttl_ms: 300_000,
            lookup_ttl_ms: 900_000,
        }
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("catalog-fusion"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration from the default location
///
/// Returns default config if file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        tracing::warn!("Could not determine config directory, using defaults");
        return Config::default();
    };
    load_from(&path)
}

/// Load configuration from an explicit path, with the same fallbacks as [`load`]
pub fn load_from(path: &Path) -> Config {
    if !path.exists() {
        tracing::info!("No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => {
                tracing::info!("Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                tracing::error!("Failed to parse config file {:?}: {}", path, e);
                tracing::warn!("Using default configuration");
                Config::default()
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file {:?}: {}", path, e);
            Config::default()
        }
    }
}

/// Save configuration to the default location
pub fn save(config: &Config) -> Result<(), ConfigError> {
    let path = config_path().ok_or(ConfigError::NoConfigDir)?;
    save_to(config, &path)
}

/// Save configuration to `path`
///
/// Creates the parent directory if it doesn't exist.
pub fn save_to(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDir(dir.to_path_buf(), e))?;
    }

    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    // Write atomically (write to temp, then rename)
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, path)
        .map_err(|e| ConfigError::Rename(temp_path, path.to_path_buf(), e))?;

    tracing::info!("Saved config to {:?}", path);
    Ok(())
}

/// Save configuration without blocking the async runtime
pub async fn save_async(config: Config, path: PathBuf) -> Result<(), ConfigError> {
    tokio::task::spawn_blocking(move || save_to(&config, &path))
        .await
        .map_err(|e| ConfigError::TaskJoin(e.to_string()))?
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),

    #[error("Task join error: {0}")]
    TaskJoin(String),
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[api]"));
        assert!(toml.contains("[credentials]"));
        assert!(toml.contains("[[providers]]"));
        assert!(toml.contains("[resilience]"));
        assert!(toml.contains("[cache]"));
    }

    #[test]
    fn test_defaults_match_engine_defaults() {
        let engine = Config::default().engine_config();
        assert_eq!(engine.circuit_breaker, CircuitBreakerConfig::default());
        assert_eq!(engine.retry, RetryPolicy::default());
        assert_eq!(engine.rate_limit, RateLimitConfig::default());
        assert_eq!(engine.cache_ttls, CacheTtls::default());
        assert_eq!(engine.deadline, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let toml = r#"
[credentials]
access_token = "abc"

[resilience]
failure_threshold = 3
deadline_ms = 0

[[providers]]
id = "deezer"
priority = 4
path = "/v2/deezer"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.credentials.access_token.as_deref(), Some("abc"));
        assert_eq!(config.resilience.failure_threshold, 3);
        assert_eq!(config.resilience.max_attempts, 3);
        assert_eq!(config.cache.lookup_ttl_ms, 900_000);

        assert_eq!(config.providers.len(), 1);
        let deezer = &config.providers[0];
        assert_eq!(deezer.routing.id, ProviderId::new("deezer"));
        assert!(deezer.routing.enabled);
        assert_eq!(deezer.routing.weight, 0.5);
        assert_eq!(deezer.path.as_deref(), Some("/v2/deezer"));

        assert_eq!(config.engine_config().deadline, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_durations_do_not_overflow() {
        let toml = r#"
[resilience]
window_ms = 9223372036854775807
window_limit = 1
min_interval_ms = 0

[cache]
lookup_ttl_ms = 9223372036854775807
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let engine = config.engine_config();
        assert_eq!(engine.cache_ttls.lookup, Duration::from_millis(i64::MAX as u64));

        let cache = crate::catalog::resilience::TtlCache::new();
        cache.set("k", 1, engine.cache_ttls.lookup);
        tokio::time::advance(Duration::from_secs(3600)).await;
        assert_eq!(cache.get(&"k"), Some(1));

        let limiter = crate::catalog::resilience::RateLimiter::new(engine.rate_limit);
        let spotify = ProviderId::new("spotify");
        assert!(limiter.acquire(&spotify).is_allowed());
        tokio::time::advance(Duration::from_secs(3600)).await;
        assert!(!limiter.acquire(&spotify).is_allowed());
    }

    #[test]
    fn test_credential_helpers() {
        let mut config = Config::default();
        assert!(config.credential().is_none());

        config.set_credential(Some(&Credential::new("a", "r")));
        let credential = config.credential().unwrap();
        assert_eq!(credential.access_token, "a");
        assert_eq!(credential.refresh_token, "r");

        config.set_credential(None);
        assert!(config.credentials.access_token.is_none());
        assert!(config.credentials.refresh_token.is_none());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.api.base_url = "https://catalog.example/api".to_string();
        if let Some(lastfm) = config.provider_mut(&ProviderId::new("lastfm")) {
            lastfm.routing.enabled = false;
        }
        save_to(&config, &path).unwrap();

        let loaded = load_from(&path);
        assert_eq!(loaded.api.base_url, "https://catalog.example/api");
        assert!(!loaded.providers[1].routing.enabled);
        assert!(!path.with_extension("toml.tmp").exists());
    }

    #[test]
    fn test_unparseable_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is = = not toml").unwrap();

        let config = load_from(&path);
        assert_eq!(config.providers.len(), 2);
    }

    #[tokio::test]
    async fn test_save_async() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        save_async(Config::default(), path.clone()).await.unwrap();
        assert!(path.exists());
    }
}
