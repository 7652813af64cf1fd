//! Wiring for commands that talk to the catalog backend.
//!
//! Loads the config, applies command-line overrides, builds the gateway
//! and engine, and writes credential changes back when the command ends.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::Cli;
use crate::catalog::auth::{
    AuthGateway, Credential, HttpTransport, MemoryTokenStore, ReqwestTransport, SessionStatus,
};
use crate::catalog::{AggregationEngine, ProviderClient, RestCatalogClient};
use crate::config::{self, Config};

/// Resolve the config file location from `--config` or the OS default.
pub(crate) fn resolve_config_path(cli: &Cli) -> anyhow::Result<PathBuf> {
    cli.config
        .clone()
        .or_else(config::config_path)
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory; pass --config"))
}

/// Config with command-line/environment overrides applied.
pub(crate) fn effective_config(cli: &Cli, mut config: Config) -> Config {
    if let Some(url) = &cli.api_url {
        config.api.base_url = url.clone();
    }
    if let Some(token) = &cli.access_token {
        config.credentials.access_token = Some(token.clone());
    }
    if let Some(token) = &cli.refresh_token {
        config.credentials.refresh_token = Some(token.clone());
    }
    config
}

/// Build an engine over REST clients for every configured provider.
pub(crate) fn build_engine(config: &Config, gateway: &AuthGateway) -> anyhow::Result<AggregationEngine> {
    let mut builder = AggregationEngine::builder(config.engine_config());
    for entry in &config.providers {
        let id = entry.routing.id.clone();
        let client = match &entry.path {
            Some(path) => RestCatalogClient::with_base_path(id, gateway.clone(), path.as_str()),
            None => RestCatalogClient::new(id, gateway.clone()),
        };
        builder = builder.provider(Arc::new(client) as Arc<dyn ProviderClient>, entry.routing.clone());
    }
    Ok(builder.build()?)
}

/// One command's connection to the catalog.
pub(crate) struct Session {
    pub engine: AggregationEngine,
    gateway: AuthGateway,
    config_path: PathBuf,
    initial: Option<Credential>,
}

impl Session {
    pub fn open(cli: &Cli) -> anyhow::Result<Self> {
        let config_path = resolve_config_path(cli)?;
        let config = effective_config(cli, config::load_from(&config_path));

        let transport = ReqwestTransport::new(
            config.api.base_url.as_str(),
            Duration::from_millis(config.api.request_timeout_ms),
        )?;
        let initial = config.credential();
        if initial.is_none() {
            tracing::warn!("No access token configured; set CATALOG_ACCESS_TOKEN or [credentials]");
        }
        let tokens = Arc::new(MemoryTokenStore::new(initial.clone()));
        let gateway = AuthGateway::new(Arc::new(transport) as Arc<dyn HttpTransport>, tokens);
        let engine = build_engine(&config, &gateway)?;

        Ok(Self {
            engine,
            gateway,
            config_path,
            initial,
        })
    }

    /// Drain the engine and persist a refreshed or cleared credential.
    pub async fn close(self) -> anyhow::Result<()> {
        self.engine.shutdown().await;

        let current = match self.gateway.session_status() {
            SessionStatus::LoggedOut => None,
            SessionStatus::Active => self.gateway.credential(),
        };
        if current == self.initial {
            return Ok(());
        }

        if current.is_none() {
            tracing::warn!("Session logged out, clearing stored credentials");
        }
        // Re-read so overrides from flags/env aren't written as file settings
        let mut on_disk = config::load_from(&self.config_path);
        on_disk.set_credential(current.as_ref());
        config::save_async(on_disk, self.config_path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_overrides_win_over_file() {
        let cli = Cli::try_parse_from([
            "catalog-fusion",
            "--api-url",
            "https://override.example",
            "--access-token",
            "flag-token",
            "providers",
        ])
        .unwrap();
        let mut file = Config::default();
        file.credentials.access_token = Some("file-token".to_string());

        let config = effective_config(&cli, file);
        assert_eq!(config.api.base_url, "https://override.example");
        assert_eq!(config.credentials.access_token.as_deref(), Some("flag-token"));
    }

    #[test]
    fn test_build_engine_uses_configured_providers() {
        let (gateway, _transport) = crate::test_utils::mock_gateway("good");
        let mut config = Config::default();
        config.providers[1].path = Some("/v2/lastfm".to_string());

        let engine = build_engine(&config, &gateway).unwrap();
        let ids: Vec<_> = engine.providers().into_iter().map(|p| p.id.to_string()).collect();
        assert_eq!(ids, vec!["spotify", "lastfm"]);
    }

    #[test]
    fn test_build_engine_rejects_invalid_weight() {
        let (gateway, _transport) = crate::test_utils::mock_gateway("good");
        let mut config = Config::default();
        config.providers[0].routing.weight = 3.0;
        assert!(build_engine(&config, &gateway).is_err());
    }
}
