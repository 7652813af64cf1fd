//! Provider configuration commands.

use super::session::{effective_config, resolve_config_path};
use super::{Cli, print_envelope};
use crate::catalog::{Envelope, ProviderConfig, ProviderId, ProviderPatch};
use crate::config;
use crate::error::{Error, ResultExt};

/// List configured providers
pub fn cmd_providers(cli: &Cli, json: bool) -> anyhow::Result<()> {
    let path = resolve_config_path(cli)?;
    let config = effective_config(cli, config::load_from(&path));

    if json {
        let routing: Vec<&ProviderConfig> = config.providers.iter().map(|p| &p.routing).collect();
        return print_envelope(&Envelope::ok(routing));
    }

    println!("Providers ({:?})", path);
    println!("==========");
    for entry in &config.providers {
        let p = &entry.routing;
        let state = if p.enabled { "enabled " } else { "disabled" };
        let base = entry
            .path
            .clone()
            .unwrap_or_else(|| format!("/{}", p.id));
        println!(
            "  {:<10} {}  priority {:<3} weight {:.2}  {}",
            p.id, state, p.priority, p.weight, base
        );
    }
    Ok(())
}

/// Show or update a single provider's routing, saving the result
pub fn cmd_provider(
    cli: &Cli,
    id: &str,
    enabled: Option<bool>,
    priority: Option<u32>,
    weight: Option<f32>,
) -> anyhow::Result<()> {
    let path = resolve_config_path(cli)?;
    let mut config = config::load_from(&path);
    let provider = ProviderId::new(id);

    let patch = ProviderPatch {
        enabled,
        priority,
        weight,
    };
    let updated = apply_patch(&mut config, &provider, &patch)?;

    if !patch.is_empty() {
        config::save_to(&config, &path).with_context(format!("while saving {:?}", path))?;
        tracing::info!("Provider {} updated", provider);
    }

    println!(
        "{}: {} (priority {}, weight {:.2})",
        updated.id,
        if updated.enabled { "enabled" } else { "disabled" },
        updated.priority,
        updated.weight
    );
    Ok(())
}

/// Validate and apply `patch` to the provider in `config`
fn apply_patch(
    config: &mut config::Config,
    provider: &ProviderId,
    patch: &ProviderPatch,
) -> crate::error::Result<ProviderConfig> {
    let entry = config
        .provider_mut(provider)
        .ok_or_else(|| Error::invalid_argument(format!("no provider named {}", provider)))?;
    let updated = patch
        .apply_to(&entry.routing)
        .with_context(format!("while updating {}", provider))?;
    entry.routing = updated.clone();
    Ok(updated)
}

/// Print the config file location
pub fn cmd_config_path(cli: &Cli) -> anyhow::Result<()> {
    let path = resolve_config_path(cli)?;
    println!("{}", path.display());
    if !path.exists() {
        println!("(not created yet; defaults are in use)");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogError;
    use crate::config::Config;

    #[test]
    fn test_apply_patch_updates_entry() {
        let mut config = Config::default();
        let lastfm = ProviderId::new("lastfm");
        let updated = apply_patch(
            &mut config,
            &lastfm,
            &ProviderPatch::default().enabled(false).weight(0.25),
        )
        .unwrap();

        assert!(!updated.enabled);
        assert!(!config.providers[1].routing.enabled);
        assert_eq!(config.providers[1].routing.weight, 0.25);
    }

    #[test]
    fn test_apply_patch_rejects_bad_weight() {
        let mut config = Config::default();
        let err = apply_patch(
            &mut config,
            &ProviderId::new("spotify"),
            &ProviderPatch::default().weight(-0.1),
        )
        .unwrap_err();

        assert!(matches!(err.catalog(), Some(CatalogError::InvalidConfig(_))));
        assert_eq!(config.providers[0].routing.weight, 0.5);
    }

    #[test]
    fn test_apply_patch_unknown_provider() {
        let mut config = Config::default();
        let err = apply_patch(&mut config, &ProviderId::new("tidal"), &ProviderPatch::default());
        assert!(matches!(err, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_provider_command_persists_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cli = <Cli as clap::Parser>::try_parse_from([
            "catalog-fusion",
            "--config",
            path.to_str().unwrap(),
            "provider",
            "spotify",
            "--priority",
            "9",
        ])
        .unwrap();

        cmd_provider(&cli, "spotify", None, Some(9), None).unwrap();
        let saved = config::load_from(&path);
        assert_eq!(saved.providers[0].routing.priority, 9);
    }
}
