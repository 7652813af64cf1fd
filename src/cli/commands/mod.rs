//! CLI command definitions and dispatch.
//!
//! Each subcommand is implemented in its own submodule:
//! - `search`: Fused search, recommendations and track lookup
//! - `providers`: Provider listing and configuration

mod providers;
mod search;
mod session;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::runtime::Runtime;

pub use providers::{cmd_config_path, cmd_provider, cmd_providers};
pub use search::{cmd_recommend, cmd_search, cmd_track};

/// Catalog Fusion CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (default: OS config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Catalog backend base URL
    #[arg(long, global = true, env = "CATALOG_API_URL")]
    pub api_url: Option<String>,

    /// Access token (overrides the config file)
    #[arg(long, global = true, env = "CATALOG_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Refresh token (overrides the config file)
    #[arg(long, global = true, env = "CATALOG_REFRESH_TOKEN", hide_env_values = true)]
    pub refresh_token: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Search all enabled providers and fuse the results
    Search {
        /// Search text
        query: String,
        /// Maximum number of tracks
        #[arg(short, long, default_value = "20")]
        limit: u32,
        /// Keep duplicates and fill by provider weight instead of deduplicating
        #[arg(long)]
        no_merge: bool,
        /// Only query these providers
        #[arg(short, long = "provider")]
        providers: Vec<String>,
        /// Print the response envelope as JSON
        #[arg(long)]
        json: bool,
    },
    /// Recommendations from seed tracks, artists or genres
    Recommend {
        /// Seed track ID
        #[arg(long = "track")]
        tracks: Vec<String>,
        /// Seed artist
        #[arg(long = "artist")]
        artists: Vec<String>,
        /// Seed genre
        #[arg(long = "genre")]
        genres: Vec<String>,
        /// Maximum number of tracks
        #[arg(short, long, default_value = "20")]
        limit: u32,
        /// Print the response envelope as JSON
        #[arg(long)]
        json: bool,
    },
    /// Look up a single track on one provider
    Track {
        /// Provider ID (e.g. spotify)
        provider: String,
        /// Provider-scoped track ID
        id: String,
        /// Print the response envelope as JSON
        #[arg(long)]
        json: bool,
    },
    /// List configured providers
    Providers {
        /// Print the response envelope as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show or change one provider's routing
    Provider {
        /// Provider ID
        id: String,
        /// Enable the provider
        #[arg(long, conflicts_with = "disable")]
        enable: bool,
        /// Disable the provider
        #[arg(long)]
        disable: bool,
        /// Priority (lower wins on duplicates)
        #[arg(long)]
        priority: Option<u32>,
        /// Share of results, 0.0-1.0
        #[arg(long)]
        weight: Option<f32>,
    },
    /// Print the config file location
    ConfigPath,
}

/// Run the specified CLI command.
///
/// Returns `Ok(true)` if a command was run, `Ok(false)` if no command was
/// specified (the caller prints help).
pub fn run_command(cli: &Cli) -> anyhow::Result<bool> {
    let Some(command) = &cli.command else {
        return Ok(false);
    };

    match command {
        Commands::Search {
            query,
            limit,
            no_merge,
            providers,
            json,
        } => {
            let rt = Runtime::new()?;
            cmd_search(&rt, cli, query, *limit, !*no_merge, providers, *json)?;
        }
        Commands::Recommend {
            tracks,
            artists,
            genres,
            limit,
            json,
        } => {
            let rt = Runtime::new()?;
            let seeds = crate::catalog::RecommendationSeeds {
                track_ids: tracks.clone(),
                artists: artists.clone(),
                genres: genres.clone(),
            };
            cmd_recommend(&rt, cli, &seeds, *limit, *json)?;
        }
        Commands::Track { provider, id, json } => {
            let rt = Runtime::new()?;
            cmd_track(&rt, cli, provider, id, *json)?;
        }
        Commands::Providers { json } => cmd_providers(cli, *json)?,
        Commands::Provider {
            id,
            enable,
            disable,
            priority,
            weight,
        } => {
            let enabled = match (enable, disable) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            cmd_provider(cli, id, enabled, *priority, *weight)?;
        }
        Commands::ConfigPath => cmd_config_path(cli)?,
    }
    Ok(true)
}

// ============================================================================
// Shared helper functions
// ============================================================================

/// Print a serializable value as a JSON envelope
pub(crate) fn print_envelope<T: serde::Serialize>(envelope: &crate::catalog::Envelope<T>) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(envelope)?);
    Ok(())
}

/// Format milliseconds as m:ss
pub(crate) fn format_duration(ms: u64) -> String {
    let secs = ms / 1000;
    format!("{}:{:02}", secs / 60, secs % 60)
}
