//! Search, recommendation and lookup commands.

use tokio::runtime::Runtime;

use super::session::Session;
use super::{Cli, format_duration, print_envelope};
use crate::catalog::{
    AggregatedResult, CatalogError, Envelope, NormalizedTrack, ProviderId, ProviderStatus,
    RecommendationSeeds, SearchRequest,
};

/// Fused search across providers
pub fn cmd_search(
    rt: &Runtime,
    cli: &Cli,
    query: &str,
    limit: u32,
    merge: bool,
    providers: &[String],
    json: bool,
) -> anyhow::Result<()> {
    let mut request = SearchRequest::new(query).limit(limit).merge(merge);
    if !providers.is_empty() {
        request = request.providers(providers.iter().map(|p| ProviderId::new(p.as_str())));
    }

    rt.block_on(async {
        let session = Session::open(cli)?;
        let result = session.engine.search(&request).await;
        session.close().await?;
        report_aggregated(result, json)
    })
}

/// Recommendations from seeds
pub fn cmd_recommend(
    rt: &Runtime,
    cli: &Cli,
    seeds: &RecommendationSeeds,
    limit: u32,
    json: bool,
) -> anyhow::Result<()> {
    rt.block_on(async {
        let session = Session::open(cli)?;
        let result = session.engine.recommendations(seeds, limit).await;
        session.close().await?;
        report_aggregated(result, json)
    })
}

/// Single track lookup
pub fn cmd_track(rt: &Runtime, cli: &Cli, provider: &str, id: &str, json: bool) -> anyhow::Result<()> {
    rt.block_on(async {
        let session = Session::open(cli)?;
        let result = session.engine.track(&ProviderId::new(provider), id).await;
        session.close().await?;

        if json {
            let failed = result.is_err();
            print_envelope(&Envelope::from(result))?;
            if failed {
                std::process::exit(1);
            }
            return Ok(());
        }

        let track = result?;
        println!("{}", describe(&track));
        println!("  ID:       {}", track.id);
        if let Some(album) = &track.album {
            println!("  Album:    {}", album);
        }
        if let Some(url) = &track.preview_url {
            println!("  Preview:  {}", url);
        }
        if let Some(url) = &track.artwork_url {
            println!("  Artwork:  {}", url);
        }
        Ok(())
    })
}

fn report_aggregated(result: Result<AggregatedResult, CatalogError>, json: bool) -> anyhow::Result<()> {
    if json {
        let failed = result.is_err();
        print_envelope(&Envelope::from(result))?;
        if failed {
            std::process::exit(1);
        }
        return Ok(());
    }

    let result = result?;
    if result.tracks.is_empty() {
        println!("No tracks found.");
    }
    for (i, track) in result.tracks.iter().enumerate() {
        println!("{:>3}. {}", i + 1, describe(track));
    }

    println!();
    let cached = if result.from_cache { " (cached)" } else { "" };
    println!("{} of {} matches{}", result.tracks.len(), result.total, cached);
    for provider in &result.per_provider_results {
        match provider.status {
            ProviderStatus::Succeeded => {
                println!("  ✓ {:<10} {} tracks", provider.provider, provider.tracks.len())
            }
            ProviderStatus::Failed | ProviderStatus::Skipped => println!(
                "  ✗ {:<10} {}",
                provider.provider,
                provider.error.as_deref().unwrap_or("failed")
            ),
        }
    }
    Ok(())
}

/// One-line summary: `Artist - Title (m:ss) [provider]`
fn describe(track: &NormalizedTrack) -> String {
    let mut line = format!("{} - {}", track.artist, track.title);
    if track.duration_ms > 0 {
        line.push_str(&format!(" ({})", format_duration(track.duration_ms)));
    }
    line.push_str(&format!(" [{}]", track.source_provider));
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::track_from;

    #[test]
    fn test_describe_track() {
        let track = track_from("spotify", "Hey Jude", "The Beatles");
        assert_eq!(describe(&track), "The Beatles - Hey Jude (3:00) [spotify]");
    }

    #[test]
    fn test_describe_omits_unknown_duration() {
        let mut track = track_from("lastfm", "Song", "Band");
        track.duration_ms = 0;
        assert_eq!(describe(&track), "Band - Song [lastfm]");
    }
}
