//! Adapter layer: Convert catalog API DTOs to domain models
//!
//! This is the ONLY place where rest DTO types are converted to domain types.

use super::dto;
use crate::catalog::domain::{CatalogError, NormalizedTrack, ProviderId, SearchPage};

/// Convert one track, rejecting entries without a title or artist.
pub fn to_track(provider: &ProviderId, track: dto::TrackDto) -> Result<NormalizedTrack, CatalogError> {
    let title = non_blank(track.title).ok_or_else(|| {
        CatalogError::Parse(format!("{} track {} has no title", provider, track.id))
    })?;
    let artist = non_blank(track.artist).ok_or_else(|| {
        CatalogError::Parse(format!("{} track {} has no artist", provider, track.id))
    })?;

    Ok(NormalizedTrack {
        id: track.id,
        title,
        artist,
        album: non_blank(track.album),
        duration_ms: track.duration_ms.unwrap_or(0),
        artwork_url: non_blank(track.artwork_url),
        preview_url: non_blank(track.preview_url),
        source_provider: provider.clone(),
    })
}

/// Convert a list, skipping malformed entries.
pub fn to_tracks(provider: &ProviderId, items: Vec<dto::TrackDto>) -> Vec<NormalizedTrack> {
    items
        .into_iter()
        .filter_map(|item| match to_track(provider, item) {
            Ok(track) => Some(track),
            Err(e) => {
                tracing::debug!("Skipping malformed item: {}", e);
                None
            }
        })
        .collect()
}

/// Convert a search response into a page.
pub fn to_search_page(provider: &ProviderId, response: dto::SearchResponse) -> SearchPage {
    let reported_total = response.total;
    let items = to_tracks(provider, response.items);
    let total = reported_total.unwrap_or(items.len() as u32);
    SearchPage { items, total }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
