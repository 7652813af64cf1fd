//! Fusing per-provider result lists into one.
//!
//! Two strategies:
//! - [`merge_by_priority`] - dedup on title/artist, the copy from the
//!   numerically lowest-priority provider wins, output sorted by priority
//! - [`concat_by_weight`] - no dedup, each provider contributes its
//!   weight-implied share
//!
//! Both are deterministic for the same inputs: ties are broken by the
//! order providers are passed in, then by each provider's own ordering.

use std::collections::HashSet;

use super::domain::{NormalizedTrack, ProviderConfig};

/// One provider's successful contribution to a merge.
#[derive(Debug, Clone)]
pub struct ProviderTracks<'a> {
    pub config: &'a ProviderConfig,
    pub tracks: &'a [NormalizedTrack],
}

/// Deduplicate by title/artist, keeping the preferred provider's copy.
pub fn merge_by_priority(inputs: &[ProviderTracks<'_>], limit: usize) -> Vec<NormalizedTrack> {
    let mut order: Vec<usize> = (0..inputs.len()).collect();
    // Stable sort keeps caller order for equal priorities
    order.sort_by_key(|&i| inputs[i].config.priority);

    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for i in order {
        for track in inputs[i].tracks {
            if seen.insert(track.dedup_key()) {
                merged.push(track.clone());
            }
        }
    }
    merged.truncate(limit);
    merged
}

/// Concatenate provider lists in priority order, each capped to its share.
pub fn concat_by_weight(
    inputs: &[ProviderTracks<'_>],
    limit: usize,
) -> Vec<NormalizedTrack> {
    let mut order: Vec<usize> = (0..inputs.len()).collect();
    order.sort_by_key(|&i| inputs[i].config.priority);

    let mut combined = Vec::new();
    for i in order {
        let share = inputs[i].config.share_of(limit as u32) as usize;
        combined.extend(inputs[i].tracks.iter().take(share).cloned());
    }
    combined.truncate(limit);
    combined
}
