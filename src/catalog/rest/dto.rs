//! Catalog API Data Transfer Objects
//!
//! These types match EXACTLY what the catalog backend returns for each
//! provider route. Every response is wrapped in the `{success, data, error}`
//! envelope.
//! DO NOT use these types outside the rest module - convert to domain types.

use serde::{Deserialize, Serialize};

/// Track as serialized by the backend
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackDto {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    /// Primary artist name
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub album: Option<String>,
    /// Duration in milliseconds
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub artwork_url: Option<String>,
    #[serde(default)]
    pub preview_url: Option<String>,
}

/// `GET /{provider}/search` payload
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub items: Vec<TrackDto>,
    #[serde(default)]
    pub total: Option<u32>,
}

/// `GET /{provider}/recommendations` payload
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecommendationsResponse {
    #[serde(default)]
    pub items: Vec<TrackDto>,
}
