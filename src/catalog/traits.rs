//! Trait definitions for upstream catalog providers.
//!
//! The aggregation engine only talks to providers through
//! [`ProviderClient`], so tests can substitute mock implementations and
//! a new provider only needs an adapter, not engine changes.
//!
//! # Example
//!
//! ```ignore
//! use catalog_fusion::catalog::traits::ProviderClient;
//!
//! async fn first_hit<P: ProviderClient>(client: &P) -> Option<NormalizedTrack> {
//!     let page = client.search("hey jude", 1, 0).await.ok()?;
//!     page.items.into_iter().next()
//! }
//! ```

use async_trait::async_trait;

use super::domain::{CatalogError, NormalizedTrack, ProviderId, RecommendationSeeds, SearchPage};

/// Search/lookup capability of one upstream catalog.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Which provider this client talks to.
    fn id(&self) -> &ProviderId;

    /// Full-text track search.
    async fn search(&self, query: &str, limit: u32, offset: u32)
    -> Result<SearchPage, CatalogError>;

    /// Tracks recommended for the given seeds.
    async fn recommendations(
        &self,
        seeds: &RecommendationSeeds,
        limit: u32,
    ) -> Result<Vec<NormalizedTrack>, CatalogError>;

    /// Look up a single track by its provider-scoped ID.
    async fn track(&self, id: &str) -> Result<NormalizedTrack, CatalogError>;
}
