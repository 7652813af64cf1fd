//! Resilient catalog access - fuses several rate-limited music catalogs.
//!
//! # Architecture
//!
//! This module follows a clean separation between:
//! - **Domain models** (`domain.rs`) - Internal track, provider and error types
//! - **Auth** (`auth/`) - Bearer credentials with single-flight refresh
//! - **Resilience** (`resilience/`) - Rate limiter, circuit breaker, TTL cache,
//!   retry executor and error statistics
//! - **REST client** (`rest/`) - DTOs, adapters and the HTTP provider client
//! - **Merge** (`merge.rs`) - Deduplication and weighted concatenation
//! - **Engine** (`engine.rs`) - Fan-out orchestration across providers
//!
//! # Usage
//!
//! ```ignore
//! use catalog_fusion::catalog::{AggregationEngine, EngineConfig, SearchRequest};
//!
//! let engine = AggregationEngine::builder(EngineConfig::default())
//!     .provider(spotify, ProviderConfig::new("spotify", 1, 0.5))
//!     .provider(lastfm, ProviderConfig::new("lastfm", 2, 0.5))
//!     .build()?;
//!
//! let result = engine.search(&SearchRequest::new("hey jude").limit(20)).await?;
//! for track in &result.tracks {
//!     println!("{} - {} ({})", track.artist, track.title, track.source_provider);
//! }
//! ```

pub mod auth;
pub mod domain;
pub mod engine;
pub mod envelope;
pub mod merge;
pub mod resilience;
pub mod rest;
pub mod traits;

pub use domain::{
    CatalogError, ErrorKind, NormalizedTrack, ProviderConfig, ProviderId, ProviderPatch,
    RecommendationSeeds, SearchPage,
};
pub use engine::{
    AggregatedResult, AggregationEngine, CacheTtls, EngineBuilder, EngineConfig, ProviderHealth,
    ProviderResult, ProviderStatus, SearchRequest,
};
pub use envelope::Envelope;
pub use rest::RestCatalogClient;
pub use traits::ProviderClient;
