//! Catalog Fusion - resilient access to rate-limited music catalog providers.
//!
//! The library exposes the [`catalog`] layer (auth, resilience, provider
//! clients and the aggregation engine) plus the configuration and CLI
//! used by the `catalog-fusion` binary.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
#[cfg(test)]
pub mod test_utils;
