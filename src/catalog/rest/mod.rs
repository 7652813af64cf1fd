//! HTTP-backed provider client
//!
//! Talks to one provider's routes on the catalog backend through the
//! [`AuthGateway`](crate::catalog::auth::AuthGateway).

mod adapter;
mod client;
pub mod dto;

pub use adapter::{to_search_page, to_track, to_tracks};
pub use client::RestCatalogClient;
