//! Catalog backend HTTP client for a single provider
//!
//! Routes (relative to the API base URL, `{base}` = provider base path):
//! - `GET {base}/search?q=&limit=&offset=`
//! - `GET {base}/recommendations?seed_tracks=&seed_artists=&seed_genres=&limit=`
//! - `GET {base}/tracks/{id}`

use async_trait::async_trait;

use super::{adapter, dto};
use crate::catalog::auth::{ApiRequest, AuthGateway};
use crate::catalog::domain::{
    CatalogError, NormalizedTrack, ProviderId, RecommendationSeeds, SearchPage,
};
use crate::catalog::envelope::Envelope;
use crate::catalog::traits::ProviderClient;

/// Provider client backed by the authenticated catalog API
pub struct RestCatalogClient {
    id: ProviderId,
    gateway: AuthGateway,
    base_path: String,
}

impl RestCatalogClient {
    /// Client for `id` using the default `/{id}` base path
    pub fn new(id: ProviderId, gateway: AuthGateway) -> Self {
        let base_path = format!("/{}", id);
        Self::with_base_path(id, gateway, base_path)
    }

    pub fn with_base_path(id: ProviderId, gateway: AuthGateway, base_path: impl Into<String>) -> Self {
        let base_path = base_path.into();
        let base_path = format!("/{}", base_path.trim_matches('/'));
        Self {
            id,
            gateway,
            base_path,
        }
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Send a request and unwrap the backend envelope
    async fn fetch<T: serde::de::DeserializeOwned + Send>(
        &self,
        request: ApiRequest,
    ) -> Result<T, CatalogError> {
        let envelope: Envelope<T> = self.gateway.call_json(&request).await?;
        envelope.into_result().map_err(|message| {
            CatalogError::Unknown(format!("{} reported failure: {}", self.id, message))
        })
    }
}

#[async_trait]
impl ProviderClient for RestCatalogClient {
    fn id(&self) -> &ProviderId {
        &self.id
    }

    async fn search(
        &self,
        query: &str,
        limit: u32,
        offset: u32,
    ) -> Result<SearchPage, CatalogError> {
        let request = ApiRequest::get(format!("{}/search", self.base_path))
            .query("q", query)
            .query("limit", limit)
            .query("offset", offset);
        let response: dto::SearchResponse = self.fetch(request).await?;
        Ok(adapter::to_search_page(&self.id, response))
    }

    async fn recommendations(
        &self,
        seeds: &RecommendationSeeds,
        limit: u32,
    ) -> Result<Vec<NormalizedTrack>, CatalogError> {
        let mut request = ApiRequest::get(format!("{}/recommendations", self.base_path));
        if !seeds.track_ids.is_empty() {
            request = request.query("seed_tracks", seeds.track_ids.join(","));
        }
        if !seeds.artists.is_empty() {
            request = request.query("seed_artists", seeds.artists.join(","));
        }
        if !seeds.genres.is_empty() {
            request = request.query("seed_genres", seeds.genres.join(","));
        }
        let request = request.query("limit", limit);

        let response: dto::RecommendationsResponse = self.fetch(request).await?;
        Ok(adapter::to_tracks(&self.id, response.items))
    }

    async fn track(&self, id: &str) -> Result<NormalizedTrack, CatalogError> {
        let request = ApiRequest::get(format!(
            "{}/tracks/{}",
            self.base_path,
            urlencoding::encode(id)
        ));
        let response: dto::TrackDto = self.fetch(request).await?;
        adapter::to_track(&self.id, response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::catalog::auth::transport::mocks::MockTransport;
    use crate::catalog::auth::{Credential, HttpTransport, MemoryTokenStore};

    fn client_with_body(body: &str) -> (RestCatalogClient, Arc<MockTransport>) {
        let mut transport = MockTransport::accepting("good");
        transport.body = body.to_string();
        let transport = Arc::new(transport);
        let tokens = Arc::new(MemoryTokenStore::new(Some(Credential::new("good", "r"))));
        let gateway = AuthGateway::new(Arc::clone(&transport) as Arc<dyn HttpTransport>, tokens);
        (
            RestCatalogClient::new(ProviderId::new("spotify"), gateway),
            transport,
        )
    }

    #[test]
    fn test_base_path_normalized() {
        let (client, _) = client_with_body("{}");
        assert_eq!(client.base_path(), "/spotify");

        let custom = RestCatalogClient::with_base_path(
            ProviderId::new("lastfm"),
            client.gateway.clone(),
            "api/lastfm/",
        );
        assert_eq!(custom.base_path(), "/api/lastfm");
    }

    #[tokio::test]
    async fn test_search_parses_envelope() {
        let body = r#"{"success":true,"data":{"items":[
            {"id":"1","title":"Song","artist":"Band","durationMs":1000}
        ],"total":7}}"#;
        let (client, transport) = client_with_body(body);

        let page = client.search("song", 5, 0).await.unwrap();
        assert_eq!(page.total, 7);
        assert_eq!(page.items[0].source_provider, ProviderId::new("spotify"));
        assert_eq!(transport.api_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_envelope_is_error() {
        let (client, _) = client_with_body(r#"{"success":false,"error":"quota"}"#);
        let result = client.search("song", 5, 0).await;
        match result {
            Err(CatalogError::Unknown(message)) => assert!(message.contains("quota")),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_garbage_body_is_parse_error() {
        let (client, _) = client_with_body("<html>");
        let result = client.track("1").await;
        assert!(matches!(result, Err(CatalogError::Parse(_))));
    }
}
