//! Aggregation engine - answers one logical query from all providers
//!
//! For every enabled provider, concurrently:
//! 1. Ask the circuit breaker (open circuit: skip, no I/O)
//! 2. Ask the rate limiter (denied: skip, no retry consumed)
//! 3. Call the provider through the retry executor
//! 4. Report the outcome to the breaker and error statistics
//!
//! Then fuse the per-provider lists (priority dedup or weighted concat),
//! cache the fused result and return it. The call only fails when every
//! selected provider failed; partial data is always a success.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::Notify;

use super::domain::{
    CatalogError, ErrorKind, NormalizedTrack, ProviderConfig, ProviderId, ProviderPatch,
    RecommendationSeeds, SearchPage,
};
use super::merge::{self, ProviderTracks};
use super::resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot, Decision, ErrorStats,
    ErrorStatsSnapshot, RateLimitConfig, RateLimiter, RetryExecutor, RetryPolicy, TtlCache,
    cache::ttl,
};
use super::traits::ProviderClient;

// ============================================================================
// Configuration
// ============================================================================

/// Cache lifetimes per logical operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheTtls {
    pub merged_search: Duration,
    pub provider_search: Duration,
    pub recommendations: Duration,
    pub lookup: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            merged_search: ttl::MERGED_SEARCH,
            provider_search: ttl::PROVIDER_SEARCH,
            recommendations: ttl::RECOMMENDATIONS,
            lookup: ttl::LOOKUP,
        }
    }
}

/// Tunables for the engine and the components it builds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineConfig {
    pub circuit_breaker: CircuitBreakerConfig,
    pub retry: RetryPolicy,
    pub rate_limit: RateLimitConfig,
    pub cache_ttls: CacheTtls,
    /// Outer deadline for each provider's part of a call
    pub deadline: Option<Duration>,
}

// ============================================================================
// Requests and results
// ============================================================================

/// A fused search request.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: String,
    pub limit: u32,
    /// Restrict to these providers (`None` = all enabled)
    pub providers: Option<Vec<ProviderId>>,
    /// Dedup by title/artist (true) or concatenate weighted shares (false)
    pub merge: bool,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            limit: 20,
            providers: None,
            merge: true,
        }
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn providers(mut self, providers: impl IntoIterator<Item = ProviderId>) -> Self {
        self.providers = Some(providers.into_iter().collect());
        self
    }

    pub fn merge(mut self, merge: bool) -> Self {
        self.merge = merge;
        self
    }

    fn cache_key(&self) -> String {
        format!(
            "search|{}|{}|{}|{}",
            normalize_query(&self.query),
            self.limit,
            self.merge,
            provider_list_key(self.providers.as_deref())
        )
    }
}

/// How a provider fared in one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    Succeeded,
    /// Attempted and failed
    Failed,
    /// Not attempted: circuit open or local budget exhausted
    Skipped,
}

/// One provider's contribution to an aggregated result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderResult {
    pub provider: ProviderId,
    pub status: ProviderStatus,
    pub tracks: Vec<NormalizedTrack>,
    pub total: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

/// Fused answer to a search or recommendation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedResult {
    pub tracks: Vec<NormalizedTrack>,
    pub per_provider_results: Vec<ProviderResult>,
    /// Sum of the totals reported by successful providers
    pub total: u32,
    pub from_cache: bool,
}

/// Routing and circuit state of one provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderHealth {
    pub config: ProviderConfig,
    pub circuit: CircuitSnapshot,
}

// ============================================================================
// Engine
// ============================================================================

struct ProviderSlot {
    client: Arc<dyn ProviderClient>,
    config: ProviderConfig,
}

/// Provider list captured for one call, so no lock is held across I/O.
type Selection = Vec<(Arc<dyn ProviderClient>, ProviderConfig)>;

/// Tracks in-flight calls so shutdown can drain them.
#[derive(Default)]
struct Lifecycle {
    closed: AtomicBool,
    in_flight: AtomicUsize,
    drained: Notify,
}

struct InFlight<'a>(&'a Lifecycle);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.0.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.drained.notify_waiters();
        }
    }
}

impl Lifecycle {
    fn enter(&self) -> Result<InFlight<'_>, CatalogError> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = InFlight(self);
        if self.closed.load(Ordering::SeqCst) {
            return Err(CatalogError::ShutDown);
        }
        Ok(guard)
    }

    async fn drain(&self) {
        loop {
            let notified = self.drained.notified();
            if self.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Resilient multi-provider catalog access.
pub struct AggregationEngine {
    providers: RwLock<Vec<ProviderSlot>>,
    breaker: Arc<CircuitBreaker>,
    limiter: Arc<RateLimiter>,
    stats: Arc<ErrorStats>,
    retry: RetryExecutor,
    ttls: CacheTtls,
    deadline: Option<Duration>,
    search_cache: TtlCache<String, AggregatedResult>,
    recommendation_cache: TtlCache<String, AggregatedResult>,
    provider_search_cache: TtlCache<String, SearchPage>,
    lookup_cache: TtlCache<String, NormalizedTrack>,
    lifecycle: Lifecycle,
}

/// Builder for [`AggregationEngine`]. Components not supplied are created
/// from the [`EngineConfig`].
pub struct EngineBuilder {
    config: EngineConfig,
    providers: Vec<ProviderSlot>,
    breaker: Option<Arc<CircuitBreaker>>,
    limiter: Option<Arc<RateLimiter>>,
    stats: Option<Arc<ErrorStats>>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            providers: Vec::new(),
            breaker: None,
            limiter: None,
            stats: None,
        }
    }

    /// Register a provider. Order of registration breaks priority ties.
    pub fn provider(mut self, client: Arc<dyn ProviderClient>, config: ProviderConfig) -> Self {
        self.providers.push(ProviderSlot { client, config });
        self
    }

    pub fn circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    pub fn rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn error_stats(mut self, stats: Arc<ErrorStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn build(self) -> Result<AggregationEngine, CatalogError> {
        for (i, slot) in self.providers.iter().enumerate() {
            slot.config.validate()?;
            if slot.client.id() != &slot.config.id {
                return Err(CatalogError::InvalidConfig(format!(
                    "client {} registered with config for {}",
                    slot.client.id(),
                    slot.config.id
                )));
            }
            if self.providers[..i].iter().any(|s| s.config.id == slot.config.id) {
                return Err(CatalogError::InvalidConfig(format!(
                    "provider {} registered twice",
                    slot.config.id
                )));
            }
        }

        let stats = self.stats.unwrap_or_else(|| Arc::new(ErrorStats::new()));
        let breaker = self
            .breaker
            .unwrap_or_else(|| Arc::new(CircuitBreaker::new(self.config.circuit_breaker)));
        let limiter = self
            .limiter
            .unwrap_or_else(|| Arc::new(RateLimiter::new(self.config.rate_limit)));

        Ok(AggregationEngine {
            providers: RwLock::new(self.providers),
            retry: RetryExecutor::new(self.config.retry, Arc::clone(&stats)),
            breaker,
            limiter,
            stats,
            ttls: self.config.cache_ttls,
            deadline: self.config.deadline,
            search_cache: TtlCache::new(),
            recommendation_cache: TtlCache::new(),
            provider_search_cache: TtlCache::new(),
            lookup_cache: TtlCache::new(),
            lifecycle: Lifecycle::default(),
        })
    }
}

impl AggregationEngine {
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    /// Fused search across providers.
    pub async fn search(&self, request: &SearchRequest) -> Result<AggregatedResult, CatalogError> {
        let _in_flight = self.lifecycle.enter()?;
        validate_query(&request.query)?;
        let limit = request.limit.max(1);

        let key = request.cache_key();
        if let Some(mut cached) = self.search_cache.get(&key) {
            tracing::debug!("Search cache hit for {:?}", request.query);
            cached.from_cache = true;
            return Ok(cached);
        }

        let selection = self.select(request.providers.as_deref())?;
        let query = request.query.trim();

        let rounds = selection.iter().map(|(client, config)| {
            let share = config.share_of(limit);
            self.guarded_call(&config.id, move |_| client.search(query, share, 0))
        });
        let outcomes = futures::future::join_all(rounds).await;

        let result = fuse(&selection, outcomes, limit as usize, request.merge)?;
        self.search_cache
            .set(key, result.clone(), self.ttls.merged_search);
        Ok(result)
    }

    /// Detailed search against a single provider.
    pub async fn search_provider(
        &self,
        provider: &ProviderId,
        query: &str,
        limit: u32,
        offset: u32,
    ) -> Result<SearchPage, CatalogError> {
        let _in_flight = self.lifecycle.enter()?;
        validate_query(query)?;

        let key = format!(
            "provider_search|{}|{}|{}|{}",
            provider,
            normalize_query(query),
            limit,
            offset
        );
        if let Some(page) = self.provider_search_cache.get(&key) {
            return Ok(page);
        }

        let (client, _) = self.selected_one(provider)?;
        let query = query.trim();
        let page = self
            .guarded_call(provider, |_| client.search(query, limit, offset))
            .await?;

        self.provider_search_cache
            .set(key, page.clone(), self.ttls.provider_search);
        Ok(page)
    }

    /// Recommendations from all enabled providers, deduplicated by priority.
    pub async fn recommendations(
        &self,
        seeds: &RecommendationSeeds,
        limit: u32,
    ) -> Result<AggregatedResult, CatalogError> {
        let _in_flight = self.lifecycle.enter()?;
        if seeds.is_empty() {
            return Err(CatalogError::Validation {
                status: 400,
                message: "at least one seed is required".to_string(),
            });
        }
        let limit = limit.max(1);

        let key = format!(
            "recommendations|{}|{}|{}|{}",
            seeds.track_ids.join(","),
            seeds.artists.join(",").to_lowercase(),
            seeds.genres.join(",").to_lowercase(),
            limit
        );
        if let Some(mut cached) = self.recommendation_cache.get(&key) {
            cached.from_cache = true;
            return Ok(cached);
        }

        let selection = self.select(None)?;
        let rounds = selection.iter().map(|(client, config)| {
            let share = config.share_of(limit);
            self.guarded_call(&config.id, move |_| async move {
                let items = client.recommendations(seeds, share).await?;
                let total = items.len() as u32;
                Ok(SearchPage { items, total })
            })
        });
        let outcomes = futures::future::join_all(rounds).await;

        let result = fuse(&selection, outcomes, limit as usize, true)?;
        self.recommendation_cache
            .set(key, result.clone(), self.ttls.recommendations);
        Ok(result)
    }

    /// Look up one track on one provider.
    pub async fn track(
        &self,
        provider: &ProviderId,
        track_id: &str,
    ) -> Result<NormalizedTrack, CatalogError> {
        let _in_flight = self.lifecycle.enter()?;

        let key = format!("track|{}|{}", provider, track_id);
        if let Some(track) = self.lookup_cache.get(&key) {
            return Ok(track);
        }

        let (client, _) = self.selected_one(provider)?;
        let track = self
            .guarded_call(provider, |_| client.track(track_id))
            .await?;

        self.lookup_cache.set(key, track.clone(), self.ttls.lookup);
        Ok(track)
    }

    // ------------------------------------------------------------------------
    // Configuration and observability
    // ------------------------------------------------------------------------

    /// Current provider configuration, in registration order.
    pub fn providers(&self) -> Vec<ProviderConfig> {
        self.providers.read().iter().map(|s| s.config.clone()).collect()
    }

    /// Apply a validated patch to one provider and invalidate all caches.
    pub fn update_provider(
        &self,
        provider: &ProviderId,
        patch: &ProviderPatch,
    ) -> Result<ProviderConfig, CatalogError> {
        let updated = {
            let mut providers = self.providers.write();
            let slot = providers
                .iter_mut()
                .find(|s| &s.config.id == provider)
                .ok_or_else(|| CatalogError::UnknownProvider(provider.clone()))?;
            slot.config = patch.apply_to(&slot.config)?;
            slot.config.clone()
        };

        self.clear_caches();
        tracing::info!(
            "Provider {} updated (enabled={}, priority={}, weight={})",
            updated.id,
            updated.enabled,
            updated.priority,
            updated.weight
        );
        Ok(updated)
    }

    pub fn provider_health(&self) -> Vec<ProviderHealth> {
        self.providers()
            .into_iter()
            .map(|config| ProviderHealth {
                circuit: self.breaker.snapshot(&config.id),
                config,
            })
            .collect()
    }

    pub fn error_stats(&self) -> ErrorStatsSnapshot {
        self.stats.snapshot()
    }

    /// Drop every cached result.
    pub fn clear_caches(&self) {
        self.search_cache.clear();
        self.recommendation_cache.clear();
        self.provider_search_cache.clear();
        self.lookup_cache.clear();
    }

    /// Stop accepting calls, wait for in-flight calls to finish, drop caches.
    pub async fn shutdown(&self) {
        self.lifecycle.closed.store(true, Ordering::SeqCst);
        self.lifecycle.drain().await;
        self.clear_caches();
        tracing::info!("Aggregation engine shut down");
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    /// Enabled providers, optionally restricted to `only`.
    fn select(&self, only: Option<&[ProviderId]>) -> Result<Selection, CatalogError> {
        let selection: Selection = self
            .providers
            .read()
            .iter()
            .filter(|s| s.config.enabled)
            .filter(|s| only.is_none_or(|ids| ids.contains(&s.config.id)))
            .map(|s| (Arc::clone(&s.client), s.config.clone()))
            .collect();

        if selection.is_empty() {
            return Err(CatalogError::InvalidConfig(
                "no enabled providers selected".to_string(),
            ));
        }
        Ok(selection)
    }

    fn selected_one(
        &self,
        provider: &ProviderId,
    ) -> Result<(Arc<dyn ProviderClient>, ProviderConfig), CatalogError> {
        let providers = self.providers.read();
        let slot = providers
            .iter()
            .find(|s| &s.config.id == provider)
            .ok_or_else(|| CatalogError::UnknownProvider(provider.clone()))?;
        if !slot.config.enabled {
            return Err(CatalogError::InvalidConfig(format!(
                "provider {} is disabled",
                provider
            )));
        }
        Ok((Arc::clone(&slot.client), slot.config.clone()))
    }

    /// One provider's round: breaker, limiter, retried call, outcome reporting,
    /// all under the optional outer deadline.
    async fn guarded_call<T, F, Fut>(&self, provider: &ProviderId, operation: F) -> Result<T, CatalogError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, CatalogError>>,
    {
        if !self.breaker.allow(provider) {
            let error = CatalogError::CircuitOpen(provider.clone());
            tracing::debug!("Skipping {}: circuit open", provider);
            self.stats.record_error(provider, &error);
            return Err(error);
        }

        if let Decision::Denied { wait } = self.limiter.acquire(provider) {
            self.breaker.abandon_probe(provider);
            let error = CatalogError::Throttled { wait };
            tracing::debug!("Skipping {}: {}", provider, error);
            self.stats.record_error(provider, &error);
            return Err(error);
        }

        let attempt = self.retry.run(provider, operation);
        let outcome = match self.deadline {
            Some(deadline) => match tokio::time::timeout(deadline, attempt).await {
                Ok(outcome) => outcome,
                Err(_) => Err(CatalogError::Timeout(format!(
                    "{} exceeded the {}ms deadline",
                    provider,
                    deadline.as_millis()
                ))),
            },
            None => attempt.await,
        };

        match &outcome {
            Ok(_) => self.breaker.report(provider, true),
            Err(e) => {
                // A provider that answered (4xx, auth) is reachable; only
                // transport/server trouble counts toward opening the circuit.
                self.breaker.report(provider, !e.counts_as_provider_failure());
                self.stats.record_error(provider, e);
                tracing::warn!("{} failed this round: {}", provider, e);
            }
        }
        outcome
    }
}

/// Turn per-provider outcomes into one result, or fail if none succeeded.
fn fuse(
    selection: &Selection,
    outcomes: Vec<Result<SearchPage, CatalogError>>,
    limit: usize,
    merge_results: bool,
) -> Result<AggregatedResult, CatalogError> {
    let mut per_provider = Vec::with_capacity(outcomes.len());
    let mut total = 0u32;

    for ((_, config), outcome) in selection.iter().zip(outcomes) {
        per_provider.push(match outcome {
            Ok(page) => {
                total = total.saturating_add(page.total);
                ProviderResult {
                    provider: config.id.clone(),
                    status: ProviderStatus::Succeeded,
                    tracks: page.items,
                    total: page.total,
                    error: None,
                    error_kind: None,
                }
            }
            Err(e) => ProviderResult {
                provider: config.id.clone(),
                status: match e {
                    CatalogError::CircuitOpen(_) | CatalogError::Throttled { .. } => {
                        ProviderStatus::Skipped
                    }
                    _ => ProviderStatus::Failed,
                },
                tracks: Vec::new(),
                total: 0,
                error_kind: Some(e.kind()),
                error: Some(e.to_string()),
            },
        });
    }

    if per_provider
        .iter()
        .all(|r| r.status != ProviderStatus::Succeeded)
    {
        let summary = per_provider
            .iter()
            .map(|r| format!("{}: {}", r.provider, r.error.as_deref().unwrap_or("failed")))
            .collect::<Vec<_>>()
            .join("; ");
        return Err(CatalogError::AllProvidersFailed(summary));
    }

    let inputs: Vec<ProviderTracks<'_>> = selection
        .iter()
        .zip(&per_provider)
        .filter(|(_, r)| r.status == ProviderStatus::Succeeded)
        .map(|((_, config), r)| ProviderTracks {
            config,
            tracks: &r.tracks,
        })
        .collect();

    let tracks = if merge_results {
        merge::merge_by_priority(&inputs, limit)
    } else {
        merge::concat_by_weight(&inputs, limit)
    };

    Ok(AggregatedResult {
        tracks,
        per_provider_results: per_provider,
        total,
        from_cache: false,
    })
}

fn validate_query(query: &str) -> Result<(), CatalogError> {
    if query.trim().is_empty() {
        return Err(CatalogError::Validation {
            status: 400,
            message: "query must not be empty".to_string(),
        });
    }
    Ok(())
}

/// Lowercase and collapse whitespace so equivalent queries share a cache entry.
fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn provider_list_key(providers: Option<&[ProviderId]>) -> String {
    match providers {
        None => "*".to_string(),
        Some(ids) => {
            let mut ids: Vec<&str> = ids.iter().map(ProviderId::as_str).collect();
            ids.sort_unstable();
            ids.dedup();
            ids.join(",")
        }
    }
}
