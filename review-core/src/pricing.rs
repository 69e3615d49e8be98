//! Pricing estimate cache.
//!
//! One short-TTL cache per abstract. Authentication rejections are demoted
//! to service errors at this seam: a pricing failure keeps the stale
//! estimate on screen with a retry affordance and never tears down the
//! session or navigates. Only the identity cache may do that.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use review_client::{ApiError, PricingInfo};
use tokio::sync::broadcast;

use crate::backend::ReviewBackend;
use crate::cache::{CacheConfig, CacheSnapshot, FetchError, ResourceCache, ResourceFetcher};

/// Tuning for [`PricingCache`]. Estimates change rarely but cheaply, so
/// the default TTL is short.
#[derive(Debug, Clone)]
pub struct PricingCacheConfig {
    pub ttl: Duration,
    pub event_capacity: usize,
}

impl PricingCacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }
}

impl Default for PricingCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60),
            event_capacity: 32,
        }
    }
}

struct PricingFetcher {
    backend: Arc<dyn ReviewBackend>,
    pmid: String,
}

#[async_trait]
impl ResourceFetcher<PricingInfo> for PricingFetcher {
    async fn fetch(&self) -> Result<PricingInfo, FetchError> {
        match self.backend.fetch_pricing(&self.pmid).await {
            Ok(pricing) => Ok(pricing),
            // Never AuthDenied from here: pricing must not end a session.
            Err(ApiError::AuthDenied) => Err(FetchError::Service {
                status: 401,
                message: "authentication required".to_string(),
            }),
            Err(err) => Err(FetchError::from(err)),
        }
    }
}

/// Payment terms for one abstract, cached with stale-while-revalidate.
#[derive(Clone)]
pub struct PricingCache {
    cache: ResourceCache<PricingInfo>,
    pmid: String,
}

impl PricingCache {
    pub fn for_abstract(
        backend: Arc<dyn ReviewBackend>,
        pmid: impl Into<String>,
        config: PricingCacheConfig,
    ) -> Self {
        let pmid = pmid.into();
        let fetcher = Arc::new(PricingFetcher {
            backend,
            pmid: pmid.clone(),
        });
        Self {
            cache: ResourceCache::new(
                fetcher,
                CacheConfig::new(config.ttl).with_event_capacity(config.event_capacity),
            ),
            pmid,
        }
    }

    pub fn pmid(&self) -> &str {
        &self.pmid
    }

    /// Current view, scheduling a background fetch when the estimate is
    /// missing or stale.
    pub fn get(&self) -> CacheSnapshot<PricingInfo> {
        self.cache.get()
    }

    pub fn peek(&self) -> CacheSnapshot<PricingInfo> {
        self.cache.peek()
    }

    /// Force a fetch and return the settled snapshot.
    pub async fn refresh(&self) -> CacheSnapshot<PricingInfo> {
        self.cache.refresh().await
    }

    /// User-triggered retry after a failure. Alias for [`Self::refresh`],
    /// named for the affordance it backs.
    pub async fn retry(&self) -> CacheSnapshot<PricingInfo> {
        self.refresh().await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheSnapshot<PricingInfo>> {
        self.cache.subscribe()
    }
}
