//! Single-resource async cache with stale-while-revalidate semantics.
//!
//! A [`ResourceCache`] owns one logical value fetched from a backend. Reads
//! are synchronous and never block on the network: [`ResourceCache::get`]
//! returns whatever is known right now and schedules a background fetch
//! when the value is missing or past its TTL. At most one fetch is in
//! flight at a time; concurrent demand joins it. Every state transition is
//! broadcast to subscribers.
//!
//! Transitions are serialized by a mutex that is never held across an
//! await; cross-task waiting goes through [`tokio::sync::Notify`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{broadcast, Notify};

/// Errors a fetch can land with. Stored inside snapshots, so cloneable and
/// stringly where the source error is not.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Session rejected by the backend")]
    AuthDenied,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Service error (status {status}): {message}")]
    Service { status: u16, message: String },
}

impl From<review_client::ApiError> for FetchError {
    fn from(err: review_client::ApiError) -> Self {
        use review_client::ApiError;
        match err {
            ApiError::AuthDenied => FetchError::AuthDenied,
            ApiError::Network(msg) => FetchError::Network(msg),
            ApiError::Api { status, message } => FetchError::Service { status, message },
            other => FetchError::Network(other.to_string()),
        }
    }
}

/// Lifecycle of the cached resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Nothing fetched yet, nothing in flight.
    Idle,
    /// First fetch in flight, no value to show.
    Fetching,
    /// Value present and within its TTL.
    Fresh,
    /// Value present but past its TTL. A refresh may already be running;
    /// consumers keep rendering the stale value meanwhile.
    Stale,
    /// The last fetch failed. Any previously fetched value is retained
    /// alongside the error, except after an authentication rejection.
    Failed,
}

/// Point-in-time view of the cache, returned synchronously and broadcast on
/// every transition.
#[derive(Debug, Clone)]
pub struct CacheSnapshot<T> {
    pub value: Option<T>,
    pub status: CacheStatus,
    pub error: Option<FetchError>,
    /// Time since the value landed. `None` for primed values that carry no
    /// fetch timestamp.
    pub age: Option<Duration>,
}

/// Source of values for a [`ResourceCache`].
#[async_trait]
pub trait ResourceFetcher<T>: Send + Sync {
    async fn fetch(&self) -> Result<T, FetchError>;
}

/// Cache tuning.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// How long a fetched value counts as fresh.
    pub ttl: Duration,
    /// Broadcast channel capacity for snapshot updates.
    pub event_capacity: usize,
}

impl CacheConfig {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            event_capacity: 32,
        }
    }

    /// Set the broadcast channel capacity.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

struct CacheState<T> {
    value: Option<T>,
    fetched_at: Option<Instant>,
    error: Option<FetchError>,
    /// Generation of the fetch currently in flight, if any.
    in_flight: Option<u64>,
}

struct Inner<T> {
    state: Mutex<CacheState<T>>,
    updates: broadcast::Sender<CacheSnapshot<T>>,
    landed: Notify,
    /// Bumped by `invalidate`; a fetch landing with an older generation is
    /// discarded.
    generation: AtomicU64,
    fetcher: Arc<dyn ResourceFetcher<T>>,
    ttl: Duration,
}

/// Async cache for one logical resource. Cheap to clone; clones share
/// state.
pub struct ResourceCache<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for ResourceCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + 'static> ResourceCache<T> {
    pub fn new(fetcher: Arc<dyn ResourceFetcher<T>>, config: CacheConfig) -> Self {
        let (updates, _) = broadcast::channel(config.event_capacity);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(CacheState {
                    value: None,
                    fetched_at: None,
                    error: None,
                    in_flight: None,
                }),
                updates,
                landed: Notify::new(),
                generation: AtomicU64::new(0),
                fetcher,
                ttl: config.ttl,
            }),
        }
    }

    /// The current view, scheduling a background fetch when the value is
    /// missing or stale.
    ///
    /// Must be called within a tokio runtime: scheduled fetches run on
    /// `tokio::spawn`.
    pub fn get(&self) -> CacheSnapshot<T> {
        let (snapshot, scheduled) = {
            let mut state = self.lock();
            let status = self.status_locked(&state);
            let scheduled = if state.in_flight.is_none()
                && matches!(status, CacheStatus::Idle | CacheStatus::Stale)
            {
                let generation = self.inner.generation.load(Ordering::Acquire);
                state.in_flight = Some(generation);
                Some(generation)
            } else {
                None
            };
            (self.snapshot_locked(&state), scheduled)
        };

        if let Some(generation) = scheduled {
            let _ = self.inner.updates.send(snapshot.clone());
            self.spawn_fetch(generation);
        }
        snapshot
    }

    /// The current view without scheduling anything.
    pub fn peek(&self) -> CacheSnapshot<T> {
        let state = self.lock();
        self.snapshot_locked(&state)
    }

    /// Force a fetch now, joining one already in flight, and return the
    /// settled snapshot.
    pub async fn refresh(&self) -> CacheSnapshot<T> {
        loop {
            let mut landed = std::pin::pin!(self.inner.landed.notified());
            landed.as_mut().enable();

            let claim = {
                let mut state = self.lock();
                if state.in_flight.is_none() {
                    let generation = self.inner.generation.load(Ordering::Acquire);
                    state.in_flight = Some(generation);
                    Some((generation, self.snapshot_locked(&state)))
                } else {
                    None
                }
            };

            match claim {
                Some((generation, fetching)) => {
                    let _ = self.inner.updates.send(fetching);
                    let result = self.inner.fetcher.fetch().await;
                    self.land(generation, result);
                    return self.peek();
                }
                None => {
                    landed.await;
                    let state = self.lock();
                    if state.in_flight.is_none()
                        && (state.value.is_some() || state.error.is_some())
                    {
                        return self.snapshot_locked(&state);
                    }
                    // The landing we joined was discarded, or another task
                    // claimed a fetch first. Go around again.
                }
            }
        }
    }

    /// Drop the value and error, returning the cache to `Idle`.
    ///
    /// A fetch already in flight is orphaned: its result is discarded when
    /// it lands, so an invalidated value cannot be resurrected by a slow
    /// response.
    pub fn invalidate(&self) {
        let snapshot = {
            let mut state = self.lock();
            self.inner.generation.fetch_add(1, Ordering::AcqRel);
            state.value = None;
            state.fetched_at = None;
            state.error = None;
            state.in_flight = None;
            self.snapshot_locked(&state)
        };
        let _ = self.inner.updates.send(snapshot);
        self.inner.landed.notify_waiters();
    }

    /// Seed a value that counts as immediately stale: consumers can render
    /// it while the first real fetch runs.
    pub fn prime(&self, value: T) {
        let snapshot = {
            let mut state = self.lock();
            state.value = Some(value);
            state.fetched_at = None;
            state.error = None;
            self.snapshot_locked(&state)
        };
        let _ = self.inner.updates.send(snapshot);
    }

    /// Subscribe to snapshot broadcasts. Lagging receivers skip
    /// intermediate snapshots but never observe them out of order.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheSnapshot<T>> {
        self.inner.updates.subscribe()
    }

    fn spawn_fetch(&self, generation: u64) {
        let cache = self.clone();
        tokio::spawn(async move {
            let result = cache.inner.fetcher.fetch().await;
            cache.land(generation, result);
        });
    }

    fn land(&self, generation: u64, result: Result<T, FetchError>) {
        let snapshot = {
            let mut state = self.lock();
            if self.inner.generation.load(Ordering::Acquire) != generation {
                // Superseded by invalidate(). The result must not
                // resurrect state the caller explicitly dropped.
                tracing::debug!("discarding fetch result from a superseded generation");
                if state.in_flight == Some(generation) {
                    state.in_flight = None;
                }
                self.snapshot_locked(&state)
            } else {
                state.in_flight = None;
                match result {
                    Ok(value) => {
                        state.value = Some(value);
                        state.fetched_at = Some(Instant::now());
                        state.error = None;
                    }
                    Err(error) => {
                        if matches!(error, FetchError::AuthDenied) {
                            // An unauthenticated session must not keep
                            // serving identity-bearing data.
                            state.value = None;
                            state.fetched_at = None;
                        }
                        state.error = Some(error);
                    }
                }
                self.snapshot_locked(&state)
            }
        };
        let _ = self.inner.updates.send(snapshot);
        self.inner.landed.notify_waiters();
    }

    fn status_locked(&self, state: &CacheState<T>) -> CacheStatus {
        if state.error.is_some() {
            return CacheStatus::Failed;
        }
        match (&state.value, state.fetched_at) {
            (None, _) => {
                if state.in_flight.is_some() {
                    CacheStatus::Fetching
                } else {
                    CacheStatus::Idle
                }
            }
            // A primed value has no timestamp and is always due a refresh.
            (Some(_), None) => CacheStatus::Stale,
            (Some(_), Some(at)) => {
                if at.elapsed() <= self.inner.ttl {
                    CacheStatus::Fresh
                } else {
                    CacheStatus::Stale
                }
            }
        }
    }

    fn snapshot_locked(&self, state: &CacheState<T>) -> CacheSnapshot<T> {
        CacheSnapshot {
            value: state.value.clone(),
            status: self.status_locked(state),
            error: state.error.clone(),
            age: state.fetched_at.map(|at| at.elapsed()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<T>> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    struct ScriptedFetcher {
        outcomes: Mutex<VecDeque<Result<u32, FetchError>>>,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl ScriptedFetcher {
        fn new(outcomes: Vec<Result<u32, FetchError>>) -> Arc<Self> {
            Self::with_delay(outcomes, Duration::ZERO)
        }

        fn with_delay(outcomes: Vec<Result<u32, FetchError>>, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: AtomicUsize::new(0),
                delay,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ResourceFetcher<u32> for ScriptedFetcher {
        async fn fetch(&self) -> Result<u32, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let outcome = self
                .outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(FetchError::Network("script exhausted".to_string())));
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            outcome
        }
    }

    fn cache_with(fetcher: Arc<ScriptedFetcher>, ttl: Duration) -> ResourceCache<u32> {
        ResourceCache::new(fetcher, CacheConfig::new(ttl))
    }

    async fn wait_for_status(
        rx: &mut broadcast::Receiver<CacheSnapshot<u32>>,
        wanted: CacheStatus,
    ) -> CacheSnapshot<u32> {
        loop {
            match rx.recv().await {
                Ok(snapshot) if snapshot.status == wanted => return snapshot,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    panic!("update channel closed before reaching {wanted:?}")
                }
            }
        }
    }

    #[tokio::test]
    async fn test_idle_get_schedules_and_lands() {
        let fetcher = ScriptedFetcher::new(vec![Ok(7)]);
        let cache = cache_with(fetcher.clone(), Duration::from_secs(60));
        let mut rx = cache.subscribe();

        let first = cache.get();
        assert_eq!(first.status, CacheStatus::Fetching);
        assert!(first.value.is_none());

        let fresh = wait_for_status(&mut rx, CacheStatus::Fresh).await;
        assert_eq!(fresh.value, Some(7));
        assert!(fresh.age.is_some());
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_refresh_returns_settled_snapshot() {
        let fetcher = ScriptedFetcher::new(vec![Ok(11)]);
        let cache = cache_with(fetcher.clone(), Duration::from_secs(60));

        let snapshot = cache.refresh().await;
        assert_eq!(snapshot.status, CacheStatus::Fresh);
        assert_eq!(snapshot.value, Some(11));
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_single_flight_under_concurrent_demand() {
        let fetcher = ScriptedFetcher::with_delay(vec![Ok(1)], Duration::from_millis(50));
        let cache = cache_with(fetcher.clone(), Duration::from_secs(60));

        // First get schedules the fetch; the rest must join it.
        for _ in 0..3 {
            cache.get();
        }
        let joiners: Vec<_> = (0..2)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.refresh().await })
            })
            .collect();
        for handle in joiners {
            let snapshot = handle.await.expect("refresh task panicked");
            assert_eq!(snapshot.value, Some(1));
        }

        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_stale_value_returned_synchronously_while_refreshing() {
        let fetcher = ScriptedFetcher::with_delay(vec![Ok(1), Ok(2)], Duration::from_millis(40));
        // Zero TTL: every landed value is instantly stale.
        let cache = cache_with(fetcher.clone(), Duration::ZERO);

        cache.refresh().await;

        let mut rx = cache.subscribe();
        let stale = cache.get();
        assert_eq!(stale.status, CacheStatus::Stale);
        assert_eq!(stale.value, Some(1), "stale value served while refresh runs");

        // A second get during the refresh still serves the old value and
        // does not start another fetch.
        let again = cache.get();
        assert_eq!(again.value, Some(1));

        let fresh = wait_for_status(&mut rx, CacheStatus::Fresh).await;
        assert_eq!(fresh.value, Some(2));
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_failure_retains_value_and_error() {
        let fetcher = ScriptedFetcher::new(vec![
            Ok(1),
            Err(FetchError::Network("connection reset".to_string())),
        ]);
        let cache = cache_with(fetcher.clone(), Duration::from_secs(60));

        cache.refresh().await;
        let failed = cache.refresh().await;

        assert_eq!(failed.status, CacheStatus::Failed);
        assert_eq!(failed.value, Some(1), "previous value retained");
        assert_eq!(
            failed.error,
            Some(FetchError::Network("connection reset".to_string()))
        );
    }

    #[tokio::test]
    async fn test_auth_denied_clears_value() {
        let fetcher = ScriptedFetcher::new(vec![Ok(1), Err(FetchError::AuthDenied)]);
        let cache = cache_with(fetcher.clone(), Duration::from_secs(60));

        cache.refresh().await;
        let denied = cache.refresh().await;

        assert_eq!(denied.status, CacheStatus::Failed);
        assert_eq!(denied.value, None, "auth rejection wipes the value");
        assert_eq!(denied.error, Some(FetchError::AuthDenied));
    }

    #[tokio::test]
    async fn test_recovery_after_failure() {
        let fetcher = ScriptedFetcher::new(vec![
            Err(FetchError::Network("boot flake".to_string())),
            Ok(5),
        ]);
        let cache = cache_with(fetcher.clone(), Duration::from_secs(60));

        let failed = cache.refresh().await;
        assert_eq!(failed.status, CacheStatus::Failed);

        let recovered = cache.refresh().await;
        assert_eq!(recovered.status, CacheStatus::Fresh);
        assert_eq!(recovered.value, Some(5));
        assert!(recovered.error.is_none());
    }

    #[tokio::test]
    async fn test_invalidate_resets_to_idle() {
        let fetcher = ScriptedFetcher::new(vec![Ok(1)]);
        let cache = cache_with(fetcher.clone(), Duration::from_secs(60));

        cache.refresh().await;
        cache.invalidate();

        let snapshot = cache.peek();
        assert_eq!(snapshot.status, CacheStatus::Idle);
        assert!(snapshot.value.is_none());
        assert!(snapshot.error.is_none());
    }

    #[tokio::test]
    async fn test_invalidate_discards_in_flight_result() {
        let fetcher = ScriptedFetcher::with_delay(vec![Ok(41), Ok(42)], Duration::from_millis(50));
        let cache = cache_with(fetcher.clone(), Duration::from_secs(60));
        let mut rx = cache.subscribe();

        cache.get();
        // Let the doomed fetch start before invalidating.
        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.invalidate();

        let settled = cache.refresh().await;
        assert_eq!(settled.value, Some(42), "only the post-invalidate fetch lands");
        assert_eq!(fetcher.calls(), 2);

        // Give the orphaned first fetch time to land and be discarded,
        // then verify no subscriber ever saw 41.
        tokio::time::sleep(Duration::from_millis(80)).await;
        while let Ok(snapshot) = rx.try_recv() {
            assert_ne!(snapshot.value, Some(41), "discarded result leaked to subscribers");
        }
        assert_eq!(cache.peek().value, Some(42));
    }

    #[tokio::test]
    async fn test_primed_value_counts_as_stale() {
        let fetcher = ScriptedFetcher::with_delay(vec![Ok(10)], Duration::from_millis(40));
        let cache = cache_with(fetcher.clone(), Duration::from_secs(60));

        cache.prime(9);
        let snapshot = cache.peek();
        assert_eq!(snapshot.status, CacheStatus::Stale);
        assert_eq!(snapshot.value, Some(9));
        assert!(snapshot.age.is_none());

        // get() serves the primed value and schedules the real fetch.
        let mut rx = cache.subscribe();
        let served = cache.get();
        assert_eq!(served.value, Some(9));
        let fresh = wait_for_status(&mut rx, CacheStatus::Fresh).await;
        assert_eq!(fresh.value, Some(10));
    }

    #[tokio::test]
    async fn test_subscribers_see_fetching_then_fresh() {
        let fetcher = ScriptedFetcher::new(vec![Ok(3)]);
        let cache = cache_with(fetcher, Duration::from_secs(60));
        let mut rx = cache.subscribe();

        cache.refresh().await;

        let first = rx.recv().await.expect("fetching snapshot");
        assert_eq!(first.status, CacheStatus::Fetching);
        let second = rx.recv().await.expect("fresh snapshot");
        assert_eq!(second.status, CacheStatus::Fresh);
    }

    #[test]
    fn test_api_error_mapping() {
        use review_client::ApiError;

        assert_eq!(
            FetchError::from(ApiError::AuthDenied),
            FetchError::AuthDenied
        );
        assert_eq!(
            FetchError::from(ApiError::Network("down".to_string())),
            FetchError::Network("down".to_string())
        );
        assert_eq!(
            FetchError::from(ApiError::Api {
                status: 503,
                message: "maintenance".to_string(),
            }),
            FetchError::Service {
                status: 503,
                message: "maintenance".to_string(),
            }
        );
    }
}
