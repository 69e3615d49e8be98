//! Session identity cache.
//!
//! Wraps a [`ResourceCache`] around the backend's session check and adds
//! the two side effects every consumer must agree on: persisting the last
//! known identity for instant cold starts, and a hard redirect to login
//! when the backend rejects the session. Both run in a monitor task driven
//! by the cache's own broadcast channel, so they fire identically no
//! matter which caller triggered the fetch.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use review_client::Identity;
use tokio::sync::broadcast;

use crate::backend::ReviewBackend;
use crate::cache::{
    CacheConfig, CacheSnapshot, CacheStatus, FetchError, ResourceCache, ResourceFetcher,
};
use crate::persist::{discard_snapshot, IdentitySnapshot, SnapshotError};

/// Where to send the user when the session is no longer valid.
///
/// In a real frontend this performs a hard navigation to the login
/// boundary; tests record the call instead.
pub trait Navigator: Send + Sync {
    fn to_login(&self);
}

/// Tuning for [`IdentityCache`].
#[derive(Debug, Clone)]
pub struct IdentityCacheConfig {
    /// How long a fetched identity counts as fresh. Also bounds how old a
    /// persisted snapshot may be and still prime the cache.
    pub ttl: Duration,
    /// Snapshot file for cold-start priming. `None` disables persistence.
    pub snapshot_path: Option<PathBuf>,
    /// Broadcast channel capacity for snapshot updates.
    pub event_capacity: usize,
}

impl IdentityCacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }
}

impl Default for IdentityCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(900),
            snapshot_path: None,
            event_capacity: 32,
        }
    }
}

struct IdentityFetcher {
    backend: Arc<dyn ReviewBackend>,
}

#[async_trait]
impl ResourceFetcher<Identity> for IdentityFetcher {
    async fn fetch(&self) -> Result<Identity, FetchError> {
        self.backend.fetch_identity().await.map_err(FetchError::from)
    }
}

/// The signed-in reviewer, cached process-wide.
#[derive(Clone)]
pub struct IdentityCache {
    cache: ResourceCache<Identity>,
    backend: Arc<dyn ReviewBackend>,
    navigator: Arc<dyn Navigator>,
    snapshot_path: Option<PathBuf>,
}

impl IdentityCache {
    /// Build the cache and spawn its monitor task.
    ///
    /// When a persisted snapshot exists, matches the current format
    /// version and is younger than the TTL, the cache is primed with it as
    /// a stale value, so consumers render the last known reviewer while
    /// the first live check runs. Anything else on disk is discarded.
    pub async fn new(
        backend: Arc<dyn ReviewBackend>,
        navigator: Arc<dyn Navigator>,
        config: IdentityCacheConfig,
    ) -> Self {
        let fetcher = Arc::new(IdentityFetcher {
            backend: Arc::clone(&backend),
        });
        let cache = ResourceCache::new(
            fetcher,
            CacheConfig::new(config.ttl).with_event_capacity(config.event_capacity),
        );

        if let Some(path) = &config.snapshot_path {
            match IdentitySnapshot::load_if_fresh(path, config.ttl).await {
                Ok(snapshot) => {
                    tracing::debug!(
                        email = %snapshot.identity.email,
                        age_secs = snapshot.age_secs(),
                        "primed identity from snapshot"
                    );
                    cache.prime(snapshot.identity);
                }
                Err(SnapshotError::Io(err))
                    if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    tracing::warn!(error = %err, "discarding unusable identity snapshot");
                    if let Err(err) = discard_snapshot(path).await {
                        tracing::warn!(error = %err, "failed to discard identity snapshot");
                    }
                }
            }
        }

        let this = Self {
            cache,
            backend,
            navigator,
            snapshot_path: config.snapshot_path,
        };
        this.spawn_monitor();
        this
    }

    /// Current view, scheduling a background session check when the
    /// identity is missing or stale.
    pub fn get(&self) -> CacheSnapshot<Identity> {
        self.cache.get()
    }

    /// Force a live session check and return the settled snapshot.
    pub async fn refresh(&self) -> CacheSnapshot<Identity> {
        self.cache.refresh().await
    }

    /// Current view without scheduling anything.
    pub fn peek(&self) -> CacheSnapshot<Identity> {
        self.cache.peek()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheSnapshot<Identity>> {
        self.cache.subscribe()
    }

    /// Drop the cached identity without contacting the backend. The next
    /// `get` refetches.
    pub fn invalidate(&self) {
        self.cache.invalidate();
    }

    /// End the session: best-effort backend logout, then local teardown.
    ///
    /// A failed backend call is logged and swallowed; the cached identity
    /// and persisted snapshot are cleared and the user is sent to login
    /// regardless.
    pub async fn logout(&self) {
        if let Err(err) = self.backend.logout().await {
            tracing::warn!(error = %err, "backend logout failed; clearing local session anyway");
        }
        self.cache.invalidate();
        if let Some(path) = &self.snapshot_path {
            if let Err(err) = discard_snapshot(path).await {
                tracing::warn!(error = %err, "failed to discard identity snapshot");
            }
        }
        self.navigator.to_login();
    }

    /// React to cache transitions: persist fresh identities, tear down on
    /// authentication rejection. Exits when the cache is dropped.
    fn spawn_monitor(&self) {
        let mut updates = self.cache.subscribe();
        let navigator = Arc::clone(&self.navigator);
        let snapshot_path = self.snapshot_path.clone();
        tokio::spawn(async move {
            // A rejection error stays on every snapshot until some later
            // fetch lands, including the one broadcast when a retry
            // starts. Navigate only when the rejection first appears.
            let mut rejected = false;
            loop {
                let snapshot = match updates.recv().await {
                    Ok(snapshot) => snapshot,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "identity monitor lagged behind updates");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                if snapshot.error == Some(FetchError::AuthDenied) {
                    if !rejected {
                        rejected = true;
                        tracing::info!("session rejected by backend; redirecting to login");
                        if let Some(path) = &snapshot_path {
                            if let Err(err) = discard_snapshot(path).await {
                                tracing::warn!(error = %err, "failed to discard identity snapshot");
                            }
                        }
                        navigator.to_login();
                    }
                    continue;
                }
                rejected = false;

                if snapshot.status == CacheStatus::Fresh {
                    if let (Some(path), Some(identity)) = (&snapshot_path, snapshot.value) {
                        if let Err(err) = IdentitySnapshot::new(identity).save(path).await {
                            tracing::warn!(error = %err, "failed to persist identity snapshot");
                        }
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_identity, wait_until, MockBackend, MockNavigator};
    use review_client::ApiError;
    use tempfile::TempDir;

    fn snapshot_config(dir: &TempDir) -> IdentityCacheConfig {
        IdentityCacheConfig::new()
            .with_ttl(Duration::from_secs(900))
            .with_snapshot_path(dir.path().join("identity.json"))
    }

    async fn build(
        backend: MockBackend,
        config: IdentityCacheConfig,
    ) -> (IdentityCache, Arc<MockBackend>, Arc<MockNavigator>) {
        let backend = Arc::new(backend);
        let navigator = Arc::new(MockNavigator::new());
        let cache = IdentityCache::new(
            Arc::clone(&backend) as Arc<dyn ReviewBackend>,
            Arc::clone(&navigator) as Arc<dyn Navigator>,
            config,
        )
        .await;
        (cache, backend, navigator)
    }

    #[tokio::test]
    async fn test_cold_start_primes_from_fresh_snapshot() {
        let dir = TempDir::new().expect("temp dir");
        let config = snapshot_config(&dir);
        let path = config.snapshot_path.clone().expect("path set");
        IdentitySnapshot::new(sample_identity())
            .save(&path)
            .await
            .expect("seed snapshot");

        let (cache, backend, _nav) = build(MockBackend::new(), config).await;

        let snapshot = cache.peek();
        assert_eq!(snapshot.status, CacheStatus::Stale);
        assert_eq!(
            snapshot.value.map(|i| i.email),
            Some(sample_identity().email)
        );
        // Priming alone must not hit the backend.
        assert_eq!(backend.identity_calls(), 0);
    }

    #[tokio::test]
    async fn test_cold_start_discards_expired_snapshot() {
        let dir = TempDir::new().expect("temp dir");
        let config = snapshot_config(&dir);
        let path = config.snapshot_path.clone().expect("path set");
        let mut old = IdentitySnapshot::new(sample_identity());
        old.saved_at -= 7_200;
        old.save(&path).await.expect("seed snapshot");

        let (cache, _backend, _nav) = build(MockBackend::new(), config).await;

        assert_eq!(cache.peek().status, CacheStatus::Idle);
        assert!(!path.exists(), "expired snapshot removed from disk");
    }

    #[tokio::test]
    async fn test_fresh_fetch_persists_snapshot() {
        let dir = TempDir::new().expect("temp dir");
        let config = snapshot_config(&dir);
        let path = config.snapshot_path.clone().expect("path set");

        let backend = MockBackend::new().with_identity(Ok(sample_identity()));
        let (cache, _backend, _nav) = build(backend, config).await;

        let settled = cache.refresh().await;
        assert_eq!(settled.status, CacheStatus::Fresh);

        // The monitor persists asynchronously.
        wait_until(|| path.exists()).await;
        let written = IdentitySnapshot::load(&path).await.expect("snapshot on disk");
        assert_eq!(written.identity.email, sample_identity().email);
    }

    #[tokio::test]
    async fn test_auth_denied_clears_discards_and_navigates() {
        let dir = TempDir::new().expect("temp dir");
        let config = snapshot_config(&dir);
        let path = config.snapshot_path.clone().expect("path set");
        IdentitySnapshot::new(sample_identity())
            .save(&path)
            .await
            .expect("seed snapshot");

        let backend = MockBackend::new().with_identity(Err(ApiError::AuthDenied));
        let (cache, _backend, nav) = build(backend, config).await;

        let denied = cache.refresh().await;
        assert_eq!(denied.status, CacheStatus::Failed);
        assert!(denied.value.is_none(), "identity cleared on rejection");

        wait_until(|| nav.login_calls() == 1).await;
        assert!(!path.exists(), "persisted snapshot discarded");
    }

    #[tokio::test]
    async fn test_recovery_after_denial_navigates_once() {
        let dir = TempDir::new().expect("temp dir");
        let config = snapshot_config(&dir);
        let path = config.snapshot_path.clone().expect("path set");

        let backend = MockBackend::new()
            .with_identity(Err(ApiError::AuthDenied))
            .with_identity(Ok(sample_identity()));
        let (cache, backend, nav) = build(backend, config).await;

        let denied = cache.refresh().await;
        assert_eq!(denied.status, CacheStatus::Failed);
        wait_until(|| nav.login_calls() == 1).await;

        // The reviewer signs back in; the retry must not bounce them
        // straight back to login.
        let recovered = cache.refresh().await;
        assert_eq!(recovered.status, CacheStatus::Fresh);
        assert_eq!(backend.identity_calls(), 2);

        // Once the recovered identity is back on disk the monitor has
        // consumed every snapshot the retry broadcast.
        wait_until(|| path.exists()).await;
        assert_eq!(nav.login_calls(), 1, "no second redirect after recovery");
    }

    #[tokio::test]
    async fn test_logout_is_best_effort() {
        let dir = TempDir::new().expect("temp dir");
        let config = snapshot_config(&dir);
        let path = config.snapshot_path.clone().expect("path set");

        let backend = MockBackend::new()
            .with_identity(Ok(sample_identity()))
            .with_logout(Err(ApiError::Network("gateway timeout".to_string())));
        let (cache, backend, nav) = build(backend, config).await;

        cache.refresh().await;
        wait_until(|| path.exists()).await;

        cache.logout().await;

        assert_eq!(backend.logout_calls(), 1);
        assert_eq!(nav.login_calls(), 1, "navigation happens despite backend failure");
        assert_eq!(cache.peek().status, CacheStatus::Idle);
        assert!(!path.exists(), "snapshot discarded on logout");
    }

    #[tokio::test]
    async fn test_no_snapshot_path_disables_persistence() {
        let backend = MockBackend::new().with_identity(Ok(sample_identity()));
        let (cache, _backend, _nav) = build(backend, IdentityCacheConfig::new()).await;

        let settled = cache.refresh().await;
        assert_eq!(settled.status, CacheStatus::Fresh);
        // Nothing to assert on disk; this is the no-persistence path.
    }
}
