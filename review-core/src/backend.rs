//! Backend seam for the caches.
//!
//! [`ReviewBackend`] narrows [`ReviewApi`] to the calls the core needs, so
//! tests can script outcomes without a network (see
//! [`crate::testing::MockBackend`]).

use async_trait::async_trait;
use review_client::{ApiError, Identity, PricingInfo, ReviewApi};

#[async_trait]
pub trait ReviewBackend: Send + Sync {
    /// Who the backend thinks is signed in.
    async fn fetch_identity(&self) -> Result<Identity, ApiError>;

    /// Payment terms for one abstract.
    async fn fetch_pricing(&self, pmid: &str) -> Result<PricingInfo, ApiError>;

    /// Tear down the server-side session.
    async fn logout(&self) -> Result<(), ApiError>;
}

#[async_trait]
impl ReviewBackend for ReviewApi {
    async fn fetch_identity(&self) -> Result<Identity, ApiError> {
        self.fetch_session_identity().await
    }

    async fn fetch_pricing(&self, pmid: &str) -> Result<PricingInfo, ApiError> {
        ReviewApi::fetch_pricing(self, pmid).await
    }

    async fn logout(&self) -> Result<(), ApiError> {
        ReviewApi::logout(self).await
    }
}
