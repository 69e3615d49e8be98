//! Minimal HTTP client for the assertion review backend.
//!
//! This crate provides a focused client for the review API with:
//! - Session identity lookup (`/api/whoami`)
//! - Per-abstract pricing lookup (`/api/review/pricing`)
//! - Best-effort logout (`/api/logout`)

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const BASE_URL_VAR: &str = "REVIEW_API_BASE_URL";
const TOKEN_VAR: &str = "REVIEW_API_TOKEN";
const DEFAULT_CURRENCY: &str = "£";

/// Errors that can occur when talking to the review backend.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("API base URL not configured")]
    NoBaseUrl,

    #[error("Session rejected by the backend")]
    AuthDenied,

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Review backend API client.
#[derive(Clone)]
pub struct ReviewApi {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ReviewApi {
    /// Create a new client against the given base URL (scheme + host, no
    /// trailing slash).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .connect_timeout(std::time::Duration::from_secs(10))
                .build()
                .expect("Failed to build HTTP client"),
            base_url: normalize_base_url(base_url.into()),
            token: None,
        }
    }

    /// Create a client from the REVIEW_API_BASE_URL (and optionally
    /// REVIEW_API_TOKEN) environment variables.
    pub fn from_env() -> Result<Self, ApiError> {
        let base_url = std::env::var(BASE_URL_VAR).map_err(|_| ApiError::NoBaseUrl)?;
        let mut api = Self::new(base_url);
        if let Ok(token) = std::env::var(TOKEN_VAR) {
            api = api.with_token(token);
        }
        Ok(api)
    }

    /// Attach a bearer token sent with every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Fetch the identity of the current session.
    ///
    /// Returns [`ApiError::AuthDenied`] when the backend answers 401 or 403,
    /// which callers treat as "session expired".
    pub async fn fetch_session_identity(&self) -> Result<Identity, ApiError> {
        let envelope: WhoamiEnvelope = self.get_json("/api/whoami").await?;
        envelope
            .user
            .ok_or_else(|| ApiError::Parse("whoami response missing user".to_string()))
    }

    /// Fetch the pricing descriptor for one abstract.
    pub async fn fetch_pricing(&self, pmid: &str) -> Result<PricingInfo, ApiError> {
        let path = format!("/api/review/pricing?pmid={pmid}");
        let envelope: PricingEnvelope = self.get_json(&path).await?;
        envelope
            .data
            .ok_or_else(|| ApiError::Parse("pricing response missing data".to_string()))
    }

    /// Terminate the backend session. Callers treat failures as best-effort:
    /// local state is cleared regardless of the outcome.
    pub async fn logout(&self) -> Result<(), ApiError> {
        let response = self
            .client
            .post(format!("{}/api/logout", self.base_url))
            .headers(self.build_headers()?)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        check_status(response).await.map(|_| ())
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .headers(self.build_headers()?)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let response = check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::Parse(e.to_string()))
    }

    fn build_headers(&self) -> Result<HeaderMap, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(token) = &self.token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|e| ApiError::Config(format!("Invalid token: {e}")))?,
            );
        }
        Ok(headers)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ApiError::AuthDenied);
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ApiError::Api {
            status: status.as_u16(),
            message: body,
        });
    }
    Ok(response)
}

fn normalize_base_url(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}

// ============================================================================
// Public types
// ============================================================================

/// Reviewer identity as reported by `/api/whoami`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub is_admin: bool,
    /// PMID of the abstract currently assigned to this reviewer, if any.
    #[serde(default)]
    pub current_assignment: Option<String>,
    #[serde(default)]
    pub stats: ReviewerStats,
}

/// Lifetime counters for one reviewer. Admins get all-zero stats.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReviewerStats {
    #[serde(default)]
    pub reviewed_abstracts: u64,
    #[serde(default)]
    pub assertions_added: u64,
    #[serde(default)]
    pub commission: f64,
}

/// Pricing descriptor for one abstract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingInfo {
    pub per_abstract: f64,
    pub per_assertion_add: f64,
    #[serde(default)]
    pub sentence_count: u32,
    pub total_base: f64,
    pub estimated_for_this: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

// ============================================================================
// Internal API types
// ============================================================================

#[derive(Debug, Deserialize)]
struct WhoamiEnvelope {
    #[allow(dead_code)]
    #[serde(default)]
    success: bool,
    user: Option<Identity>,
}

#[derive(Debug, Deserialize)]
struct PricingEnvelope {
    #[allow(dead_code)]
    #[serde(default)]
    success: bool,
    data: Option<PricingInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn whoami_body() -> serde_json::Value {
        serde_json::json!({
            "success": true,
            "user": {
                "email": "ada@example.org",
                "name": "Ada",
                "is_admin": false,
                "current_assignment": "31222333",
                "stats": {
                    "reviewed_abstracts": 12,
                    "assertions_added": 3,
                    "commission": 4.55
                }
            }
        })
    }

    #[test]
    fn test_base_url_trailing_slash_stripped() {
        let api = ReviewApi::new("http://localhost:5050///");
        assert_eq!(api.base_url, "http://localhost:5050");
    }

    #[test]
    fn test_with_token() {
        let api = ReviewApi::new("http://localhost:5050").with_token("secret");
        assert_eq!(api.token.as_deref(), Some("secret"));
    }

    #[tokio::test]
    async fn test_fetch_identity_parses_user_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/whoami"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(whoami_body()))
            .mount(&server)
            .await;

        let api = ReviewApi::new(server.uri()).with_token("secret");
        let identity = api.fetch_session_identity().await.unwrap();

        assert_eq!(identity.email, "ada@example.org");
        assert_eq!(identity.current_assignment.as_deref(), Some("31222333"));
        assert_eq!(identity.stats.reviewed_abstracts, 12);
        assert!(!identity.is_admin);
    }

    #[tokio::test]
    async fn test_fetch_identity_401_is_auth_denied() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/whoami"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "success": false,
                "message": "Not authenticated"
            })))
            .mount(&server)
            .await;

        let api = ReviewApi::new(server.uri());
        let err = api.fetch_session_identity().await.unwrap_err();
        assert!(matches!(err, ApiError::AuthDenied));
    }

    #[tokio::test]
    async fn test_fetch_pricing_sends_pmid_and_defaults_currency() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/review/pricing"))
            .and(query_param("pmid", "31222333"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "data": {
                    "per_abstract": 0.5,
                    "per_assertion_add": 0.05,
                    "sentence_count": 9,
                    "total_base": 0.5,
                    "estimated_for_this": 0.59
                }
            })))
            .mount(&server)
            .await;

        let api = ReviewApi::new(server.uri());
        let pricing = api.fetch_pricing("31222333").await.unwrap();

        assert_eq!(pricing.sentence_count, 9);
        assert_eq!(pricing.currency, "£");
        assert!((pricing.estimated_for_this - 0.59).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_fetch_pricing_500_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/review/pricing"))
            .respond_with(ResponseTemplate::new(500).set_body_string("pricing backend down"))
            .mount(&server)
            .await;

        let api = ReviewApi::new(server.uri());
        let err = api.fetch_pricing("1").await.unwrap_err();
        match err {
            ApiError::Api { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "pricing backend down");
            }
            other => panic!("Expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_logout_posts_and_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/logout"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "message": "Logged out"
            })))
            .mount(&server)
            .await;

        let api = ReviewApi::new(server.uri());
        assert!(api.logout().await.is_ok());
    }

    #[tokio::test]
    async fn test_network_error_when_server_unreachable() {
        // Port 1 is never listening.
        let api = ReviewApi::new("http://127.0.0.1:1");
        let err = api.fetch_session_identity().await.unwrap_err();
        assert!(matches!(err, ApiError::Network(_)));
    }
}
