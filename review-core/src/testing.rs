//! Test support: scripted backends, a recording navigator, sample data
//! and a session harness.
//!
//! Everything here is deterministic. The mock backend replays scripted
//! outcomes in order; an unscripted identity or pricing call fails with a
//! network error rather than hanging, so a test that forgot to script a
//! response fails loudly.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use review_client::{ApiError, Identity, PricingInfo, ReviewerStats};
use tokio::sync::broadcast;

use crate::backend::ReviewBackend;
use crate::identity::Navigator;
use crate::model::{AbstractDocument, Assertion, DecisionKind, Sentence};
use crate::session::{ReviewEvent, ReviewSession, SessionConfig};
use crate::vocab::Vocabulary;

pub const REVIEWER_EMAIL: &str = "reviewer@example.org";

// ============================================================================
// Sample data
// ============================================================================

/// A small but realistic abstract: one clean extraction, one sentence with
/// two assertions (one of them dubious), one sentence with none.
pub fn sample_document() -> AbstractDocument {
    let s0 = Sentence::new(
        0,
        "Metformin treats type 2 diabetes mellitus in adults.",
        vec![Assertion::new(
            "Metformin",
            "phsu",
            "TREATS",
            "type 2 diabetes mellitus",
            "dsyn",
        )],
    );
    let s1 = Sentence::new(
        1,
        "Metformin causes gastrointestinal upset in some patients.",
        vec![
            Assertion::new(
                "Metformin",
                "phsu",
                "CAUSES",
                "gastrointestinal upset",
                "sosy",
            ),
            Assertion::new("Metformin", "phsu", "PREVENTS", "weight gain", "fndg"),
        ],
    );
    let s2 = Sentence::new(2, "Long-term randomized trials are still needed.", Vec::new());

    AbstractDocument::new(
        "31919929",
        "Metformin in type 2 diabetes: an updated review",
        vec![s0, s1, s2],
    )
    .with_journal("Diabetes Care")
    .with_year("2020")
}

pub fn sample_identity() -> Identity {
    Identity {
        email: REVIEWER_EMAIL.to_string(),
        name: "Alex Reviewer".to_string(),
        is_admin: false,
        current_assignment: Some("31919929".to_string()),
        stats: ReviewerStats {
            reviewed_abstracts: 12,
            assertions_added: 3,
            commission: 14.5,
        },
    }
}

pub fn sample_pricing() -> PricingInfo {
    PricingInfo {
        per_abstract: 0.62,
        per_assertion_add: 0.07,
        sentence_count: 3,
        total_base: 0.62,
        estimated_for_this: 0.83,
        currency: "£".to_string(),
    }
}

// ============================================================================
// Scripted backend
// ============================================================================

/// A [`ReviewBackend`] replaying scripted outcomes.
///
/// Identity and pricing calls consume their queues front-to-back and fail
/// with a network error once exhausted. Logout defaults to success;
/// failures must be scripted explicitly. An optional delay simulates a
/// slow backend for single-flight and stale-while-revalidate tests.
#[derive(Default)]
pub struct MockBackend {
    identities: Mutex<VecDeque<Result<Identity, ApiError>>>,
    pricings: Mutex<VecDeque<Result<PricingInfo, ApiError>>>,
    logouts: Mutex<VecDeque<Result<(), ApiError>>>,
    pricing_pmids: Mutex<Vec<String>>,
    identity_calls: AtomicUsize,
    pricing_calls: AtomicUsize,
    logout_calls: AtomicUsize,
    delay: Duration,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an identity outcome.
    pub fn with_identity(self, outcome: Result<Identity, ApiError>) -> Self {
        self.identities.lock().expect("mock lock").push_back(outcome);
        self
    }

    /// Queue a pricing outcome.
    pub fn with_pricing(self, outcome: Result<PricingInfo, ApiError>) -> Self {
        self.pricings.lock().expect("mock lock").push_back(outcome);
        self
    }

    /// Queue a logout outcome.
    pub fn with_logout(self, outcome: Result<(), ApiError>) -> Self {
        self.logouts.lock().expect("mock lock").push_back(outcome);
        self
    }

    /// Delay every call by `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn identity_calls(&self) -> usize {
        self.identity_calls.load(Ordering::SeqCst)
    }

    pub fn pricing_calls(&self) -> usize {
        self.pricing_calls.load(Ordering::SeqCst)
    }

    pub fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }

    /// Every PMID passed to `fetch_pricing`, in call order.
    pub fn pricing_pmids(&self) -> Vec<String> {
        self.pricing_pmids.lock().expect("mock lock").clone()
    }

    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl ReviewBackend for MockBackend {
    async fn fetch_identity(&self) -> Result<Identity, ApiError> {
        self.identity_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.identities
            .lock()
            .expect("mock lock")
            .pop_front()
            .unwrap_or_else(|| {
                Err(ApiError::Network("no scripted identity response".to_string()))
            })
    }

    async fn fetch_pricing(&self, pmid: &str) -> Result<PricingInfo, ApiError> {
        self.pricing_calls.fetch_add(1, Ordering::SeqCst);
        self.pricing_pmids
            .lock()
            .expect("mock lock")
            .push(pmid.to_string());
        self.pause().await;
        self.pricings
            .lock()
            .expect("mock lock")
            .pop_front()
            .unwrap_or_else(|| {
                Err(ApiError::Network("no scripted pricing response".to_string()))
            })
    }

    async fn logout(&self) -> Result<(), ApiError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.logouts
            .lock()
            .expect("mock lock")
            .pop_front()
            .unwrap_or(Ok(()))
    }
}

// ============================================================================
// Recording navigator
// ============================================================================

/// A [`Navigator`] that counts redirects instead of navigating.
#[derive(Default)]
pub struct MockNavigator {
    logins: AtomicUsize,
}

impl MockNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn login_calls(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }
}

impl Navigator for MockNavigator {
    fn to_login(&self) {
        self.logins.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Session harness
// ============================================================================

/// A session over [`sample_document`] with a subscribed event receiver.
pub struct ReviewHarness {
    pub session: ReviewSession,
    pub events: broadcast::Receiver<ReviewEvent>,
}

impl ReviewHarness {
    pub fn new() -> Self {
        Self::with_vocab(Vocabulary::semrep())
    }

    pub fn with_vocab(vocab: Vocabulary) -> Self {
        let session = ReviewSession::new(
            sample_document(),
            vocab,
            SessionConfig::new(REVIEWER_EMAIL),
        );
        let events = session.subscribe();
        Self { session, events }
    }

    /// Events emitted since the last call.
    pub fn drain_events(&mut self) -> Vec<ReviewEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

impl Default for ReviewHarness {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Assertions and waiting
// ============================================================================

#[track_caller]
pub fn assert_sentence_decision(
    session: &ReviewSession,
    sentence: usize,
    expected: DecisionKind,
) {
    let actual = session.sentence_decision(sentence);
    assert_eq!(
        actual, expected,
        "sentence {sentence} derived {actual:?}, expected {expected:?}"
    );
}

#[track_caller]
pub fn assert_document_decision(session: &ReviewSession, expected: DecisionKind) {
    let actual = session.document_decision();
    assert_eq!(
        actual, expected,
        "document derived {actual:?}, expected {expected:?}"
    );
}

/// Poll `condition` until it holds, panicking after roughly two seconds.
/// For asserting on work done by background tasks.
pub async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within two seconds");
}
