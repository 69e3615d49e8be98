//! Core engine for curated review of extracted assertions.
//!
//! This crate provides:
//! - A document model for PubMed abstracts with per-assertion review
//!   records, pending field edits and reviewer-proposed additions
//! - Decision derivation rolling assertion records up into sentence and
//!   document decisions through one precedence function
//! - Field validation against the SemRep vocabulary and the literal
//!   sentence text
//! - TTL-bounded single-flight caches for session identity and pricing,
//!   broadcasting every state transition
//! - Versioned identity snapshots on disk for instant cold starts
//! - Audit-log entry building for submission
//!
//! # Quick Start
//!
//! ```ignore
//! use review_core::{DecisionKind, ReviewSession, SessionConfig, Vocabulary};
//!
//! let mut session = ReviewSession::new(
//!     document,
//!     Vocabulary::semrep(),
//!     SessionConfig::new("reviewer@example.org"),
//! );
//!
//! session.set_decision(0, 0, DecisionKind::Reject);
//! session.set_comment(0, 0, "predicate not supported by the sentence");
//!
//! let entries = session.build_submission();
//! ```

pub mod backend;
pub mod cache;
pub mod decision;
pub mod identity;
pub mod matching;
pub mod model;
pub mod persist;
pub mod pricing;
pub mod session;
pub mod store;
pub mod submission;
pub mod testing;
pub mod validation;
pub mod vocab;

// Re-export the wire client for convenience
pub use review_client::{ApiError, Identity, PricingInfo, ReviewApi, ReviewerStats};

// Primary public API
pub use backend::ReviewBackend;
pub use cache::{CacheSnapshot, CacheStatus, FetchError, ResourceCache};
pub use identity::{IdentityCache, IdentityCacheConfig, Navigator};
pub use model::{AbstractDocument, Assertion, AssertionFields, DecisionKind, Sentence};
pub use pricing::{PricingCache, PricingCacheConfig};
pub use session::{ReviewError, ReviewEvent, ReviewSession, SessionConfig};
pub use submission::{build_submission, LogAction, LogEntry};
pub use testing::{MockBackend, MockNavigator, ReviewHarness};
pub use vocab::Vocabulary;
