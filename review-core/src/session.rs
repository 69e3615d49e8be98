//! One reviewer working through one abstract.
//!
//! A [`ReviewSession`] owns the canonical document, one
//! [`SentenceReview`] per sentence, and the vocabulary the review is
//! constrained by. All mutation goes through `&mut self` methods that
//! report whether anything changed; real changes are broadcast as
//! [`ReviewEvent`]s, with sentence and document decisions re-derived and
//! emitted only when they actually moved. Collaborating views subscribe
//! instead of polling.

use std::collections::HashMap;

use thiserror::Error;
use tokio::sync::broadcast;

use crate::decision::{derive_decision, DecisionInput};
use crate::model::{
    AbstractDocument, AssertionFields, DecisionKind, ProposedAssertion, ReviewPatch, ReviewRecord,
};
use crate::store::SentenceReview;
use crate::submission::{self, LogEntry};
use crate::validation::{validate_fields, FieldError};
use crate::vocab::Vocabulary;

#[derive(Debug, Error)]
pub enum ReviewError {
    /// Blocking field-level findings; the session state was not touched.
    #[error("validation failed on {} field(s)", .0.len())]
    Validation(Vec<FieldError>),

    #[error("sentence index {0} out of range")]
    SentenceOutOfRange(usize),

    #[error("assertion index {assertion} out of range in sentence {sentence}")]
    AssertionOutOfRange { sentence: usize, assertion: usize },
}

/// Session tuning.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Email recorded as the creator of every log entry.
    pub reviewer_email: String,
    /// Broadcast channel capacity for review events.
    pub event_capacity: usize,
}

impl SessionConfig {
    pub fn new(reviewer_email: impl Into<String>) -> Self {
        Self {
            reviewer_email: reviewer_email.into(),
            event_capacity: 64,
        }
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }
}

/// Change notifications emitted by a session. Decision events fire only
/// when the derived value moved.
#[derive(Debug, Clone)]
pub enum ReviewEvent {
    RecordChanged {
        sentence: usize,
        assertion: usize,
        record: ReviewRecord,
    },
    AssertionEdited {
        sentence: usize,
        assertion: usize,
        fields: AssertionFields,
    },
    AssertionAdded {
        sentence: usize,
        added_index: usize,
    },
    AddedAssertionChanged {
        sentence: usize,
        added_index: usize,
    },
    AssertionRemoved {
        sentence: usize,
        added_index: usize,
    },
    SentenceDecision {
        sentence: usize,
        decision: DecisionKind,
    },
    DocumentDecision {
        decision: DecisionKind,
    },
}

pub struct ReviewSession {
    document: AbstractDocument,
    reviews: Vec<SentenceReview>,
    vocab: Vocabulary,
    config: SessionConfig,
    events: broadcast::Sender<ReviewEvent>,
    last_sentence_decisions: Vec<DecisionKind>,
    last_document_decision: DecisionKind,
}

impl ReviewSession {
    pub fn new(document: AbstractDocument, vocab: Vocabulary, config: SessionConfig) -> Self {
        let reviews: Vec<SentenceReview> = document
            .sentences
            .iter()
            .map(|s| SentenceReview::new(s.assertions.len()))
            .collect();
        let (events, _) = broadcast::channel(config.event_capacity);
        let mut session = Self {
            document,
            reviews,
            vocab,
            config,
            events,
            last_sentence_decisions: Vec::new(),
            last_document_decision: DecisionKind::Uncertain,
        };
        session.last_sentence_decisions = (0..session.document.sentences.len())
            .map(|i| session.sentence_decision(i))
            .collect();
        session.last_document_decision = session.document_decision();
        session
    }

    pub fn document(&self) -> &AbstractDocument {
        &self.document
    }

    pub fn review(&self, sentence: usize) -> Option<&SentenceReview> {
        self.reviews.get(sentence)
    }

    pub fn reviews(&self) -> &[SentenceReview] {
        &self.reviews
    }

    pub fn reviewer_email(&self) -> &str {
        &self.config.reviewer_email
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReviewEvent> {
        self.events.subscribe()
    }

    // ==================== record-level mutation ====================

    /// Set the decision dropdown for one assertion. Does not touch the
    /// modified flag. Returns true when the record changed.
    pub fn set_decision(
        &mut self,
        sentence: usize,
        assertion: usize,
        decision: DecisionKind,
    ) -> bool {
        self.apply_patch(sentence, assertion, &ReviewPatch::new().with_decision(decision))
    }

    /// Set the free-text comment for one assertion.
    pub fn set_comment(
        &mut self,
        sentence: usize,
        assertion: usize,
        comment: impl Into<String>,
    ) -> bool {
        self.apply_patch(sentence, assertion, &ReviewPatch::new().with_comment(comment))
    }

    /// Flag one assertion's content as edited, forcing its decision to
    /// `Modify`. The only path that couples the two.
    pub fn mark_modified(&mut self, sentence: usize, assertion: usize) -> bool {
        let Some(review) = self.reviews.get_mut(sentence) else {
            debug_assert!(false, "sentence index {sentence} out of range");
            return false;
        };
        if !review.mark_modified(assertion) {
            return false;
        }
        self.emit_record_changed(sentence, assertion);
        self.emit_decision_diffs(sentence);
        true
    }

    fn apply_patch(&mut self, sentence: usize, assertion: usize, patch: &ReviewPatch) -> bool {
        let Some(review) = self.reviews.get_mut(sentence) else {
            debug_assert!(false, "sentence index {sentence} out of range");
            return false;
        };
        if !review.update(assertion, patch) {
            return false;
        }
        self.emit_record_changed(sentence, assertion);
        self.emit_decision_diffs(sentence);
        true
    }

    // ==================== content mutation ====================

    /// Replace the content fields of a canonical assertion with reviewer
    /// edits.
    ///
    /// Fields are validated against the vocabulary and the sentence text
    /// first; any finding returns `ReviewError::Validation` and leaves the
    /// session untouched. On success the edit is stored and the record is
    /// marked modified.
    pub fn edit_assertion(
        &mut self,
        sentence: usize,
        assertion: usize,
        fields: AssertionFields,
    ) -> Result<(), ReviewError> {
        let Some(sentence_model) = self.document.sentences.get(sentence) else {
            debug_assert!(false, "sentence index {sentence} out of range");
            return Err(ReviewError::SentenceOutOfRange(sentence));
        };
        if assertion >= sentence_model.assertions.len() {
            debug_assert!(
                false,
                "assertion index {assertion} out of range in sentence {sentence}"
            );
            return Err(ReviewError::AssertionOutOfRange {
                sentence,
                assertion,
            });
        }

        let report = validate_fields(&fields, &sentence_model.text, &self.vocab);
        if !report.is_ok() {
            return Err(ReviewError::Validation(report.errors));
        }

        let review = &mut self.reviews[sentence];
        let edited = review.set_edit(assertion, fields.clone());
        let marked = review.mark_modified(assertion);
        if edited {
            let _ = self.events.send(ReviewEvent::AssertionEdited {
                sentence,
                assertion,
                fields,
            });
        }
        if marked {
            self.emit_record_changed(sentence, assertion);
        }
        if edited || marked {
            self.emit_decision_diffs(sentence);
        }
        Ok(())
    }

    /// Propose a new assertion for one sentence.
    ///
    /// Subject, predicate and object are required; all fields go through
    /// the same validation as edits. Returns the index of the proposal in
    /// the sentence's added list.
    pub fn add_assertion(
        &mut self,
        sentence: usize,
        proposed: ProposedAssertion,
    ) -> Result<usize, ReviewError> {
        let Some(sentence_model) = self.document.sentences.get(sentence) else {
            debug_assert!(false, "sentence index {sentence} out of range");
            return Err(ReviewError::SentenceOutOfRange(sentence));
        };

        let report = validate_fields(&proposed.fields, &sentence_model.text, &self.vocab);
        if !report.is_ok() {
            return Err(ReviewError::Validation(report.errors));
        }

        let added_index = self.reviews[sentence].push_added(proposed);
        let _ = self.events.send(ReviewEvent::AssertionAdded {
            sentence,
            added_index,
        });
        self.emit_decision_diffs(sentence);
        Ok(added_index)
    }

    /// Re-edit a pending reviewer-added assertion.
    pub fn edit_added(
        &mut self,
        sentence: usize,
        added_index: usize,
        fields: AssertionFields,
    ) -> Result<(), ReviewError> {
        let Some(sentence_model) = self.document.sentences.get(sentence) else {
            debug_assert!(false, "sentence index {sentence} out of range");
            return Err(ReviewError::SentenceOutOfRange(sentence));
        };

        let report = validate_fields(&fields, &sentence_model.text, &self.vocab);
        if !report.is_ok() {
            return Err(ReviewError::Validation(report.errors));
        }

        if self.reviews[sentence].set_added_fields(added_index, fields) {
            let _ = self.events.send(ReviewEvent::AddedAssertionChanged {
                sentence,
                added_index,
            });
        }
        Ok(())
    }

    /// Withdraw a pending reviewer-added assertion. Canonical assertions
    /// are not removable; rejection is the tool for those.
    pub fn remove_added(&mut self, sentence: usize, added_index: usize) -> bool {
        let Some(review) = self.reviews.get_mut(sentence) else {
            debug_assert!(false, "sentence index {sentence} out of range");
            return false;
        };
        if review.remove_added(added_index).is_none() {
            return false;
        }
        let _ = self.events.send(ReviewEvent::AssertionRemoved {
            sentence,
            added_index,
        });
        self.emit_decision_diffs(sentence);
        true
    }

    // ==================== document sync ====================

    /// Swap in a re-fetched canonical document, re-syncing every
    /// sentence's records while preserving uncommitted local state.
    /// Returns true when anything changed; reconciling twice with the same
    /// document is a reported no-op.
    pub fn reconcile(&mut self, canonical: AbstractDocument) -> bool {
        let mut changed = self.document != canonical;
        self.document = canonical;

        let count = self.document.sentences.len();
        self.reviews.resize_with(count, SentenceReview::default);

        // A re-fetch carries no per-assertion review records, so the
        // canonical map is empty: local records survive, counts re-align.
        let canonical_records = HashMap::new();
        for (review, sentence) in self.reviews.iter_mut().zip(&self.document.sentences) {
            if review.reconcile(&canonical_records, sentence.assertions.len()) {
                changed = true;
            }
        }

        self.last_sentence_decisions
            .resize(count, DecisionKind::Uncertain);
        if changed {
            for sentence in 0..count {
                self.emit_sentence_decision_diff(sentence);
            }
            self.emit_document_decision_diff();
        }
        changed
    }

    // ==================== derived decisions ====================

    /// Aggregate decision for one sentence, derived from its records and
    /// pending additions.
    pub fn sentence_decision(&self, sentence: usize) -> DecisionKind {
        let Some(review) = self.reviews.get(sentence) else {
            return DecisionKind::Uncertain;
        };
        derive_decision(&review.decision_inputs(), review.added_count())
    }

    /// Aggregate decision for the whole abstract: each sentence's derived
    /// decision feeds the same rules one level up.
    pub fn document_decision(&self) -> DecisionKind {
        let inputs: Vec<DecisionInput> = (0..self.document.sentences.len())
            .map(|i| DecisionInput::from_summary(self.sentence_decision(i)))
            .collect();
        derive_decision(&inputs, 0)
    }

    // ==================== submission ====================

    /// Flatten the session into audit-log entries (see
    /// [`crate::submission::build_submission`]).
    pub fn build_submission(&self) -> Vec<LogEntry> {
        submission::build_submission(&self.document, &self.reviews, &self.config.reviewer_email)
    }

    // ==================== event plumbing ====================

    fn emit_record_changed(&self, sentence: usize, assertion: usize) {
        if let Some(record) = self
            .reviews
            .get(sentence)
            .and_then(|r| r.record(assertion))
        {
            let _ = self.events.send(ReviewEvent::RecordChanged {
                sentence,
                assertion,
                record: record.clone(),
            });
        }
    }

    fn emit_decision_diffs(&mut self, sentence: usize) {
        self.emit_sentence_decision_diff(sentence);
        self.emit_document_decision_diff();
    }

    fn emit_sentence_decision_diff(&mut self, sentence: usize) {
        let decision = self.sentence_decision(sentence);
        match self.last_sentence_decisions.get_mut(sentence) {
            Some(last) if *last != decision => {
                *last = decision;
                let _ = self.events.send(ReviewEvent::SentenceDecision {
                    sentence,
                    decision,
                });
            }
            _ => {}
        }
    }

    fn emit_document_decision_diff(&mut self) {
        let decision = self.document_decision();
        if self.last_document_decision != decision {
            self.last_document_decision = decision;
            let _ = self.events.send(ReviewEvent::DocumentDecision { decision });
        }
    }
}
