//! Per-sentence review state.
//!
//! A [`SentenceReview`] holds one [`ReviewRecord`] per canonical assertion
//! of its sentence, index-aligned with the document model, plus any pending
//! field edits and reviewer-proposed assertions. Mutating methods report
//! whether anything actually changed so callers can suppress no-op change
//! events.
//!
//! Indices are a caller contract: out-of-range access trips a debug
//! assertion during development and becomes a no-op in release builds.

use std::collections::HashMap;

use crate::decision::DecisionInput;
use crate::model::{AssertionFields, DecisionKind, ProposedAssertion, ReviewPatch, ReviewRecord};

/// Review state for the assertions of one sentence.
#[derive(Debug, Clone, Default)]
pub struct SentenceReview {
    /// One record per canonical assertion.
    records: Vec<ReviewRecord>,
    /// Pending field edits, index-aligned with `records`.
    edits: Vec<Option<AssertionFields>>,
    /// Assertions proposed by the reviewer for this sentence.
    added: Vec<ProposedAssertion>,
}

impl SentenceReview {
    /// Fresh state for a sentence with `assertion_count` assertions: every
    /// record defaults to an unmodified accept.
    pub fn new(assertion_count: usize) -> Self {
        Self {
            records: vec![ReviewRecord::default(); assertion_count],
            edits: vec![None; assertion_count],
            added: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ReviewRecord] {
        &self.records
    }

    pub fn record(&self, index: usize) -> Option<&ReviewRecord> {
        self.records.get(index)
    }

    /// The pending field edit for one assertion, if any.
    pub fn edit(&self, index: usize) -> Option<&AssertionFields> {
        self.edits.get(index).and_then(|e| e.as_ref())
    }

    pub fn added(&self) -> &[ProposedAssertion] {
        &self.added
    }

    pub fn added_count(&self) -> usize {
        self.added.len()
    }

    /// Re-sync the records against a server-confirmed canonical map after
    /// a document re-fetch.
    ///
    /// Preference per index: the canonical record if present, else the
    /// existing local record, else a fresh default. A canonical entry
    /// overrides local state, while an uncommitted local record survives
    /// as long as the server is silent about its index. Pending field
    /// edits below the new count are kept; the rest are truncated with
    /// their records. Returns true when anything changed, so reconciling
    /// twice with the same inputs is a reported no-op.
    pub fn reconcile(
        &mut self,
        canonical: &HashMap<usize, ReviewRecord>,
        assertion_count: usize,
    ) -> bool {
        let next: Vec<ReviewRecord> = (0..assertion_count)
            .map(|index| {
                canonical
                    .get(&index)
                    .cloned()
                    .or_else(|| self.records.get(index).cloned())
                    .unwrap_or_default()
            })
            .collect();
        if next == self.records && self.edits.len() == assertion_count {
            return false;
        }
        self.records = next;
        self.edits.resize(assertion_count, None);
        true
    }

    /// Apply a patch to one record. Returns true when a field changed.
    pub fn update(&mut self, index: usize, patch: &ReviewPatch) -> bool {
        match self.record_mut(index) {
            Some(record) => record.apply(patch),
            None => false,
        }
    }

    /// Mark one assertion as content-modified. The decision moves to
    /// `Modify` along with the flag.
    pub fn mark_modified(&mut self, index: usize) -> bool {
        self.update(
            index,
            &ReviewPatch::new()
                .with_decision(DecisionKind::Modify)
                .with_modified(true),
        )
    }

    /// Stash edited fields for one assertion without touching the canonical
    /// extraction. Returns true when the stored edit changed.
    pub fn set_edit(&mut self, index: usize, fields: AssertionFields) -> bool {
        debug_assert!(
            index < self.edits.len(),
            "edit index {index} out of range ({} records)",
            self.edits.len()
        );
        match self.edits.get_mut(index) {
            Some(slot) if slot.as_ref() == Some(&fields) => false,
            Some(slot) => {
                *slot = Some(fields);
                true
            }
            None => false,
        }
    }

    /// Drop the record and pending edit for a removed canonical assertion,
    /// shifting later records down.
    pub fn remove(&mut self, index: usize) -> bool {
        debug_assert!(
            index < self.records.len(),
            "record index {index} out of range ({} records)",
            self.records.len()
        );
        if index >= self.records.len() {
            return false;
        }
        self.records.remove(index);
        self.edits.remove(index);
        true
    }

    /// Track a reviewer-proposed assertion. Returns its index within the
    /// added list.
    pub fn push_added(&mut self, proposed: ProposedAssertion) -> usize {
        self.added.push(proposed);
        self.added.len() - 1
    }

    /// Withdraw a proposed assertion, shifting later proposals down.
    pub fn remove_added(&mut self, index: usize) -> Option<ProposedAssertion> {
        debug_assert!(
            index < self.added.len(),
            "added index {index} out of range ({} proposals)",
            self.added.len()
        );
        if index >= self.added.len() {
            return None;
        }
        Some(self.added.remove(index))
    }

    /// Replace the fields of a proposed assertion. Returns true when they
    /// changed.
    pub fn set_added_fields(&mut self, index: usize, fields: AssertionFields) -> bool {
        debug_assert!(
            index < self.added.len(),
            "added index {index} out of range ({} proposals)",
            self.added.len()
        );
        match self.added.get_mut(index) {
            Some(proposed) if proposed.fields == fields => false,
            Some(proposed) => {
                proposed.fields = fields;
                true
            }
            None => false,
        }
    }

    /// Inputs for decision derivation: one per record.
    pub fn decision_inputs(&self) -> Vec<DecisionInput> {
        self.records.iter().map(DecisionInput::from).collect()
    }

    fn record_mut(&mut self, index: usize) -> Option<&mut ReviewRecord> {
        debug_assert!(
            index < self.records.len(),
            "record index {index} out of range ({} records)",
            self.records.len()
        );
        self.records.get_mut(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AssertionFields;

    fn patch_reject() -> ReviewPatch {
        ReviewPatch::new().with_decision(DecisionKind::Reject)
    }

    #[test]
    fn test_new_defaults_to_accept() {
        let review = SentenceReview::new(3);
        assert_eq!(review.len(), 3);
        for record in review.records() {
            assert_eq!(record.decision, DecisionKind::Accept);
            assert!(!record.is_modified);
            assert!(record.comment.is_empty());
        }
    }

    #[test]
    fn test_update_reports_change_and_noop() {
        let mut review = SentenceReview::new(2);
        assert!(review.update(1, &patch_reject()));
        assert_eq!(review.record(1).unwrap().decision, DecisionKind::Reject);
        // Applying the identical patch again changes nothing.
        assert!(!review.update(1, &patch_reject()));
        // Slot 0 untouched.
        assert_eq!(review.record(0).unwrap().decision, DecisionKind::Accept);
    }

    #[test]
    fn test_mark_modified_sets_decision_and_flag() {
        let mut review = SentenceReview::new(1);
        assert!(review.mark_modified(0));
        let record = review.record(0).unwrap();
        assert_eq!(record.decision, DecisionKind::Modify);
        assert!(record.is_modified);
        assert!(!review.mark_modified(0));
    }

    #[test]
    fn test_reconcile_grows_with_defaults() {
        let mut review = SentenceReview::new(1);
        review.update(0, &patch_reject());

        assert!(review.reconcile(&HashMap::new(), 3));
        assert_eq!(review.len(), 3);
        // The local decision survives; new slots default to accept.
        assert_eq!(review.record(0).unwrap().decision, DecisionKind::Reject);
        assert_eq!(review.record(2).unwrap().decision, DecisionKind::Accept);
    }

    #[test]
    fn test_reconcile_shrinks_to_canonical() {
        let mut review = SentenceReview::new(3);
        review.update(2, &patch_reject());

        assert!(review.reconcile(&HashMap::new(), 2));
        assert_eq!(review.len(), 2);
        assert!(review.record(2).is_none());
    }

    #[test]
    fn test_reconcile_canonical_entry_overrides_local() {
        let mut review = SentenceReview::new(2);
        review.update(0, &ReviewPatch::new().with_comment("local comment"));

        let confirmed = ReviewRecord {
            decision: DecisionKind::Reject,
            comment: "server wins".to_string(),
            is_modified: false,
        };
        let canonical = HashMap::from([(0, confirmed)]);

        assert!(review.reconcile(&canonical, 2));
        assert_eq!(review.record(0).unwrap().decision, DecisionKind::Reject);
        assert_eq!(review.record(0).unwrap().comment, "server wins");
        // Index 1 had no canonical entry and keeps its default.
        assert_eq!(review.record(1).unwrap().decision, DecisionKind::Accept);
    }

    #[test]
    fn test_reconcile_preserves_local_when_canonical_silent() {
        let mut review = SentenceReview::new(2);
        review.update(0, &ReviewPatch::new().with_comment("keep me"));

        assert!(!review.reconcile(&HashMap::new(), 2));
        // The uncommitted local record is untouched.
        assert_eq!(review.record(0).unwrap().comment, "keep me");
        // Idempotent: still a no-op on the second call.
        assert!(!review.reconcile(&HashMap::new(), 2));
    }

    #[test]
    fn test_remove_shifts_later_records() {
        let mut review = SentenceReview::new(3);
        review.update(2, &patch_reject());
        review.set_edit(2, AssertionFields::new("a", "TREATS", "b"));

        assert!(review.remove(0));
        assert_eq!(review.len(), 2);
        // The record that was at index 2 is now at index 1, edit included.
        assert_eq!(review.record(1).unwrap().decision, DecisionKind::Reject);
        assert!(review.edit(1).is_some());
        assert!(review.edit(0).is_none());
    }

    #[test]
    fn test_set_edit_detects_identical_fields() {
        let mut review = SentenceReview::new(1);
        let fields = AssertionFields::new("Metformin", "TREATS", "diabetes");
        assert!(review.set_edit(0, fields.clone()));
        assert!(!review.set_edit(0, fields));
        assert!(review.set_edit(0, AssertionFields::new("Metformin", "PREVENTS", "diabetes")));
    }

    #[test]
    fn test_added_lifecycle() {
        let mut review = SentenceReview::new(0);
        let first = review.push_added(ProposedAssertion::new(AssertionFields::new(
            "aspirin", "TREATS", "pain",
        )));
        let second = review.push_added(ProposedAssertion::new(AssertionFields::new(
            "insulin", "TREATS", "diabetes",
        )));
        assert_eq!((first, second), (0, 1));
        assert_eq!(review.added_count(), 2);

        let removed = review.remove_added(0).unwrap();
        assert_eq!(removed.fields.subject, "aspirin");
        // The second proposal shifted down.
        assert_eq!(review.added()[0].fields.subject, "insulin");
    }

    #[test]
    fn test_set_added_fields_change_detection() {
        let mut review = SentenceReview::new(0);
        review.push_added(ProposedAssertion::new(AssertionFields::new(
            "aspirin", "TREATS", "pain",
        )));
        let same = AssertionFields::new("aspirin", "TREATS", "pain");
        assert!(!review.set_added_fields(0, same));
        assert!(review.set_added_fields(0, AssertionFields::new("aspirin", "PREVENTS", "pain")));
    }

    #[test]
    fn test_decision_inputs_mirror_records() {
        let mut review = SentenceReview::new(2);
        review.mark_modified(1);
        let inputs = review.decision_inputs();
        assert_eq!(inputs.len(), 2);
        assert!(!inputs[0].modified);
        assert!(inputs[1].modified);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "out of range")]
    fn test_out_of_range_update_panics_in_debug() {
        let mut review = SentenceReview::new(1);
        review.update(5, &patch_reject());
    }
}
