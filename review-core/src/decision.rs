//! Decision derivation for sentences and documents.
//!
//! The same precedence runs at both levels: sentence decisions are derived
//! from assertion records, and the document decision re-applies the function
//! with the sentence summaries as inputs.

use crate::model::{DecisionKind, ReviewRecord};

/// The decision-bearing slice of a review, uniform across levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecisionInput {
    pub decision: DecisionKind,
    pub modified: bool,
}

impl DecisionInput {
    pub fn new(decision: DecisionKind, modified: bool) -> Self {
        Self { decision, modified }
    }

    /// Lift a summary decision into an input for the next level up. A
    /// summary carries no separate modified flag, so `Modify` implies it.
    pub fn from_summary(decision: DecisionKind) -> Self {
        Self {
            decision,
            modified: decision == DecisionKind::Modify,
        }
    }
}

impl From<&ReviewRecord> for DecisionInput {
    fn from(record: &ReviewRecord) -> Self {
        Self {
            decision: record.decision,
            modified: record.is_modified,
        }
    }
}

/// Fold review inputs plus the count of reviewer-added assertions into one
/// decision.
///
/// Precedence:
/// 1. any modification wins
/// 2. then any rejection
/// 3. a non-empty, all-accept set with nothing added is an accept
/// 4. additions alone make the unit modified
/// 5. everything else is uncertain
pub fn derive_decision(inputs: &[DecisionInput], added_count: usize) -> DecisionKind {
    if inputs
        .iter()
        .any(|i| i.modified || i.decision == DecisionKind::Modify)
    {
        return DecisionKind::Modify;
    }

    if inputs.iter().any(|i| i.decision == DecisionKind::Reject) {
        return DecisionKind::Reject;
    }

    if !inputs.is_empty()
        && added_count == 0
        && inputs.iter().all(|i| i.decision == DecisionKind::Accept)
    {
        return DecisionKind::Accept;
    }

    if added_count > 0 {
        return DecisionKind::Modify;
    }

    DecisionKind::Uncertain
}
