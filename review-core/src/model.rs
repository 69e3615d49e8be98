//! Core data model for abstract review.
//!
//! An abstract arrives from the extraction pipeline as sentences, each
//! carrying zero or more subject-predicate-object assertions. Reviewers
//! judge every assertion and may propose new ones; those judgements live in
//! [`crate::store::SentenceReview`] values index-aligned with this model.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A subject-predicate-object assertion extracted from one sentence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assertion {
    pub subject: String,
    pub subject_type: String,
    pub predicate: String,
    pub object: String,
    pub object_type: String,
    #[serde(default)]
    pub negation: bool,

    /// Email of the reviewer who originally proposed this assertion, for
    /// assertions that entered the corpus through an earlier review round.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

impl Assertion {
    /// Create an assertion from its five content fields.
    pub fn new(
        subject: impl Into<String>,
        subject_type: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
        object_type: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            subject_type: subject_type.into(),
            predicate: predicate.into(),
            object: object.into(),
            object_type: object_type.into(),
            negation: false,
            created_by: None,
        }
    }

    /// Mark the assertion as negated.
    pub fn with_negation(mut self, negation: bool) -> Self {
        self.negation = negation;
        self
    }

    /// Record who proposed the assertion.
    pub fn with_created_by(mut self, email: impl Into<String>) -> Self {
        self.created_by = Some(email.into());
        self
    }

    /// The editable content fields of this assertion.
    pub fn fields(&self) -> AssertionFields {
        AssertionFields {
            subject: self.subject.clone(),
            subject_type: self.subject_type.clone(),
            predicate: self.predicate.clone(),
            object: self.object.clone(),
            object_type: self.object_type.clone(),
            negation: self.negation,
        }
    }

    /// Deterministic key grouping the same logical content across log
    /// entries. Verbatim field values, no case folding: changing the key
    /// scheme would change historical grouping.
    pub fn content_key(&self) -> String {
        self.fields().content_key()
    }

    /// Stable identifier for this assertion within one abstract.
    pub fn content_hash(&self, pmid: &str, sentence_idx: usize) -> String {
        self.fields().content_hash(pmid, sentence_idx)
    }
}

/// The editable content fields of an assertion, as captured from a review
/// form. Separated from [`Assertion`] so pending edits can be held without
/// touching the canonical extraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssertionFields {
    pub subject: String,
    pub subject_type: String,
    pub predicate: String,
    pub object: String,
    pub object_type: String,
    #[serde(default)]
    pub negation: bool,
}

impl AssertionFields {
    /// Create fields from the three required parts, leaving types empty.
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
            ..Default::default()
        }
    }

    /// Set the subject entity type.
    pub fn with_subject_type(mut self, subject_type: impl Into<String>) -> Self {
        self.subject_type = subject_type.into();
        self
    }

    /// Set the object entity type.
    pub fn with_object_type(mut self, object_type: impl Into<String>) -> Self {
        self.object_type = object_type.into();
        self
    }

    /// Mark the assertion as negated.
    pub fn with_negation(mut self, negation: bool) -> Self {
        self.negation = negation;
        self
    }

    /// See [`Assertion::content_key`].
    pub fn content_key(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}",
            self.subject, self.subject_type, self.predicate, self.object, self.object_type
        )
    }

    /// SHA-256 hex over the content fields plus their position, every part
    /// trimmed and lowercased, joined with `|`.
    pub fn content_hash(&self, pmid: &str, sentence_idx: usize) -> String {
        let parts = [
            pmid.to_string(),
            sentence_idx.to_string(),
            self.subject.clone(),
            self.subject_type.clone(),
            self.predicate.clone(),
            self.object.clone(),
            self.object_type.clone(),
        ];
        let joined = parts
            .iter()
            .map(|p| p.trim().to_lowercase())
            .collect::<Vec<_>>()
            .join("|");

        let mut hasher = Sha256::new();
        hasher.update(joined.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Names of the fields that differ from `original`, in schema order.
    pub fn changed_from(&self, original: &AssertionFields) -> Vec<String> {
        let mut changed = Vec::new();
        if self.subject != original.subject {
            changed.push("subject".to_string());
        }
        if self.subject_type != original.subject_type {
            changed.push("subject_type".to_string());
        }
        if self.predicate != original.predicate {
            changed.push("predicate".to_string());
        }
        if self.object != original.object {
            changed.push("object".to_string());
        }
        if self.object_type != original.object_type {
            changed.push("object_type".to_string());
        }
        if self.negation != original.negation {
            changed.push("negation".to_string());
        }
        changed
    }
}

impl From<&Assertion> for AssertionFields {
    fn from(assertion: &Assertion) -> Self {
        assertion.fields()
    }
}

/// An assertion proposed by the reviewer, not present in the extraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProposedAssertion {
    pub fields: AssertionFields,
    #[serde(default)]
    pub comment: String,
}

impl ProposedAssertion {
    pub fn new(fields: AssertionFields) -> Self {
        Self {
            fields,
            comment: String::new(),
        }
    }

    /// Attach a free-text comment logged with the proposal.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }
}

/// One sentence of an abstract with its extracted assertions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentence {
    /// Position within the abstract, starting at 0.
    pub index: usize,
    pub text: String,
    #[serde(default)]
    pub assertions: Vec<Assertion>,
}

impl Sentence {
    pub fn new(index: usize, text: impl Into<String>, assertions: Vec<Assertion>) -> Self {
        Self {
            index,
            text: text.into(),
            assertions,
        }
    }
}

/// A PubMed abstract prepared for review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbstractDocument {
    pub pmid: String,
    pub title: String,
    #[serde(default)]
    pub journal: String,
    #[serde(default)]
    pub year: Option<String>,
    #[serde(default)]
    pub doi: Option<String>,
    pub sentences: Vec<Sentence>,
    pub sentence_count: usize,
}

impl AbstractDocument {
    /// Build a document; the sentence count is derived from the sentences.
    pub fn new(pmid: impl Into<String>, title: impl Into<String>, sentences: Vec<Sentence>) -> Self {
        let sentence_count = sentences.len();
        Self {
            pmid: pmid.into(),
            title: title.into(),
            journal: String::new(),
            year: None,
            doi: None,
            sentences,
            sentence_count,
        }
    }

    /// Set the journal name.
    pub fn with_journal(mut self, journal: impl Into<String>) -> Self {
        self.journal = journal.into();
        self
    }

    /// Set the publication year.
    pub fn with_year(mut self, year: impl Into<String>) -> Self {
        self.year = Some(year.into());
        self
    }

    /// Total assertions across all sentences.
    pub fn assertion_count(&self) -> usize {
        self.sentences.iter().map(|s| s.assertions.len()).sum()
    }
}

/// Reviewer verdict on a single assertion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionKind {
    #[default]
    Accept,
    Modify,
    Reject,
    Uncertain,
}

impl std::fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DecisionKind::Accept => "accept",
            DecisionKind::Modify => "modify",
            DecisionKind::Reject => "reject",
            DecisionKind::Uncertain => "uncertain",
        };
        f.write_str(s)
    }
}

/// Review state for one assertion.
///
/// A fresh record means "accepted as-is": the extraction stands unless the
/// reviewer says otherwise.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    #[serde(default)]
    pub decision: DecisionKind,
    #[serde(default)]
    pub comment: String,
    /// Whether the assertion content was edited, independent of the
    /// decision dropdown.
    #[serde(default)]
    pub is_modified: bool,
}

impl ReviewRecord {
    /// Apply a patch field-wise. Returns true when any field actually
    /// changed, so callers can suppress no-op change events.
    pub fn apply(&mut self, patch: &ReviewPatch) -> bool {
        let mut changed = false;
        if let Some(decision) = patch.decision {
            if self.decision != decision {
                self.decision = decision;
                changed = true;
            }
        }
        if let Some(comment) = &patch.comment {
            if &self.comment != comment {
                self.comment = comment.clone();
                changed = true;
            }
        }
        if let Some(modified) = patch.modified {
            if self.is_modified != modified {
                self.is_modified = modified;
                changed = true;
            }
        }
        changed
    }
}

/// Field-wise update to a [`ReviewRecord`]; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewPatch {
    pub decision: Option<DecisionKind>,
    pub comment: Option<String>,
    pub modified: Option<bool>,
}

impl ReviewPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the decision.
    pub fn with_decision(mut self, decision: DecisionKind) -> Self {
        self.decision = Some(decision);
        self
    }

    /// Set the comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Set the modified flag.
    pub fn with_modified(mut self, modified: bool) -> Self {
        self.modified = Some(modified);
        self
    }
}
