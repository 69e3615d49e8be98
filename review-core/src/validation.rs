//! Field-level validation for edited and proposed assertions.
//!
//! Failures are recoverable by design: the caller gets every finding in one
//! report and the review state stays untouched until the form passes.

use crate::matching;
use crate::model::AssertionFields;
use crate::vocab::Vocabulary;
use thiserror::Error;

/// The assertion form field a finding points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Subject,
    SubjectType,
    Predicate,
    Object,
    ObjectType,
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Field::Subject => "subject",
            Field::SubjectType => "subject type",
            Field::Predicate => "predicate",
            Field::Object => "object",
            Field::ObjectType => "object type",
        };
        f.write_str(s)
    }
}

/// A single validation finding.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FieldError {
    #[error("{field} must not be empty")]
    Empty { field: Field },

    #[error("{field} {value:?} is not in the controlled vocabulary")]
    NotInVocabulary { field: Field, value: String },

    #[error("{field} {value:?} does not appear in the sentence")]
    NotInSentence { field: Field, value: String },
}

impl FieldError {
    pub fn field(&self) -> Field {
        match self {
            FieldError::Empty { field }
            | FieldError::NotInVocabulary { field, .. }
            | FieldError::NotInSentence { field, .. } => *field,
        }
    }
}

/// Outcome of validating one assertion form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    /// Blocking findings: the form must not be applied.
    pub errors: Vec<FieldError>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate an assertion form against its sentence and the vocabulary.
///
/// Every finding blocks. Subject and object spans must still be found in
/// the sentence under [`matching::normalize`]; a span that paraphrases the
/// text instead of quoting it is refused.
pub fn validate_fields(
    fields: &AssertionFields,
    sentence_text: &str,
    vocab: &Vocabulary,
) -> ValidationReport {
    let mut report = ValidationReport::default();

    check_required(&mut report, Field::Subject, &fields.subject);
    check_required(&mut report, Field::Predicate, &fields.predicate);
    check_required(&mut report, Field::Object, &fields.object);

    if !fields.predicate.trim().is_empty() && !vocab.is_valid_predicate(&fields.predicate) {
        report.errors.push(FieldError::NotInVocabulary {
            field: Field::Predicate,
            value: fields.predicate.clone(),
        });
    }

    // Entity types are optional. Filled-in values must come from the
    // vocabulary.
    check_entity_type(&mut report, vocab, Field::SubjectType, &fields.subject_type);
    check_entity_type(&mut report, vocab, Field::ObjectType, &fields.object_type);

    check_containment(&mut report, Field::Subject, &fields.subject, sentence_text);
    check_containment(&mut report, Field::Object, &fields.object, sentence_text);

    report
}

fn check_required(report: &mut ValidationReport, field: Field, value: &str) {
    if value.trim().is_empty() {
        report.errors.push(FieldError::Empty { field });
    }
}

fn check_entity_type(report: &mut ValidationReport, vocab: &Vocabulary, field: Field, value: &str) {
    if !value.trim().is_empty() && !vocab.is_valid_entity_type(value) {
        report.errors.push(FieldError::NotInVocabulary {
            field,
            value: value.to_string(),
        });
    }
}

fn check_containment(report: &mut ValidationReport, field: Field, value: &str, sentence: &str) {
    if !value.trim().is_empty() && !matching::is_contained(value, sentence) {
        report.errors.push(FieldError::NotInSentence {
            field,
            value: value.to_string(),
        });
    }
}
