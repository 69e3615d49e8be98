//! Audit-log entries for a finished review.
//!
//! A session flattens into atomic entries, one per consequential review
//! action, shaped like the rows the curation backend appends to its
//! assertion log. Accepting an assertion without touching it produces no
//! entry: for unchanged content, the absence of a row is the accept
//! signal.

use serde::{Deserialize, Serialize};

use crate::model::{AbstractDocument, AssertionFields, DecisionKind};
use crate::persist::unix_now;
use crate::store::SentenceReview;

/// Current log entry format version. Bump on breaking changes to
/// [`LogEntry`].
pub const LOG_VERSION: u32 = 1;

/// What a log entry records about an assertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogAction {
    Add,
    Modify,
    Accept,
    Reject,
    Uncertain,
}

impl std::fmt::Display for LogAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogAction::Add => "add",
            LogAction::Modify => "modify",
            LogAction::Accept => "accept",
            LogAction::Reject => "reject",
            LogAction::Uncertain => "uncertain",
        };
        f.write_str(s)
    }
}

/// One atomic review action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub version: u32,
    pub action: LogAction,
    /// Reviewer email.
    pub creator: String,
    pub pmid: String,
    pub sentence_idx: usize,
    pub sentence_text: String,
    pub subject: String,
    pub subject_type: String,
    pub predicate: String,
    pub object: String,
    pub object_type: String,
    #[serde(default)]
    pub negation: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Rejection reason; present only on reject entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Field names that differ from the extraction, in schema order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changed_fields: Vec<String>,
    pub content_hash: String,
    /// Unix seconds at build time.
    pub created_at: u64,
}

fn entry(
    action: LogAction,
    creator: &str,
    document: &AbstractDocument,
    sentence_idx: usize,
    sentence_text: &str,
    fields: &AssertionFields,
) -> LogEntry {
    LogEntry {
        version: LOG_VERSION,
        action,
        creator: creator.to_string(),
        pmid: document.pmid.clone(),
        sentence_idx,
        sentence_text: sentence_text.to_string(),
        subject: fields.subject.clone(),
        subject_type: fields.subject_type.clone(),
        predicate: fields.predicate.clone(),
        object: fields.object.clone(),
        object_type: fields.object_type.clone(),
        negation: fields.negation,
        comment: None,
        reason: None,
        changed_fields: Vec::new(),
        content_hash: fields.content_hash(&document.pmid, sentence_idx),
        created_at: unix_now(),
    }
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// Flatten a reviewed document into log entries.
///
/// `reviews` is index-aligned with `document.sentences`; a shorter slice
/// simply contributes nothing for the tail. Per assertion:
///
/// - accept without content changes → no entry;
/// - modify, or accept with the modified flag set → one entry carrying the
///   effective (edited) field values; its action is `modify` when those
///   values differ from the extraction and `accept` when the edit turned
///   out to be a no-op;
/// - reject → one `reject` entry with the original values, the record
///   comment doubling as the reason;
/// - uncertain → one `uncertain` entry with the original values and the
///   comment;
/// - each reviewer-added assertion with subject, predicate and object all
///   present → one `add` entry; incomplete proposals are skipped with a
///   warning.
pub fn build_submission(
    document: &AbstractDocument,
    reviews: &[SentenceReview],
    reviewer_email: &str,
) -> Vec<LogEntry> {
    let mut entries = Vec::new();

    for (sentence, review) in document.sentences.iter().zip(reviews) {
        for (index, assertion) in sentence.assertions.iter().enumerate() {
            let Some(record) = review.record(index) else {
                continue;
            };
            let original = assertion.fields();

            match record.decision {
                DecisionKind::Accept if !record.is_modified => {}
                DecisionKind::Accept | DecisionKind::Modify => {
                    let effective = review
                        .edit(index)
                        .cloned()
                        .unwrap_or_else(|| original.clone());
                    let changed = effective.changed_from(&original);
                    let action = if changed.is_empty() {
                        LogAction::Accept
                    } else {
                        LogAction::Modify
                    };
                    let mut row = entry(
                        action,
                        reviewer_email,
                        document,
                        sentence.index,
                        &sentence.text,
                        &effective,
                    );
                    row.comment = non_empty(&record.comment);
                    row.changed_fields = changed;
                    entries.push(row);
                }
                DecisionKind::Reject => {
                    let mut row = entry(
                        LogAction::Reject,
                        reviewer_email,
                        document,
                        sentence.index,
                        &sentence.text,
                        &original,
                    );
                    row.reason = non_empty(&record.comment);
                    entries.push(row);
                }
                DecisionKind::Uncertain => {
                    let mut row = entry(
                        LogAction::Uncertain,
                        reviewer_email,
                        document,
                        sentence.index,
                        &sentence.text,
                        &original,
                    );
                    row.comment = non_empty(&record.comment);
                    entries.push(row);
                }
            }
        }

        for proposed in review.added() {
            let fields = &proposed.fields;
            let complete = !fields.subject.trim().is_empty()
                && !fields.predicate.trim().is_empty()
                && !fields.object.trim().is_empty();
            if !complete {
                tracing::warn!(
                    pmid = %document.pmid,
                    sentence = sentence.index,
                    "skipping incomplete reviewer-added assertion"
                );
                continue;
            }
            let mut row = entry(
                LogAction::Add,
                reviewer_email,
                document,
                sentence.index,
                &sentence.text,
                fields,
            );
            row.comment = non_empty(&proposed.comment);
            entries.push(row);
        }
    }

    entries
}
