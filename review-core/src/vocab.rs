//! Controlled vocabularies for predicates and entity types.
//!
//! Canonical predicates are UMLS-style UPPERCASE; canonical entity types are
//! lowercase. Validation is exact and case-sensitive against the canonical
//! spelling, and an empty whitelist means the field is unconstrained.

use serde::{Deserialize, Serialize};

/// One term of a controlled vocabulary, shaped for UI dropdowns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabEntry {
    pub id: String,
    pub label: String,
    pub description: String,
}

impl VocabEntry {
    /// A term whose label is its id, the shape the review UI renders.
    pub fn term(id: impl Into<String>, description: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            description: description.into(),
        }
    }
}

lazy_static::lazy_static! {
    /// SemRep predicate vocabulary (UMLS semantic relations).
    pub static ref SEMREP_PREDICATES: Vec<VocabEntry> = vec![
        VocabEntry::term("PREDISPOSES", "X increases the likelihood of Y."),
        VocabEntry::term("COEXISTS_WITH", "X and Y are observed together."),
        VocabEntry::term("TREATS", "X is used to treat Y."),
        VocabEntry::term("AFFECTS", "X has an effect on Y."),
        VocabEntry::term("ISA", "Taxonomic 'is a' relation."),
        VocabEntry::term("PROCESS_OF", "X is a process of Y."),
        VocabEntry::term("USES", "X uses Y."),
        VocabEntry::term("ASSOCIATED_WITH", "Non-causal association."),
        VocabEntry::term("CAUSES", "X causes Y."),
        VocabEntry::term("DIAGNOSES", "X diagnoses Y."),
        VocabEntry::term("MANIFESTATION_OF", "X is a manifestation of Y."),
        VocabEntry::term("LOCATION_OF", "X is the location of Y."),
        VocabEntry::term("PRECEDES", "X precedes Y."),
        VocabEntry::term("PART_OF", "X is part of Y."),
        VocabEntry::term("PREVENTS", "X prevents Y."),
        VocabEntry::term("DISRUPTS", "X disrupts Y."),
        VocabEntry::term("COMPLICATES", "X complicates Y."),
        VocabEntry::term("ADMINISTERED_TO", "X is administered to Y."),
        VocabEntry::term("PRODUCES", "X produces Y."),
        VocabEntry::term("INTERACTS_WITH", "X interacts with Y."),
        VocabEntry::term("OCCURS_IN", "X occurs in Y."),
        VocabEntry::term("COMPARED_WITH", "X is compared with Y."),
        VocabEntry::term("AUGMENTS", "X augments Y."),
        VocabEntry::term("STIMULATES", "X stimulates Y."),
        VocabEntry::term("SAME_AS", "Equivalence relation."),
        VocabEntry::term("METHOD_OF", "X is a method of Y."),
        VocabEntry::term("MEASUREMENT_OF", "X is a measurement of Y."),
        VocabEntry::term("INHIBITS", "X inhibits Y."),
        VocabEntry::term("CONVERTS_TO", "X converts to Y."),
    ];

    /// SemRep entity-type vocabulary (UMLS semantic types).
    pub static ref SEMREP_ENTITY_TYPES: Vec<VocabEntry> = vec![
        VocabEntry::term("acab", "Acquired abnormality."),
        VocabEntry::term("anab", "Anatomical abnormality."),
        VocabEntry::term("cgab", "Congenital abnormality."),
        VocabEntry::term("dsyn", "Disease or syndrome."),
        VocabEntry::term("emod", "Experimental model of disease."),
        VocabEntry::term("fndg", "Clinical/lab finding."),
        VocabEntry::term("inpo", "Injury or poisoning."),
        VocabEntry::term("mobd", "Mental/behavioral dysfunction."),
        VocabEntry::term("neop", "Neoplastic process."),
        VocabEntry::term("orga", "Organism attribute."),
        VocabEntry::term("patf", "Pathologic function."),
        VocabEntry::term("phsu", "Pharmacologic substance."),
        VocabEntry::term("sosy", "Sign or symptom."),
    ];
}

/// Whitelists constraining assertion fields.
///
/// Both lists may be empty, in which case the corresponding field accepts
/// any value. This is how ad-hoc corpora without a fixed schema are
/// reviewed.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    predicates: Vec<VocabEntry>,
    entity_types: Vec<VocabEntry>,
}

impl Vocabulary {
    /// A vocabulary that accepts everything.
    pub fn unconstrained() -> Self {
        Self::default()
    }

    /// The canonical SemRep vocabulary.
    pub fn semrep() -> Self {
        Self {
            predicates: SEMREP_PREDICATES.clone(),
            entity_types: SEMREP_ENTITY_TYPES.clone(),
        }
    }

    /// A vocabulary from custom term lists.
    pub fn new(predicates: Vec<VocabEntry>, entity_types: Vec<VocabEntry>) -> Self {
        Self {
            predicates,
            entity_types,
        }
    }

    /// Whether `value` is an allowed predicate. Exact, case-sensitive.
    pub fn is_valid_predicate(&self, value: &str) -> bool {
        self.predicates.is_empty() || self.predicates.iter().any(|e| e.id == value)
    }

    /// Whether `value` is an allowed entity type. Exact, case-sensitive.
    pub fn is_valid_entity_type(&self, value: &str) -> bool {
        self.entity_types.is_empty() || self.entity_types.iter().any(|e| e.id == value)
    }

    /// Terms for the predicate dropdown.
    pub fn predicates(&self) -> &[VocabEntry] {
        &self.predicates
    }

    /// Terms for the entity-type dropdowns.
    pub fn entity_types(&self) -> &[VocabEntry] {
        &self.entity_types
    }
}
