//! Text normalization and containment checks.
//!
//! Extraction output rarely matches sentence text byte-for-byte: casing
//! differs, abbreviations carry trailing periods, phrases span line breaks.
//! Containment is therefore checked on a normalized form of both sides.

/// Punctuation stripped before comparison.
const STRIPPED: [char; 8] = ['.', ',', ';', ':', '(', ')', '"', '\''];

/// Normalize text for matching: lowercase, strip punctuation, collapse
/// whitespace runs to single spaces, trim.
pub fn normalize(text: &str) -> String {
    let stripped: String = text
        .chars()
        .filter(|c| !STRIPPED.contains(c))
        .flat_map(char::to_lowercase)
        .collect();

    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whether `needle` appears within `haystack` after normalizing both.
///
/// An empty needle or haystack never matches: "nothing is contained in
/// nothing" keeps validation honest when a field is blank.
pub fn is_contained(needle: &str, haystack: &str) -> bool {
    let needle = normalize(needle);
    let haystack = normalize(haystack);

    if needle.is_empty() || haystack.is_empty() {
        return false;
    }

    haystack.contains(&needle)
}
