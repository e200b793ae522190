use crate::result::MatchKind;

/// Similarity strictly above this is a high-confidence match.
pub const HIGH_SIMILARITY_THRESHOLD: f64 = 0.8;

/// Similarity strictly above this (and not high) is a medium match.
pub const MEDIUM_SIMILARITY_THRESHOLD: f64 = 0.5;

/// Score given when neither side has a value. Neither success nor failure.
pub const BOTH_EMPTY_SIMILARITY: f64 = 0.5;

/// Floor score when one normalized value contains the other.
pub const SUBSTRING_SCORE: f64 = 0.8;

/// Field comparisons scoring below this are reported as differences.
pub const DIFF_THRESHOLD: f64 = 0.8;

/// Edit distance over chars (insertion, deletion, substitution cost 1).
pub fn edit_distance(a: &str, b: &str) -> usize {
    strsim::levenshtein(a, b)
}

/// `1 - distance / max(len)` over two already-normalized strings.
///
/// Equal strings short-circuit to 1.0; two empty strings give
/// [`BOTH_EMPTY_SIMILARITY`]; one empty side gives 0.0.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return if a.is_empty() {
            BOTH_EMPTY_SIMILARITY
        } else {
            1.0
        };
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    similarity_from_distance(edit_distance(a, b), a, b)
}

/// `1 - distance / max(len)` for a distance the caller already computed
/// between `a` and `b`. Both sides must be non-empty.
pub fn similarity_from_distance(distance: usize, a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count()).max(1);
    (1.0 - distance as f64 / max_len as f64).clamp(0.0, 1.0)
}

/// Classify a similarity score into high / medium / low.
pub fn classify(score: f64) -> MatchKind {
    if score > HIGH_SIMILARITY_THRESHOLD {
        MatchKind::High
    } else if score > MEDIUM_SIMILARITY_THRESHOLD {
        MatchKind::Medium
    } else {
        MatchKind::Low
    }
}
