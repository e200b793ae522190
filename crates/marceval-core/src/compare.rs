use marceval_record::{CanonicalRecord, RecordFormat};

use crate::normalize::normalize;
use crate::result::{FieldComparison, FieldDiff, MatchKind, RecordComparison};
use crate::selector::SelectorSet;
use crate::similarity::{
    BOTH_EMPTY_SIMILARITY, DIFF_THRESHOLD, SUBSTRING_SCORE, classify, edit_distance,
    similarity_from_distance,
};
use crate::{EvalError, RecordSide};

/// Compare two raw values under the fixed resolution order:
/// both empty, expected empty, actual empty, exact, substring, similarity.
///
/// Emptiness is judged after normalization, so a value of pure punctuation
/// counts as absent.
pub fn compare_values(selector: &str, expected: &str, actual: &str) -> FieldComparison {
    let exp_norm = normalize(expected);
    let act_norm = normalize(actual);
    let distance = if exp_norm == act_norm {
        0
    } else {
        edit_distance(&exp_norm, &act_norm)
    };

    let (score, method, notes) = if exp_norm.is_empty() && act_norm.is_empty() {
        (
            BOTH_EMPTY_SIMILARITY,
            MatchKind::BothMissing,
            "Both fields are empty".to_string(),
        )
    } else if exp_norm.is_empty() {
        (
            0.0,
            MatchKind::NoReference,
            "Reference has no value (no ground truth)".to_string(),
        )
    } else if act_norm.is_empty() {
        (
            0.0,
            MatchKind::Missing,
            "Candidate is missing this field".to_string(),
        )
    } else if exp_norm == act_norm {
        (1.0, MatchKind::Exact, "Exact match".to_string())
    } else if exp_norm.contains(&act_norm) || act_norm.contains(&exp_norm) {
        (
            SUBSTRING_SCORE,
            MatchKind::Substring,
            "Partial match (substring found)".to_string(),
        )
    } else {
        let sim = similarity_from_distance(distance, &exp_norm, &act_norm);
        let kind = classify(sim);
        let label = match kind {
            MatchKind::High => "High",
            MatchKind::Medium => "Medium",
            _ => "Low",
        };
        (sim, kind, format!("{label} similarity ({sim:.2})"))
    };

    FieldComparison {
        selector: selector.to_string(),
        expected: expected.to_string(),
        actual: actual.to_string(),
        score,
        method,
        distance,
        notes,
    }
}

/// Scores a candidate record against a reference under a fixed
/// [`SelectorSet`].
#[derive(Debug, Clone)]
pub struct FieldComparator {
    selectors: SelectorSet,
}

impl FieldComparator {
    pub fn new(selectors: SelectorSet) -> Self {
        Self { selectors }
    }

    pub fn selectors(&self) -> &SelectorSet {
        &self.selectors
    }

    /// Compare `candidate` against `reference`.
    ///
    /// The overall score is `Σ (wᵢ / Σ w)·sᵢ` over configured selectors; it is
    /// always within [0, 1] because every selector score is. Weights are
    /// divided by the total before multiplying so huge weights cannot overflow.
    pub fn compare(
        &self,
        reference: &CanonicalRecord,
        candidate: &CanonicalRecord,
    ) -> RecordComparison {
        let mut fields = Vec::with_capacity(self.selectors.len());
        let mut missing_fields = Vec::new();
        let mut extra_fields = Vec::new();
        let mut differences = Vec::new();
        let total_weight = self.selectors.total_weight();
        let mut weighted = 0.0;
        let mut fields_matched = 0;
        let mut fields_missing = 0;
        let mut fields_incorrect = 0;
        let mut levenshtein_total = 0;

        for selector in &self.selectors {
            let expected = selector.extract(reference);
            let actual = selector.extract(candidate);
            let fc = compare_values(&selector.name, &expected, &actual);

            tracing::debug!(
                selector = %selector.name,
                method = %fc.method,
                score = fc.score,
                "field compared"
            );

            match fc.method {
                MatchKind::Missing => {
                    missing_fields.push(selector.name.clone());
                    fields_missing += 1;
                }
                MatchKind::NoReference => {
                    extra_fields.push(selector.name.clone());
                    fields_incorrect += 1;
                }
                kind if kind.is_match() => fields_matched += 1,
                kind if kind.is_incorrect() => fields_incorrect += 1,
                _ => {}
            }

            if fc.score < DIFF_THRESHOLD {
                differences.push(FieldDiff {
                    selector: selector.name.clone(),
                    expected: fc.expected.clone(),
                    actual: fc.actual.clone(),
                    similarity: fc.score,
                });
            }

            weighted += selector.weight / total_weight * fc.score;
            levenshtein_total += fc.distance;
            fields.push(fc);
        }

        // Candidate tags no selector looks at: recorded once each, unscored.
        for field in candidate.fields() {
            let tag = field.tag();
            // Result rows are keyed by name, so a tag equal to a selector
            // name would shadow that selector's row.
            if self.selectors.covers_tag(tag)
                || extra_fields.iter().any(|e| e == tag)
                || self.selectors.iter().any(|s| s.name == tag)
            {
                continue;
            }
            extra_fields.push(tag.to_string());
            fields.push(FieldComparison {
                selector: tag.to_string(),
                expected: String::new(),
                actual: String::new(),
                score: 0.0,
                method: MatchKind::Extra,
                distance: 0,
                notes: "Field not covered by any selector".to_string(),
            });
        }

        let overall_score = weighted.clamp(0.0, 1.0);

        RecordComparison {
            fields,
            overall_score,
            missing_fields,
            extra_fields,
            differences,
            fields_matched,
            fields_missing,
            fields_incorrect,
            levenshtein_total,
        }
    }

    /// Parse both sides and compare them. A parse failure names the side
    /// that failed.
    pub fn compare_raw(
        &self,
        reference: &[u8],
        reference_format: Option<RecordFormat>,
        candidate: &[u8],
        candidate_format: Option<RecordFormat>,
    ) -> Result<RecordComparison, EvalError> {
        let reference = marceval_record::parse(reference, reference_format).map_err(|source| {
            EvalError::Parse {
                side: RecordSide::Reference,
                source,
            }
        })?;
        let candidate = marceval_record::parse(candidate, candidate_format).map_err(|source| {
            EvalError::Parse {
                side: RecordSide::Candidate,
                source,
            }
        })?;
        Ok(self.compare(&reference, &candidate))
    }
}
