use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::result::{MatchKind, RecordComparison};

/// What happened to one attempted record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationOutcome {
    pub id: String,
    pub comparison: Option<RecordComparison>,
    pub error: Option<String>,
    /// Time the generator spent producing the candidate, when known.
    pub processing_time_ms: Option<u64>,
    /// Reference was withdrawn; the record was skipped, not attempted.
    #[serde(default)]
    pub withdrawn: bool,
    /// Generated record text as evaluated, kept so a saved run can be
    /// inspected or re-scored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_record: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_record: Option<String>,
}

impl EvaluationOutcome {
    pub fn success(id: impl Into<String>, comparison: RecordComparison) -> Self {
        Self {
            id: id.into(),
            comparison: Some(comparison),
            error: None,
            processing_time_ms: None,
            withdrawn: false,
            candidate_record: None,
            reference_record: None,
        }
    }

    pub fn failure(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            comparison: None,
            error: Some(error.into()),
            processing_time_ms: None,
            withdrawn: false,
            candidate_record: None,
            reference_record: None,
        }
    }

    pub fn withdrawn(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            comparison: None,
            error: None,
            processing_time_ms: None,
            withdrawn: true,
            candidate_record: None,
            reference_record: None,
        }
    }

    pub fn with_processing_time(mut self, ms: Option<u64>) -> Self {
        self.processing_time_ms = ms;
        self
    }

    pub fn with_records(mut self, reference: Option<String>, candidate: Option<String>) -> Self {
        self.reference_record = reference;
        self.candidate_record = candidate;
        self
    }

    pub fn is_success(&self) -> bool {
        self.comparison.is_some()
    }

    pub fn overall_score(&self) -> Option<f64> {
        self.comparison.as_ref().map(|c| c.overall_score)
    }
}

/// Provenance of a run, supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub evaluated_at: DateTime<Utc>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub dataset: Option<String>,
    pub sample_size: usize,
}

impl RunMetadata {
    pub fn new(evaluated_at: DateTime<Utc>, sample_size: usize) -> Self {
        Self {
            evaluated_at,
            provider: None,
            model: None,
            dataset: None,
            sample_size,
        }
    }

    /// Stamped with the current time.
    pub fn now(sample_size: usize) -> Self {
        Self::new(Utc::now(), sample_size)
    }
}

/// Per-selector statistics over all successful records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorStats {
    pub name: String,
    pub count: usize,
    pub score_sum: f64,
    pub average: f64,
    pub histogram: BTreeMap<MatchKind, usize>,
}

impl SelectorStats {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            count: 0,
            score_sum: 0.0,
            average: 0.0,
            histogram: BTreeMap::new(),
        }
    }
}

/// Overall-score distribution across successful records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreDistribution {
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
}

impl ScoreDistribution {
    /// All zeros for an empty list.
    pub fn from_scores(scores: &[f64]) -> Self {
        if scores.is_empty() {
            return Self::default();
        }

        let mut sorted = scores.to_vec();
        sorted.sort_by(f64::total_cmp);

        let n = sorted.len();
        let median = if n % 2 == 0 {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        } else {
            sorted[n / 2]
        };

        Self {
            mean: scores.iter().sum::<f64>() / n as f64,
            median,
            min: sorted[0],
            max: sorted[n - 1],
        }
    }
}

/// Dataset-level summary. Built in one pass over the complete outcome list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub metadata: RunMetadata,
    pub total_records: usize,
    pub success_count: usize,
    pub failure_count: usize,
    /// Withdrawn records, excluded from every other count.
    pub withdrawn_count: usize,
    pub distribution: ScoreDistribution,
    /// In first-seen order.
    pub selectors: Vec<SelectorStats>,
    pub fields_matched: usize,
    pub fields_missing: usize,
    pub fields_incorrect: usize,
    pub levenshtein_total: usize,
    pub total_processing_time_ms: u64,
    pub average_processing_time_ms: f64,
}

impl AggregateResult {
    /// Percentage of attempted records that produced a comparison.
    pub fn success_rate(&self) -> f64 {
        if self.total_records == 0 {
            0.0
        } else {
            self.success_count as f64 / self.total_records as f64 * 100.0
        }
    }

    pub fn selector(&self, name: &str) -> Option<&SelectorStats> {
        self.selectors.iter().find(|s| s.name == name)
    }
}

/// Fold outcomes into an [`AggregateResult`].
///
/// The result depends only on the order of `outcomes`: sums run in input
/// order and the median comes from a sorted copy.
pub fn aggregate(outcomes: &[EvaluationOutcome], metadata: RunMetadata) -> AggregateResult {
    let mut total_records = 0;
    let mut success_count = 0;
    let mut failure_count = 0;
    let mut withdrawn_count = 0;
    let mut scores = Vec::with_capacity(outcomes.len());
    let mut selectors: Vec<SelectorStats> = Vec::new();
    let mut fields_matched = 0;
    let mut fields_missing = 0;
    let mut fields_incorrect = 0;
    let mut levenshtein_total = 0;
    let mut total_processing_time_ms = 0u64;
    let mut timed = 0usize;

    for outcome in outcomes {
        if outcome.withdrawn {
            withdrawn_count += 1;
            continue;
        }
        total_records += 1;

        let Some(comparison) = &outcome.comparison else {
            failure_count += 1;
            continue;
        };
        success_count += 1;
        scores.push(comparison.overall_score);

        for fc in &comparison.fields {
            let idx = match selectors.iter().position(|s| s.name == fc.selector) {
                Some(i) => i,
                None => {
                    selectors.push(SelectorStats::new(&fc.selector));
                    selectors.len() - 1
                }
            };
            let stats = &mut selectors[idx];
            stats.count += 1;
            stats.score_sum += fc.score;
            *stats.histogram.entry(fc.method).or_insert(0) += 1;
        }

        fields_matched += comparison.fields_matched;
        fields_missing += comparison.fields_missing;
        fields_incorrect += comparison.fields_incorrect;
        levenshtein_total += comparison.levenshtein_total;

        if let Some(ms) = outcome.processing_time_ms {
            total_processing_time_ms += ms;
            timed += 1;
        }
    }

    for stats in &mut selectors {
        if stats.count > 0 {
            stats.average = stats.score_sum / stats.count as f64;
        }
    }

    let average_processing_time_ms = if timed == 0 {
        0.0
    } else {
        total_processing_time_ms as f64 / timed as f64
    };

    tracing::info!(
        total = total_records,
        succeeded = success_count,
        failed = failure_count,
        withdrawn = withdrawn_count,
        "aggregated evaluation results"
    );

    AggregateResult {
        metadata,
        total_records,
        success_count,
        failure_count,
        withdrawn_count,
        distribution: ScoreDistribution::from_scores(&scores),
        selectors,
        fields_matched,
        fields_missing,
        fields_incorrect,
        levenshtein_total,
        total_processing_time_ms,
        average_processing_time_ms,
    }
}
