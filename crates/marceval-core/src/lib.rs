//! Comparison and aggregation engine for generated catalog records.
//!
//! A [`FieldComparator`] scores a candidate record against a reference
//! under an explicit [`SelectorSet`]; [`aggregate`] folds many per-record
//! outcomes into dataset statistics. [`evaluate_pairs`] runs the
//! parse → compare pipeline for a batch on a worker pool.

use std::fmt;

use marceval_record::ParseError;
use thiserror::Error;

pub mod aggregate;
pub mod compare;
pub mod config_file;
pub mod normalize;
pub mod pool;
pub mod result;
pub mod selector;
pub mod similarity;

// Re-export for convenience
pub use aggregate::{
    AggregateResult, EvaluationOutcome, RunMetadata, ScoreDistribution, SelectorStats, aggregate,
};
pub use compare::{FieldComparator, compare_values};
pub use normalize::normalize;
pub use pool::{EvalJob, EvalPair, EvaluationPool, PoolConfig, evaluate_pair, evaluate_pairs};
pub use result::{FieldComparison, FieldDiff, MatchKind, RecordComparison};
pub use selector::{ConfigError, FieldSelector, Occurrence, SelectorSet};
pub use similarity::{classify, similarity};

/// Default number of pool workers.
pub const DEFAULT_WORKERS: usize = 4;

/// Which record of a pair an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordSide {
    Reference,
    Candidate,
}

impl fmt::Display for RecordSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordSide::Reference => write!(f, "reference"),
            RecordSide::Candidate => write!(f, "candidate"),
        }
    }
}

/// Why one pair produced no comparison.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("failed to parse {side} record: {source}")]
    Parse {
        side: RecordSide,
        #[source]
        source: ParseError,
    },
    #[error("generation failed: {0}")]
    Generation(String),
    #[error("no candidate record")]
    NoCandidate,
}

/// Progress events emitted while a batch is evaluated.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Evaluating {
        index: usize,
        total: usize,
        id: String,
    },
    Evaluated {
        index: usize,
        total: usize,
        id: String,
        overall_score: f64,
    },
    Failed {
        index: usize,
        total: usize,
        id: String,
        error: String,
    },
    /// Reference withdrawn; pair not evaluated.
    Skipped {
        index: usize,
        total: usize,
        id: String,
    },
}
