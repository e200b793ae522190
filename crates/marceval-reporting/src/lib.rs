//! Report rendering and results persistence.
//!
//! An [`EvaluationReport`] bundles the dataset-level [`AggregateResult`] with
//! every per-record outcome. It is what `evaluate` writes to
//! `<dir>/results.json` and what `report` loads back and renders.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use marceval_core::{AggregateResult, EvaluationOutcome, SelectorSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod export;

pub use export::{export_report, render_csv, render_json, render_report, render_text, truncate};

/// File written inside a results directory.
pub const RESULTS_FILE: &str = "results.json";

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid results JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Text,
    Json,
    Csv,
}

impl ExportFormat {
    pub fn all() -> &'static [ExportFormat] {
        &[ExportFormat::Text, ExportFormat::Json, ExportFormat::Csv]
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Text => "txt",
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Text => "text",
            Self::Json => "json",
            Self::Csv => "csv",
        })
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "txt" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(format!(
                "unsupported format: {other} (expected text, json or csv)"
            )),
        }
    }
}

/// A complete run: aggregate statistics plus per-record outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub aggregate: AggregateResult,
    /// Configured selector names in configuration order. Drives CSV columns.
    #[serde(default)]
    pub selectors: Vec<String>,
    pub results: Vec<EvaluationOutcome>,
}

impl EvaluationReport {
    pub fn new(
        aggregate: AggregateResult,
        selectors: &SelectorSet,
        results: Vec<EvaluationOutcome>,
    ) -> Self {
        Self {
            aggregate,
            selectors: selectors.names().map(str::to_string).collect(),
            results,
        }
    }

    /// Selector columns for tabular output. Reports written without an
    /// explicit list fall back to the configured fields of the first
    /// successful record.
    pub fn selector_columns(&self) -> Vec<String> {
        if !self.selectors.is_empty() {
            return self.selectors.clone();
        }
        self.results
            .iter()
            .find_map(|r| r.comparison.as_ref())
            .map(|c| c.configured().map(|f| f.selector.clone()).collect())
            .unwrap_or_default()
    }
}

/// Write `report` as pretty JSON to `<dir>/results.json`, creating `dir`.
pub fn save_results(dir: &Path, report: &EvaluationReport) -> Result<PathBuf, ReportError> {
    std::fs::create_dir_all(dir).map_err(|source| ReportError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let path = dir.join(RESULTS_FILE);
    let content = serde_json::to_string_pretty(report)?;
    std::fs::write(&path, content).map_err(|source| ReportError::Io {
        path: path.clone(),
        source,
    })?;
    tracing::info!(path = %path.display(), records = report.results.len(), "saved results");
    Ok(path)
}

/// Load `<dir>/results.json`. A path to the file itself is accepted too.
pub fn load_results(dir: &Path) -> Result<EvaluationReport, ReportError> {
    let path = if dir.is_dir() {
        dir.join(RESULTS_FILE)
    } else {
        dir.to_path_buf()
    };
    let content = std::fs::read_to_string(&path).map_err(|source| ReportError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(serde_json::from_str(&content)?)
}
