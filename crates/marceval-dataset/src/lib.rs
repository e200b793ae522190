//! Loading of evaluation datasets.
//!
//! A dataset is a list of items, each carrying a reference record and the
//! candidate a generator produced for it. Accepted layouts:
//! - `.jsonl`: one item per line
//! - `.json`: `{"items": [...]}` or a bare array
//! - a directory containing `dataset.jsonl` or `dataset.json`

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use marceval_core::EvalPair;
use marceval_record::{BookMetadata, RecordFormat, metadata_to_record};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File names looked up inside a dataset directory, in order.
pub const DATASET_FILE_NAMES: &[&str] = &["dataset.jsonl", "dataset.json"];

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON at line {line}: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("unsupported dataset format: {0} (supported: .jsonl, .json)")]
    Unsupported(String),
    #[error("no dataset.jsonl or dataset.json in {0}")]
    NotFound(PathBuf),
}

/// One evaluation item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetItem {
    #[serde(alias = "barcode_src")]
    pub id: String,
    #[serde(default)]
    pub reference_marc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_format: Option<RecordFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_marc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_format: Option<RecordFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_error: Option<String>,
    /// Source metadata; synthesizes the reference when `reference_marc` is empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BookMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<u64>,
}

impl DatasetItem {
    /// Reference bytes and format, synthesizing from metadata when the item
    /// has no reference record of its own.
    fn reference(&self) -> (Vec<u8>, Option<RecordFormat>) {
        if self.reference_marc.trim().is_empty()
            && let Some(meta) = &self.metadata
        {
            let record = metadata_to_record(meta);
            return (
                record.to_mnemonic().into_bytes(),
                Some(RecordFormat::Mnemonic),
            );
        }
        (self.reference_marc.as_bytes().to_vec(), self.reference_format)
    }

    pub fn to_pair(&self) -> EvalPair {
        let (reference, reference_format) = self.reference();
        EvalPair {
            id: self.id.clone(),
            reference,
            reference_format,
            candidate: self.generated_marc.as_ref().map(|c| c.as_bytes().to_vec()),
            candidate_format: self.generated_format,
            generation_error: self.generation_error.clone(),
            processing_time_ms: self.processing_time_ms,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub items: Vec<DatasetItem>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn pairs(&self) -> Vec<EvalPair> {
        self.items.iter().map(DatasetItem::to_pair).collect()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonDataset {
    Wrapped { items: Vec<DatasetItem> },
    Bare(Vec<DatasetItem>),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> DatasetError + '_ {
    move |source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Resolve a directory to the dataset file inside it.
pub fn resolve_path(path: &Path) -> Result<PathBuf, DatasetError> {
    if !path.is_dir() {
        return Ok(path.to_path_buf());
    }
    DATASET_FILE_NAMES
        .iter()
        .map(|name| path.join(name))
        .find(|p| p.is_file())
        .ok_or_else(|| DatasetError::NotFound(path.to_path_buf()))
}

/// Load a whole dataset. Any malformed item is an error.
pub fn load(path: &Path) -> Result<Dataset, DatasetError> {
    let items = load_items(path, None, true)?;
    Ok(Dataset { items })
}

/// Load at most `limit` items. Malformed JSONL lines are skipped with a
/// warning instead of failing the whole load.
pub fn load_sample(path: &Path, limit: Option<usize>) -> Result<Dataset, DatasetError> {
    let items = load_items(path, limit, false)?;
    Ok(Dataset { items })
}

fn load_items(
    path: &Path,
    limit: Option<usize>,
    strict: bool,
) -> Result<Vec<DatasetItem>, DatasetError> {
    let path = resolve_path(path)?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let mut items = match ext.as_str() {
        "jsonl" | "ndjson" => load_jsonl(&path, limit, strict)?,
        "json" => load_json(&path)?,
        other => return Err(DatasetError::Unsupported(format!(".{other}"))),
    };

    if let Some(limit) = limit {
        items.truncate(limit);
    }

    tracing::debug!(path = %path.display(), items = items.len(), "loaded dataset");
    Ok(items)
}

fn load_jsonl(
    path: &Path,
    limit: Option<usize>,
    strict: bool,
) -> Result<Vec<DatasetItem>, DatasetError> {
    let file = File::open(path).map_err(io_err(path))?;
    let reader = BufReader::new(file);

    let mut items = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        if limit.is_some_and(|l| items.len() >= l) {
            break;
        }

        let line_num = idx + 1;
        let line = line.map_err(io_err(path))?;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<DatasetItem>(&line) {
            Ok(item) => items.push(item),
            Err(source) if strict => {
                return Err(DatasetError::Json {
                    line: line_num,
                    source,
                });
            }
            Err(e) => {
                tracing::warn!(line = line_num, error = %e, "skipping malformed dataset line");
            }
        }
    }
    Ok(items)
}

fn load_json(path: &Path) -> Result<Vec<DatasetItem>, DatasetError> {
    let content = std::fs::read_to_string(path).map_err(io_err(path))?;
    let parsed: JsonDataset = serde_json::from_str(&content).map_err(|source| DatasetError::Json {
        line: source.line(),
        source,
    })?;
    Ok(match parsed {
        JsonDataset::Wrapped { items } | JsonDataset::Bare(items) => items,
    })
}
