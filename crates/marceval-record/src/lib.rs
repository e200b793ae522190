//! Canonical MARC record model and parsers.
//!
//! Raw records arrive either in the line-oriented mnemonic form
//! (`=245  10$aTitle`) or as MARCXML. Both are decoded into the same
//! [`CanonicalRecord`], so everything downstream is format-independent.

mod metadata;
pub mod mnemonic;
mod record;
pub mod xml_parser;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use metadata::{BookMetadata, metadata_to_record};
pub use record::{CanonicalRecord, Field, LEADER_LEN, Leader, SubValue};

/// Why one raw record could not be turned into a [`CanonicalRecord`].
/// Always scoped to a single record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("record is empty")]
    Empty,
    #[error("invalid leader: {0}")]
    InvalidLeader(String),
    #[error("no fields found in record")]
    NoFields,
    #[error("malformed MARCXML: {0}")]
    Xml(String),
}

/// Serialization of a raw record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordFormat {
    /// MarcEdit-style `=TAG  ind$aValue` lines.
    Mnemonic,
    #[serde(rename = "marcxml", alias = "xml")]
    MarcXml,
}

impl fmt::Display for RecordFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordFormat::Mnemonic => write!(f, "mnemonic"),
            RecordFormat::MarcXml => write!(f, "marcxml"),
        }
    }
}

impl FromStr for RecordFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mnemonic" | "mrk" | "marc" => Ok(RecordFormat::Mnemonic),
            "marcxml" | "xml" => Ok(RecordFormat::MarcXml),
            other => Err(format!(
                "unknown record format '{other}' (expected mnemonic or marcxml)"
            )),
        }
    }
}

const XML_MARKERS: &[&str] = &["<?xml", "<record", "<marc:record", "<collection", "<marc:collection"];

/// Guess the format from the text: a line opening with a record-level
/// markup token means MARCXML. Markup inside a field value does not count.
pub fn detect_format(text: &str) -> RecordFormat {
    let opens_markup = |line: &str| {
        let line = line.trim_start();
        XML_MARKERS.iter().any(|m| line.starts_with(m))
    };
    if text.lines().any(opens_markup) {
        RecordFormat::MarcXml
    } else {
        RecordFormat::Mnemonic
    }
}

/// Parse exactly one raw record. With `format = None` the format is detected
/// from the content. Invalid UTF-8 is replaced, not rejected.
pub fn parse(raw: &[u8], format: Option<RecordFormat>) -> Result<CanonicalRecord, ParseError> {
    let text = String::from_utf8_lossy(raw);
    match format.unwrap_or_else(|| detect_format(&text)) {
        RecordFormat::Mnemonic => mnemonic::parse_mnemonic(&text),
        RecordFormat::MarcXml => xml_parser::parse_marcxml(&text),
    }
}

/// Whether the raw record's leader marks it deleted. Only the header is
/// read; a record without a leader is not withdrawn.
pub fn is_withdrawn(raw: &[u8], format: Option<RecordFormat>) -> Result<bool, ParseError> {
    let text = String::from_utf8_lossy(raw);
    match format.unwrap_or_else(|| detect_format(&text)) {
        RecordFormat::Mnemonic => mnemonic::leader_is_deleted(&text),
        RecordFormat::MarcXml => xml_parser::leader_is_deleted(&text),
    }
}
