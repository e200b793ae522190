//! Synthesis of a reference record from tabular book metadata.
//!
//! Some datasets ship flat metadata columns instead of a catalog record.
//! [`metadata_to_record`] builds a minimal MARC record from them so the same
//! comparator can be used on both kinds of input.

use serde::{Deserialize, Serialize};

use crate::record::{CanonicalRecord, Field, Leader, SubValue};

const SYNTHETIC_LEADER: &str = "00000nam  2200000   4500";

/// Placeholder for 008/00-05 when the caller does not supply a date.
const UNKNOWN_DATE_ENTERED: &str = "000000";

/// Flat bibliographic metadata. Column names from the Institutional Books
/// export (`title_src`, `author_src`, ...) are accepted as aliases.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookMetadata {
    #[serde(alias = "title_src")]
    pub title: String,
    #[serde(alias = "author_src")]
    pub author: String,
    #[serde(alias = "date1_src")]
    pub date1: String,
    #[serde(alias = "date2_src")]
    pub date2: String,
    #[serde(alias = "date_types_src")]
    pub date_type: String,
    #[serde(alias = "language_src")]
    pub language: String,
    #[serde(alias = "topic_or_subject_src")]
    pub subject: String,
    #[serde(alias = "genre_or_form_src")]
    pub genre: String,
    #[serde(alias = "general_note_src")]
    pub general_note: String,
    pub isbn: Vec<String>,
    pub lccn: Vec<String>,
    /// 008/00-05 (`YYMMDD`). Supplied by the caller so synthesis stays
    /// deterministic.
    pub date_entered: Option<String>,
}

impl BookMetadata {
    /// Primary publication date, falling back to the second date.
    pub fn primary_date(&self) -> &str {
        if self.date1.trim().is_empty() {
            self.date2.trim()
        } else {
            self.date1.trim()
        }
    }
}

/// Length of a leading article to skip when filing (245 second indicator).
fn nonfiling_indicator(title: &str) -> char {
    let lower = title.to_lowercase();
    if lower.starts_with("the ") {
        '4'
    } else if lower.starts_with("an ") {
        '3'
    } else if lower.starts_with("a ") {
        '2'
    } else {
        '0'
    }
}

fn present(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

fn single(tag: &str, ind1: char, ind2: char, code: char, text: &str) -> Field {
    Field::data(tag, ind1, ind2, vec![SubValue::new(code, text)])
}

/// Build a reference record: leader, 008, 020 (per ISBN), 050 (first LCCN),
/// 100, 245, 264 `$c`, 500, 650 and 655, each only when the source value is
/// present.
pub fn metadata_to_record(meta: &BookMetadata) -> CanonicalRecord {
    let mut fields = Vec::new();

    let date_entered = meta
        .date_entered
        .as_deref()
        .and_then(present)
        .unwrap_or(UNKNOWN_DATE_ENTERED);
    fields.push(Field::control(
        "008",
        format!(
            "{date_entered}{}||||{}||||||||||||{}|||||d",
            meta.date_type.trim(),
            meta.date1.trim(),
            meta.language.trim()
        ),
    ));

    for isbn in meta.isbn.iter().filter_map(|i| present(i)) {
        fields.push(single("020", ' ', ' ', 'a', isbn));
    }

    if let Some(lccn) = meta.lccn.iter().find_map(|l| present(l)) {
        fields.push(single("050", ' ', '4', 'a', lccn));
    }

    let author = present(&meta.author);
    if let Some(author) = author {
        fields.push(single("100", '1', ' ', 'a', author));
    }

    if let Some(title) = present(&meta.title) {
        let ind1 = if author.is_some() { '1' } else { '0' };
        fields.push(single("245", ind1, nonfiling_indicator(title), 'a', title));
    }

    if let Some(date) = present(meta.primary_date()) {
        fields.push(single("264", ' ', '1', 'c', date));
    }

    if let Some(note) = present(&meta.general_note) {
        fields.push(single("500", ' ', ' ', 'a', note));
    }
    if let Some(subject) = present(&meta.subject) {
        fields.push(single("650", ' ', '0', 'a', subject));
    }
    if let Some(genre) = present(&meta.genre) {
        fields.push(single("655", ' ', '7', 'a', genre));
    }

    let leader = Leader::parse(SYNTHETIC_LEADER).ok();
    CanonicalRecord::from_fields(leader, fields)
}
