//! Named extraction rules and the validated, weighted set of them.

use std::collections::HashSet;

use marceval_record::{CanonicalRecord, Field};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Trailing ISBD punctuation stripped from extracted values.
const TRAILING_PUNCTUATION: &[char] = &[' ', '/', ':', ';', ',', '='];

/// Separator for `occurrence = "all"`.
const OCCURRENCE_SEPARATOR: &str = "; ";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("selector configuration is empty")]
    Empty,
    #[error("selector '{name}' has negative weight {weight}")]
    NegativeWeight { name: String, weight: f64 },
    #[error("selector '{name}' has a non-finite weight")]
    NonFiniteWeight { name: String },
    #[error("selector weights sum to zero")]
    ZeroTotalWeight,
    #[error("selector weights sum to a non-finite value")]
    NonFiniteTotalWeight,
    #[error("duplicate selector name '{0}'")]
    DuplicateName(String),
    #[error("selector '{0}' has no tags")]
    NoTags(String),
    #[error("unknown selector preset '{0}' (expected marc or five_field)")]
    UnknownPreset(String),
}

/// Which matching fields contribute to the extracted value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Occurrence {
    /// First matching field with a non-empty value.
    #[default]
    First,
    /// Every non-empty value, joined with `"; "`.
    All,
}

/// A named rule extracting one comparable value from a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSelector {
    pub name: String,
    /// Tag patterns; `X` matches any character (`6XX`).
    pub tags: Vec<String>,
    /// Sub-value codes to concatenate, in field order. Empty means all.
    #[serde(default)]
    pub codes: String,
    #[serde(default)]
    pub occurrence: Occurrence,
    pub weight: f64,
}

impl FieldSelector {
    pub fn new(name: &str, tags: &[&str], codes: &str, weight: f64) -> Self {
        Self {
            name: name.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            codes: codes.to_string(),
            occurrence: Occurrence::First,
            weight,
        }
    }

    pub fn with_occurrence(mut self, occurrence: Occurrence) -> Self {
        self.occurrence = occurrence;
        self
    }

    pub fn matches_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|pattern| tag_matches(pattern, tag))
    }

    /// Value of one field under this selector's code filter, cleaned.
    fn field_value(&self, field: &Field) -> String {
        let raw = match field {
            Field::Control { value, .. } => value.clone(),
            Field::Data { subvalues, .. } => subvalues
                .iter()
                .filter(|sv| self.codes.is_empty() || self.codes.contains(sv.code))
                .map(|sv| sv.text.trim())
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join(" "),
        };
        clean_value(&raw)
    }

    /// Extract this selector's value from `record`; empty when absent.
    pub fn extract(&self, record: &CanonicalRecord) -> String {
        let mut values = record
            .fields()
            .iter()
            .filter(|f| self.matches_tag(f.tag()))
            .map(|f| self.field_value(f))
            .filter(|v| !v.is_empty());

        match self.occurrence {
            Occurrence::First => values.next().unwrap_or_default(),
            Occurrence::All => values.collect::<Vec<_>>().join(OCCURRENCE_SEPARATOR),
        }
    }
}

fn clean_value(raw: &str) -> String {
    raw.trim().trim_end_matches(TRAILING_PUNCTUATION).trim().to_string()
}

/// Same-length, case-insensitive comparison where `X`/`x` is a wildcard.
fn tag_matches(pattern: &str, tag: &str) -> bool {
    pattern.chars().count() == tag.chars().count()
        && pattern
            .chars()
            .zip(tag.chars())
            .all(|(p, t)| p == 'X' || p == 'x' || p.eq_ignore_ascii_case(&t))
}

/// An immutable, validated list of selectors with a positive weight total.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectorSet {
    selectors: Vec<FieldSelector>,
    total_weight: f64,
}

impl SelectorSet {
    /// Validate a selector configuration. Rejects empty lists, empty tag
    /// lists, duplicate names, negative or non-finite weights, and a weight
    /// total that is zero or overflows.
    pub fn new(selectors: Vec<FieldSelector>) -> Result<Self, ConfigError> {
        if selectors.is_empty() {
            return Err(ConfigError::Empty);
        }

        let mut seen = HashSet::new();
        for s in &selectors {
            if !s.weight.is_finite() {
                return Err(ConfigError::NonFiniteWeight {
                    name: s.name.clone(),
                });
            }
            if s.weight < 0.0 {
                return Err(ConfigError::NegativeWeight {
                    name: s.name.clone(),
                    weight: s.weight,
                });
            }
            if s.tags.iter().all(|t| t.trim().is_empty()) {
                return Err(ConfigError::NoTags(s.name.clone()));
            }
            if !seen.insert(s.name.as_str()) {
                return Err(ConfigError::DuplicateName(s.name.clone()));
            }
        }

        let total_weight: f64 = selectors.iter().map(|s| s.weight).sum();
        if !total_weight.is_finite() {
            return Err(ConfigError::NonFiniteTotalWeight);
        }
        if total_weight <= 0.0 {
            return Err(ConfigError::ZeroTotalWeight);
        }

        Ok(Self {
            selectors,
            total_weight,
        })
    }

    /// Catalog-importance weights over whole MARC fields, one selector per
    /// tag, named by the tag.
    pub fn marc_default() -> Self {
        Self::from_known_good(vec![
            FieldSelector::new("020", &["020"], "", 0.05),
            FieldSelector::new("100", &["100"], "", 0.15),
            FieldSelector::new("110", &["110"], "", 0.15),
            FieldSelector::new("245", &["245"], "", 0.25),
            FieldSelector::new("250", &["250"], "", 0.05),
            FieldSelector::new("260", &["260"], "", 0.15),
            FieldSelector::new("264", &["264"], "", 0.15),
            FieldSelector::new("300", &["300"], "", 0.05),
            FieldSelector::new("650", &["650"], "", 0.10),
            FieldSelector::new("700", &["700"], "", 0.05),
        ])
    }

    /// Title, author, date, ISBN and subject headings, weighted toward
    /// title and author.
    pub fn five_field() -> Self {
        Self::from_known_good(vec![
            FieldSelector::new("title", &["245"], "a", 0.30),
            FieldSelector::new("author", &["100"], "a", 0.30),
            FieldSelector::new("date", &["260", "264"], "c", 0.20),
            FieldSelector::new("isbn", &["020"], "a", 0.10),
            FieldSelector::new("subject", &["6XX"], "a", 0.10).with_occurrence(Occurrence::All),
        ])
    }

    /// Look up a built-in configuration by name.
    pub fn preset(name: &str) -> Result<Self, ConfigError> {
        match name.trim().to_lowercase().replace('-', "_").as_str() {
            "marc" | "marc_default" | "default" => Ok(Self::marc_default()),
            "five_field" | "fivefield" => Ok(Self::five_field()),
            other => Err(ConfigError::UnknownPreset(other.to_string())),
        }
    }

    fn from_known_good(selectors: Vec<FieldSelector>) -> Self {
        let total_weight = selectors.iter().map(|s| s.weight).sum();
        Self {
            selectors,
            total_weight,
        }
    }

    pub fn selectors(&self) -> &[FieldSelector] {
        &self.selectors
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FieldSelector> {
        self.selectors.iter()
    }

    pub fn len(&self) -> usize {
        self.selectors.len()
    }

    /// Always false: an empty set cannot be constructed.
    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }

    /// The normalization denominator of the weighted score.
    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.selectors.iter().map(|s| s.name.as_str())
    }

    /// Whether any selector's tag patterns cover `tag`.
    pub fn covers_tag(&self, tag: &str) -> bool {
        self.selectors.iter().any(|s| s.matches_tag(tag))
    }
}

impl<'a> IntoIterator for &'a SelectorSet {
    type Item = &'a FieldSelector;
    type IntoIter = std::slice::Iter<'a, FieldSelector>;

    fn into_iter(self) -> Self::IntoIter {
        self.selectors.iter()
    }
}
