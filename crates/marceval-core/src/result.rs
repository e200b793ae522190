use std::fmt;

use serde::{Deserialize, Serialize};

/// How a field comparison was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    Substring,
    High,
    Medium,
    Low,
    /// Neither record has a value for the selector.
    BothMissing,
    /// Candidate asserted a value the reference cannot confirm.
    NoReference,
    /// Reference has a value, candidate does not.
    Missing,
    /// Candidate field not covered by any configured selector.
    Extra,
}

impl MatchKind {
    pub const ALL: [MatchKind; 9] = [
        MatchKind::Exact,
        MatchKind::Substring,
        MatchKind::High,
        MatchKind::Medium,
        MatchKind::Low,
        MatchKind::BothMissing,
        MatchKind::NoReference,
        MatchKind::Missing,
        MatchKind::Extra,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MatchKind::Exact => "exact",
            MatchKind::Substring => "substring",
            MatchKind::High => "high",
            MatchKind::Medium => "medium",
            MatchKind::Low => "low",
            MatchKind::BothMissing => "both_missing",
            MatchKind::NoReference => "no_reference",
            MatchKind::Missing => "missing",
            MatchKind::Extra => "extra",
        }
    }

    /// Counted as a correct field.
    pub fn is_match(self) -> bool {
        matches!(self, MatchKind::Exact | MatchKind::Substring | MatchKind::High)
    }

    /// Counted as a wrong value (present on the candidate side, not matching).
    pub fn is_incorrect(self) -> bool {
        matches!(
            self,
            MatchKind::Medium | MatchKind::Low | MatchKind::NoReference
        )
    }
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One selector's verdict for one record pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldComparison {
    /// Selector name; the key of the `fields` map when serialized.
    #[serde(skip)]
    pub selector: String,
    pub expected: String,
    pub actual: String,
    pub score: f64,
    pub method: MatchKind,
    /// Edit distance between the normalized values.
    #[serde(default)]
    pub distance: usize,
    #[serde(default)]
    pub notes: String,
}

/// A low-similarity field, kept with its raw values for inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDiff {
    pub selector: String,
    pub expected: String,
    pub actual: String,
    pub similarity: f64,
}

/// The per-record output of the comparator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordComparison {
    /// Configured selectors in configuration order, then `extra` entries.
    #[serde(with = "ordered_fields")]
    pub fields: Vec<FieldComparison>,
    pub overall_score: f64,
    pub missing_fields: Vec<String>,
    pub extra_fields: Vec<String>,
    pub differences: Vec<FieldDiff>,
    #[serde(default)]
    pub fields_matched: usize,
    #[serde(default)]
    pub fields_missing: usize,
    #[serde(default)]
    pub fields_incorrect: usize,
    #[serde(default)]
    pub levenshtein_total: usize,
}

impl RecordComparison {
    /// Look up a comparison by selector name.
    pub fn field(&self, name: &str) -> Option<&FieldComparison> {
        self.fields.iter().find(|f| f.selector == name)
    }

    pub fn score_of(&self, name: &str) -> Option<f64> {
        self.field(name).map(|f| f.score)
    }

    /// Comparisons for configured selectors only (no `extra` entries).
    pub fn configured(&self) -> impl Iterator<Item = &FieldComparison> {
        self.fields.iter().filter(|f| f.method != MatchKind::Extra)
    }
}

/// `fields` is a mapping in the serialized form but an ordered `Vec` in
/// memory; the map key carries the selector name.
mod ordered_fields {
    use std::fmt;

    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};

    use super::FieldComparison;

    pub fn serialize<S: Serializer>(
        fields: &[FieldComparison],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(fields.len()))?;
        for field in fields {
            map.serialize_entry(&field.selector, field)?;
        }
        map.end()
    }

    struct FieldsVisitor;

    impl<'de> Visitor<'de> for FieldsVisitor {
        type Value = Vec<FieldComparison>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of selector name to field comparison")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
            let mut fields = Vec::with_capacity(access.size_hint().unwrap_or(0));
            while let Some((name, mut field)) = access.next_entry::<String, FieldComparison>()? {
                field.selector = name;
                fields.push(field);
            }
            Ok(fields)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<FieldComparison>, D::Error> {
        deserializer.deserialize_map(FieldsVisitor)
    }
}
