use serde::{Deserialize, Serialize};

use crate::ParseError;

/// Length of a MARC 21 leader.
pub const LEADER_LEN: usize = 24;

/// Leaders shorter than this cannot carry status, type and level.
const MIN_LEADER_LEN: usize = 8;

/// Record status value marking a deleted (withdrawn) record.
const STATUS_DELETED: char = 'd';

/// The fixed-length record header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Leader(String);

impl Leader {
    /// Decode a leader string. Short leaders are right-padded with blanks;
    /// anything too short to hold the status/type/level positions, or
    /// containing non-ASCII characters, is rejected.
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        let raw = raw.trim_end_matches(['\r', '\n']);
        if !raw.is_ascii() {
            return Err(ParseError::InvalidLeader(format!(
                "non-ASCII characters in {raw:?}"
            )));
        }
        if raw.len() < MIN_LEADER_LEN {
            return Err(ParseError::InvalidLeader(format!(
                "{} characters, need at least {MIN_LEADER_LEN}",
                raw.len()
            )));
        }
        let mut value: String = raw.chars().take(LEADER_LEN).collect();
        while value.len() < LEADER_LEN {
            value.push(' ');
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn position(&self, idx: usize) -> char {
        self.0.as_bytes().get(idx).map(|b| *b as char).unwrap_or(' ')
    }

    /// Leader/05.
    pub fn status(&self) -> char {
        self.position(5)
    }

    /// Leader/06.
    pub fn record_type(&self) -> char {
        self.position(6)
    }

    /// Leader/07.
    pub fn bibliographic_level(&self) -> char {
        self.position(7)
    }

    pub fn is_deleted(&self) -> bool {
        self.status() == STATUS_DELETED
    }
}

/// A labeled sub-value of a data field (`$a The Great Gatsby`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubValue {
    pub code: char,
    pub text: String,
}

impl SubValue {
    pub fn new(code: char, text: impl Into<String>) -> Self {
        Self {
            code,
            text: text.into(),
        }
    }
}

/// One field of a canonical record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Field {
    Control {
        tag: String,
        value: String,
    },
    Data {
        tag: String,
        indicators: [char; 2],
        subvalues: Vec<SubValue>,
    },
}

impl Field {
    pub fn control(tag: impl Into<String>, value: impl Into<String>) -> Self {
        Field::Control {
            tag: tag.into(),
            value: value.into(),
        }
    }

    pub fn data(tag: impl Into<String>, ind1: char, ind2: char, subvalues: Vec<SubValue>) -> Self {
        Field::Data {
            tag: tag.into(),
            indicators: [ind1, ind2],
            subvalues,
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            Field::Control { tag, .. } | Field::Data { tag, .. } => tag,
        }
    }

    pub fn is_control(&self) -> bool {
        matches!(self, Field::Control { .. })
    }

    pub fn subvalues(&self) -> &[SubValue] {
        match self {
            Field::Control { .. } => &[],
            Field::Data { subvalues, .. } => subvalues,
        }
    }

    /// Indicators of a data field; control fields report two blanks.
    pub fn indicators(&self) -> [char; 2] {
        match self {
            Field::Control { .. } => [' ', ' '],
            Field::Data { indicators, .. } => *indicators,
        }
    }

    /// All sub-value texts carrying `code`, in field order.
    pub fn subvalues_with_code(&self, code: char) -> impl Iterator<Item = &str> {
        self.subvalues()
            .iter()
            .filter(move |sv| sv.code == code)
            .map(|sv| sv.text.as_str())
    }
}

/// Parsed, format-independent representation of one bibliographic record.
///
/// Built once by the parser (or [`crate::metadata_to_record`]) and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    leader: Option<Leader>,
    fields: Vec<Field>,
}

impl CanonicalRecord {
    /// Build a record, ordering fields by ascending tag when every tag is a
    /// three-digit number. The sort is stable, so repeated tags keep their
    /// source order. Records with any non-numeric tag keep source order.
    pub fn from_fields(leader: Option<Leader>, mut fields: Vec<Field>) -> Self {
        if fields.iter().all(|f| is_numeric_tag(f.tag())) {
            fields.sort_by(|a, b| a.tag().cmp(b.tag()));
        }
        Self { leader, fields }
    }

    pub fn leader(&self) -> Option<&Leader> {
        self.leader.as_ref()
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields_with_tag<'a, 'b>(&'a self, tag: &'b str) -> impl Iterator<Item = &'a Field> + use<'a, 'b> {
        self.fields.iter().filter(move |f| f.tag() == tag)
    }

    /// First `$code` of the first field tagged `tag`.
    pub fn first_subvalue(&self, tag: &str, code: char) -> Option<&str> {
        self.fields_with_tag(tag)
            .flat_map(|f| f.subvalues_with_code(code))
            .next()
    }

    /// Value of the first control field tagged `tag`.
    pub fn control_value(&self, tag: &str) -> Option<&str> {
        self.fields_with_tag(tag).find_map(|f| match f {
            Field::Control { value, .. } => Some(value.as_str()),
            Field::Data { .. } => None,
        })
    }

    /// Leader status `d`: the record was withdrawn from the catalog.
    pub fn is_withdrawn(&self) -> bool {
        self.leader.as_ref().is_some_and(Leader::is_deleted)
    }

    /// Suppressed from discovery (`999 $i 1`).
    pub fn is_suppressed(&self) -> bool {
        self.fields_with_tag("999")
            .flat_map(|f| f.subvalues_with_code('i'))
            .any(|v| v.trim() == "1")
    }

    /// Language material (`a`/`t`) at monograph level (`m`).
    pub fn is_book(&self) -> bool {
        self.leader.as_ref().is_some_and(|l| {
            matches!(l.record_type(), 'a' | 't') && l.bibliographic_level() == 'm'
        })
    }

    /// Render in the line-oriented mnemonic form accepted by the parser.
    pub fn to_mnemonic(&self) -> String {
        let mut out = String::new();
        if let Some(leader) = &self.leader {
            out.push_str(&format!("=LDR  {}\n", leader.as_str().replace(' ', "\\")));
        }
        for field in &self.fields {
            match field {
                Field::Control { tag, value } => {
                    out.push_str(&format!("={tag}  {value}\n"));
                }
                Field::Data {
                    tag,
                    indicators,
                    subvalues,
                } => {
                    out.push_str(&format!(
                        "={tag}  {}{}",
                        blank_as_backslash(indicators[0]),
                        blank_as_backslash(indicators[1])
                    ));
                    for sv in subvalues {
                        out.push('$');
                        out.push(sv.code);
                        out.push_str(&sv.text.replace('$', "{dollar}"));
                    }
                    out.push('\n');
                }
            }
        }
        out
    }
}

fn blank_as_backslash(c: char) -> char {
    if c == ' ' { '\\' } else { c }
}

pub(crate) fn is_numeric_tag(tag: &str) -> bool {
    tag.len() == 3 && tag.bytes().all(|b| b.is_ascii_digit())
}

/// Tags `001`–`009` carry a single opaque value.
pub(crate) fn is_control_tag(tag: &str) -> bool {
    is_numeric_tag(tag) && tag.starts_with("00")
}
