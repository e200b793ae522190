//! Parser for the line-oriented mnemonic (MarcEdit `.mrk`) form.
//!
//! ```text
//! =LDR  00000nam  2200000   4500
//! =001  ocm12345
//! =245  14$aThe great Gatsby /$cF. Scott Fitzgerald.
//! ```
//!
//! Generated candidates are often wrapped in prose or markdown fences, so
//! lines that do not begin with a tag are ignored rather than rejected.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::ParseError;
use crate::record::{CanonicalRecord, Field, Leader, SubValue, is_control_tag};

/// `=` is optional; with it any 3-char label is a tag, without it only
/// digits or `LDR` count, so prose like "The end" is never read as a field.
static LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:=([0-9A-Za-z]{3})|([0-9]{3}|LDR))(?:[ \t](.*))?$").unwrap()
});

const DOLLAR_ESCAPE: &str = "{dollar}";

struct Line<'a> {
    tag: &'a str,
    prefixed: bool,
    body: &'a str,
}

fn split_line(line: &str) -> Option<Line<'_>> {
    let caps = LINE_RE.captures(line)?;
    let (tag, prefixed) = match (caps.get(1), caps.get(2)) {
        (Some(t), _) => (t.as_str(), true),
        (None, Some(t)) => (t.as_str(), false),
        (None, None) => return None,
    };
    // The tag is followed by two spaces in MarcEdit output; one of them was
    // consumed by the pattern.
    let body = caps.get(3).map(|m| m.as_str()).unwrap_or("");
    let body = body.strip_prefix(' ').unwrap_or(body);
    Some(Line {
        tag,
        prefixed,
        body,
    })
}

fn is_leader_tag(tag: &str) -> bool {
    tag.eq_ignore_ascii_case("LDR") || tag == "000"
}

fn decode_leader(body: &str) -> Result<Leader, ParseError> {
    Leader::parse(&body.trim_end().replace('\\', " "))
}

/// Map the mnemonic blank markers to a real blank.
fn indicator(c: char) -> char {
    match c {
        '\\' | '#' | '_' => ' ',
        other => other,
    }
}

fn unescape(text: &str) -> String {
    text.replace(DOLLAR_ESCAPE, "$")
}

/// Parse the portion after the tag: indicators, then `$`-delimited sub-values.
fn parse_data_body(tag: &str, body: &str, prefixed: bool) -> Option<Field> {
    let Some(first_dollar) = body.find('$') else {
        // `=245  10Title` style output with the delimiters lost: keep the
        // text as a single `$a` so the value still takes part in comparison.
        if !prefixed {
            return None;
        }
        let mut chars = body.chars();
        let ind1 = chars.next().map(indicator).unwrap_or(' ');
        let ind2 = chars.next().map(indicator).unwrap_or(' ');
        let text = unescape(chars.as_str().trim());
        if text.is_empty() {
            return None;
        }
        return Some(Field::data(tag, ind1, ind2, vec![SubValue::new('a', text)]));
    };

    let mut prefix = body[..first_dollar].chars();
    let ind1 = prefix.next().map(indicator).unwrap_or(' ');
    let ind2 = prefix.next().map(indicator).unwrap_or(' ');

    let mut subvalues: Vec<SubValue> = Vec::new();
    for piece in body[first_dollar + 1..].split('$') {
        let mut chars = piece.chars();
        match chars.next() {
            Some(code) if code.is_ascii_alphanumeric() => {
                subvalues.push(SubValue::new(code, unescape(chars.as_str().trim())));
            }
            // A bare `$` inside text (prices, "$ 5.00"): glue it back on.
            _ => match subvalues.last_mut() {
                Some(last) => {
                    last.text.push('$');
                    last.text.push_str(&unescape(piece.trim_end()));
                }
                None => continue,
            },
        }
    }

    if subvalues.is_empty() {
        return None;
    }
    Some(Field::data(tag, ind1, ind2, subvalues))
}

/// Parse one mnemonic record.
pub fn parse_mnemonic(text: &str) -> Result<CanonicalRecord, ParseError> {
    if text.trim().is_empty() {
        return Err(ParseError::Empty);
    }

    let mut leader = None;
    let mut fields = Vec::new();
    let mut skipped = 0usize;

    for raw_line in text.lines() {
        let line = raw_line.trim_end_matches('\r');
        let Some(Line {
            tag,
            prefixed,
            body,
        }) = split_line(line.trim_start())
        else {
            if !line.trim().is_empty() {
                skipped += 1;
            }
            continue;
        };

        if is_leader_tag(tag) {
            if leader.is_none() {
                leader = Some(decode_leader(body)?);
            }
            continue;
        }

        if is_control_tag(tag) {
            fields.push(Field::control(tag, body.trim_end()));
            continue;
        }

        match parse_data_body(tag, body, prefixed) {
            Some(field) => fields.push(field),
            None => skipped += 1,
        }
    }

    if fields.is_empty() {
        return Err(ParseError::NoFields);
    }

    tracing::debug!(fields = fields.len(), skipped, "parsed mnemonic record");
    Ok(CanonicalRecord::from_fields(leader, fields))
}

/// Read only the leader line; `Ok(false)` when the record has none.
pub fn leader_is_deleted(text: &str) -> Result<bool, ParseError> {
    if text.trim().is_empty() {
        return Err(ParseError::Empty);
    }
    for line in text.lines() {
        if let Some(l) = split_line(line.trim_start().trim_end_matches('\r'))
            && is_leader_tag(l.tag)
        {
            return Ok(decode_leader(l.body)?.is_deleted());
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GATSBY: &str = "=LDR  00000nam  2200000   4500
=001  ocm12345
=020  \\\\$a978-0-7432-7356-5
=100  1\\$aFitzgerald, F. Scott,$d1896-1940.
=245  14$aThe great Gatsby /$cF. Scott Fitzgerald.
=650  \\0$aRich people$vFiction.$vFiction.
";

    #[test]
    fn parses_leader_control_and_data_fields() {
        let record = parse_mnemonic(GATSBY).unwrap();
        assert_eq!(record.leader().unwrap().status(), 'n');
        assert_eq!(record.control_value("001"), Some("ocm12345"));
        assert_eq!(record.len(), 5);

        let title = record.fields_with_tag("245").next().unwrap();
        assert_eq!(title.indicators(), ['1', '4']);
        assert_eq!(
            title.subvalues_with_code('a').next(),
            Some("The great Gatsby /")
        );
    }

    #[test]
    fn blank_indicators_decode_to_spaces() {
        let record = parse_mnemonic(GATSBY).unwrap();
        let isbn = record.fields_with_tag("020").next().unwrap();
        assert_eq!(isbn.indicators(), [' ', ' ']);
        let author = record.fields_with_tag("100").next().unwrap();
        assert_eq!(author.indicators(), ['1', ' ']);
    }

    #[test]
    fn duplicate_codes_are_preserved_in_order() {
        let record = parse_mnemonic(GATSBY).unwrap();
        let subject = record.fields_with_tag("650").next().unwrap();
        let codes: Vec<char> = subject.subvalues().iter().map(|s| s.code).collect();
        assert_eq!(codes, vec!['a', 'v', 'v']);
    }

    #[test]
    fn unprefixed_lines_and_prose_are_tolerated() {
        let text = "Here is the MARC record you asked for:\n```\n245 10$aMoby Dick\n100 1 $aMelville, Herman\n```\nHope this helps!";
        let record = parse_mnemonic(text).unwrap();
        assert_eq!(record.len(), 2);
        assert_eq!(record.first_subvalue("245", 'a'), Some("Moby Dick"));
        assert_eq!(record.first_subvalue("100", 'a'), Some("Melville, Herman"));
    }

    #[test]
    fn prose_starting_with_digits_is_not_a_field() {
        let text = "=245  10$aTitle\n100 years of history";
        let record = parse_mnemonic(text).unwrap();
        assert_eq!(record.len(), 1);
    }

    #[test]
    fn prefixed_line_without_delimiters_becomes_subfield_a() {
        let record = parse_mnemonic("=245  10Moby Dick").unwrap();
        assert_eq!(record.first_subvalue("245", 'a'), Some("Moby Dick"));
    }

    #[test]
    fn dollar_escape_and_bare_dollar() {
        let record = parse_mnemonic("=020  \\\\$a123$c{dollar}5.00\n=350  \\\\$aPrice $ 12").unwrap();
        assert_eq!(record.first_subvalue("020", 'c'), Some("$5.00"));
        assert_eq!(record.first_subvalue("350", 'a'), Some("Price$ 12"));
    }

    #[test]
    fn empty_input_is_an_error() {
        assert_eq!(parse_mnemonic("  \n "), Err(ParseError::Empty));
    }

    #[test]
    fn leader_only_has_no_fields() {
        assert_eq!(
            parse_mnemonic("=LDR  00000nam  2200000   4500"),
            Err(ParseError::NoFields)
        );
    }

    #[test]
    fn bad_leader_is_an_error() {
        assert!(matches!(
            parse_mnemonic("=LDR  00\n=245  10$aX"),
            Err(ParseError::InvalidLeader(_))
        ));
    }

    #[test]
    fn deleted_status_is_read_from_leader_line() {
        assert!(leader_is_deleted("=LDR  00000dam  2200000   4500\n=245  10$aX").unwrap());
        assert!(!leader_is_deleted(GATSBY).unwrap());
        assert!(!leader_is_deleted("=245  10$aNo leader").unwrap());
    }

    #[test]
    fn backslash_blanks_in_leader() {
        let record = parse_mnemonic("=LDR  00000nam\\\\2200000\\\\\\4500\n=245  10$aX").unwrap();
        assert_eq!(record.leader().unwrap().as_str(), "00000nam  2200000   4500");
    }
}
