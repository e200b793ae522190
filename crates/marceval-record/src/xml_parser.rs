//! Parser for MARCXML (MARC 21 slim).
//!
//! SAX-style event processing over `<record>` with `<leader>`,
//! `<controlfield tag>` and `<datafield tag ind1 ind2>` / `<subfield code>`
//! children. Namespace prefixes (`marc:record`) are ignored, and a
//! `<collection>` wrapper is accepted; only the first record is read.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::ParseError;
use crate::record::{CanonicalRecord, Field, LEADER_LEN, Leader, SubValue};

/// Which element we're currently reading text for.
enum Reading {
    Leader,
    Control { tag: String },
    Subfield { code: char },
}

struct OpenDataField {
    tag: String,
    indicators: [char; 2],
    subvalues: Vec<SubValue>,
}

fn attr_value(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.attributes().flatten().find_map(|attr| {
        if attr.key.local_name().as_ref() == name {
            attr.unescape_value().ok().map(|v| v.into_owned())
        } else {
            None
        }
    })
}

fn indicator_attr(e: &BytesStart<'_>, name: &[u8]) -> char {
    attr_value(e, name)
        .and_then(|v| v.chars().next())
        .map(|c| if c == '#' || c == '\\' { ' ' } else { c })
        .unwrap_or(' ')
}

/// Pretty-printed documents indent the leader text. Blanks are significant
/// inside a leader, so surrounding whitespace is only dropped when the text
/// is longer than a leader can be.
fn decode_leader(text: &str) -> Result<Leader, ParseError> {
    let text = text.trim_matches(['\r', '\n']);
    if text.chars().count() > LEADER_LEN {
        Leader::parse(text.trim())
    } else {
        Leader::parse(text)
    }
}

/// Parse the first `<record>` in a MARCXML document.
///
/// A syntax error after at least one field has been read ends the record
/// early instead of discarding it: generated candidates are frequently
/// truncated mid-element.
pub fn parse_marcxml(text: &str) -> Result<CanonicalRecord, ParseError> {
    if text.trim().is_empty() {
        return Err(ParseError::Empty);
    }

    let mut xml = Reader::from_reader(text.as_bytes());
    xml.config_mut().trim_text(false);

    let mut buf = Vec::with_capacity(1024);

    let mut in_record = false;
    let mut leader: Option<Leader> = None;
    let mut fields: Vec<Field> = Vec::new();
    let mut open_data: Option<OpenDataField> = None;
    let mut reading: Option<Reading> = None;
    let mut text_buf = String::new();

    loop {
        match xml.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = e.local_name();
                match name.as_ref() {
                    b"record" if !in_record => in_record = true,
                    b"leader" if in_record => {
                        reading = Some(Reading::Leader);
                        text_buf.clear();
                    }
                    b"controlfield" if in_record => {
                        let tag = attr_value(e, b"tag").unwrap_or_default();
                        reading = Some(Reading::Control { tag });
                        text_buf.clear();
                    }
                    b"datafield" if in_record => {
                        open_data = Some(OpenDataField {
                            tag: attr_value(e, b"tag").unwrap_or_default(),
                            indicators: [indicator_attr(e, b"ind1"), indicator_attr(e, b"ind2")],
                            subvalues: Vec::new(),
                        });
                    }
                    b"subfield" if open_data.is_some() => {
                        let code = attr_value(e, b"code")
                            .and_then(|c| c.chars().next())
                            .unwrap_or('?');
                        reading = Some(Reading::Subfield { code });
                        text_buf.clear();
                    }
                    _ => {}
                }
            }

            Ok(Event::Empty(ref e)) => {
                // <subfield code="a"/> and <datafield .../> carry no text.
                let name = e.local_name();
                if name.as_ref() == b"datafield" && in_record {
                    fields.push(Field::data(
                        attr_value(e, b"tag").unwrap_or_default(),
                        indicator_attr(e, b"ind1"),
                        indicator_attr(e, b"ind2"),
                        Vec::new(),
                    ));
                }
            }

            Ok(Event::Text(ref e)) => {
                if reading.is_some()
                    && let Ok(text) = e.unescape()
                {
                    text_buf.push_str(&text);
                }
            }

            Ok(Event::CData(ref e)) => {
                if reading.is_some() {
                    text_buf.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }

            Ok(Event::End(ref e)) => {
                let name = e.local_name();
                match (name.as_ref(), reading.take()) {
                    (b"leader", Some(Reading::Leader)) => {
                        leader = Some(decode_leader(&text_buf)?);
                    }
                    (b"controlfield", Some(Reading::Control { tag })) => {
                        fields.push(Field::control(tag, text_buf.as_str()));
                    }
                    (b"subfield", Some(Reading::Subfield { code })) => {
                        if let Some(df) = open_data.as_mut() {
                            df.subvalues.push(SubValue::new(code, text_buf.trim()));
                        }
                    }
                    (b"datafield", _) => {
                        if let Some(df) = open_data.take() {
                            fields.push(Field::Data {
                                tag: df.tag,
                                indicators: df.indicators,
                                subvalues: df.subvalues,
                            });
                        }
                    }
                    (b"record", _) if in_record => break,
                    (_, other) => reading = other,
                }
            }

            Ok(Event::Eof) => break,
            Err(e) => {
                if fields.is_empty() {
                    return Err(ParseError::Xml(e.to_string()));
                }
                tracing::warn!(error = %e, fields = fields.len(), "MARCXML truncated, keeping fields read so far");
                break;
            }
            _ => {}
        }

        buf.clear();
    }

    // A truncated datafield still counts if it got any sub-values.
    if let Some(df) = open_data.take()
        && !df.subvalues.is_empty()
    {
        fields.push(Field::Data {
            tag: df.tag,
            indicators: df.indicators,
            subvalues: df.subvalues,
        });
    }

    if fields.is_empty() {
        return Err(ParseError::NoFields);
    }

    tracing::debug!(fields = fields.len(), "parsed MARCXML record");
    Ok(CanonicalRecord::from_fields(leader, fields))
}

/// Read events up to the first `</leader>`; `Ok(false)` if the record
/// ends without one.
pub fn leader_is_deleted(text: &str) -> Result<bool, ParseError> {
    if text.trim().is_empty() {
        return Err(ParseError::Empty);
    }

    let mut xml = Reader::from_reader(text.as_bytes());
    let mut buf = Vec::new();
    let mut in_leader = false;
    let mut text_buf = String::new();

    loop {
        match xml.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"leader" => {
                in_leader = true;
            }
            Ok(Event::Text(ref e)) if in_leader => {
                if let Ok(text) = e.unescape() {
                    text_buf.push_str(&text);
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"leader" => return Ok(decode_leader(&text_buf)?.is_deleted()),
                b"record" => return Ok(false),
                _ => {}
            },
            Ok(Event::Eof) => return Ok(false),
            Err(e) => return Err(ParseError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
}
