use marceval_record::{Field, RecordFormat, SubValue, detect_format, is_withdrawn, parse};

const MOBY_MRK: &str = r"=LDR  00000cam a2200000 a 4500
=001  ocm00012345
=008  851010s1851    nyu           000 1 eng d
=020  \\$a9780142437247
=100  1\$aMelville, Herman,$d1819-1891.
=245  10$aMoby Dick, or, The whale /$cHerman Melville.
=264  \1$aNew York :$bHarper,$c1851.
=650  \0$aWhaling$vFiction.
=650  \0$aWhales$vFiction.
";

const MOBY_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<record xmlns="http://www.loc.gov/MARC21/slim">
  <leader>00000cam a2200000 a 4500</leader>
  <controlfield tag="008">851010s1851    nyu           000 1 eng d</controlfield>
  <controlfield tag="001">ocm00012345</controlfield>
  <datafield tag="245" ind1="1" ind2="0">
    <subfield code="a">Moby Dick, or, The whale /</subfield>
    <subfield code="c">Herman Melville.</subfield>
  </datafield>
  <datafield tag="100" ind1="1" ind2=" ">
    <subfield code="a">Melville, Herman,</subfield>
    <subfield code="d">1819-1891.</subfield>
  </datafield>
  <datafield tag="020" ind1=" " ind2=" ">
    <subfield code="a">9780142437247</subfield>
  </datafield>
  <datafield tag="264" ind1=" " ind2="1">
    <subfield code="a">New York :</subfield>
    <subfield code="b">Harper,</subfield>
    <subfield code="c">1851.</subfield>
  </datafield>
  <datafield tag="650" ind1=" " ind2="0">
    <subfield code="a">Whaling</subfield>
    <subfield code="v">Fiction.</subfield>
  </datafield>
  <datafield tag="650" ind1=" " ind2="0">
    <subfield code="a">Whales</subfield>
    <subfield code="v">Fiction.</subfield>
  </datafield>
</record>"#;

#[test]
fn both_encodings_parse_to_the_same_record() {
    assert_eq!(detect_format(MOBY_MRK), RecordFormat::Mnemonic);
    assert_eq!(detect_format(MOBY_XML), RecordFormat::MarcXml);

    let from_mrk = parse(MOBY_MRK.as_bytes(), None).unwrap();
    let from_xml = parse(MOBY_XML.as_bytes(), None).unwrap();
    assert_eq!(from_mrk, from_xml);
}

#[test]
fn repeated_fields_keep_source_order() {
    let record = parse(MOBY_MRK.as_bytes(), Some(RecordFormat::Mnemonic)).unwrap();
    let subjects: Vec<&str> = record
        .fields_with_tag("650")
        .flat_map(|f| f.subvalues_with_code('a'))
        .collect();
    assert_eq!(subjects, vec!["Whaling", "Whales"]);
}

#[test]
fn rendered_mnemonic_parses_back() {
    let record = parse(MOBY_XML.as_bytes(), None).unwrap();
    let reparsed = parse(record.to_mnemonic().as_bytes(), None).unwrap();
    assert_eq!(record, reparsed);
}

#[test]
fn header_check_matches_full_parse() {
    for raw in [MOBY_MRK, MOBY_XML] {
        let record = parse(raw.as_bytes(), None).unwrap();
        assert_eq!(is_withdrawn(raw.as_bytes(), None).unwrap(), record.is_withdrawn());
    }
}

#[test]
fn control_field_is_stored_verbatim() {
    let record = parse(MOBY_MRK.as_bytes(), None).unwrap();
    let fixed = record.fields_with_tag("008").next().unwrap();
    assert!(matches!(fixed, Field::Control { value, .. } if value.starts_with("851010s1851")));
    let isbn = record.fields_with_tag("020").next().unwrap();
    assert_eq!(isbn.subvalues(), &[SubValue::new('a', "9780142437247")]);
}
