use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde::Deserialize;
use std::io::{self, Read, Write};

use super::{RecordText, SnapshotLoad};
use crate::engine::{CabinetError, FileCabinetRecord, Result, Snapshot};

#[derive(Debug, Deserialize)]
struct XmlRecords {
    #[serde(rename = "record", default)]
    records: Vec<XmlRecord>,
}

#[derive(Debug, Deserialize)]
struct XmlRecord {
    #[serde(rename = "@id")]
    id: String,
    name: XmlName,
    #[serde(rename = "dateOfBirth")]
    date_of_birth: String,
    grade: String,
    height: String,
    #[serde(rename = "favouriteSymbol")]
    favourite_symbol: String,
}

#[derive(Debug, Deserialize)]
struct XmlName {
    #[serde(rename = "@first")]
    first: String,
    #[serde(rename = "@last")]
    last: String,
}

impl From<XmlRecord> for RecordText {
    fn from(record: XmlRecord) -> Self {
        Self {
            id: record.id,
            first_name: record.name.first,
            last_name: record.name.last,
            date_of_birth: record.date_of_birth,
            grade: record.grade,
            height: record.height,
            favourite_symbol: record.favourite_symbol,
        }
    }
}

fn write_error<E: std::fmt::Display>(e: E) -> CabinetError {
    CabinetError::Io(io::Error::new(io::ErrorKind::Other, e.to_string()))
}

fn element<W: Write>(out: &mut Writer<W>, name: &str, text: &str) -> Result<()> {
    out.write_event(Event::Start(BytesStart::new(name)))
        .map_err(write_error)?;
    out.write_event(Event::Text(BytesText::new(text)))
        .map_err(write_error)?;
    out.write_event(Event::End(BytesEnd::new(name)))
        .map_err(write_error)?;
    Ok(())
}

/// Streams the snapshot as a `<records>` document.
///
/// ```xml
/// <records>
///   <record id="1">
///     <name first="John" last="Smith"/>
///     <dateOfBirth>05/20/1990</dateOfBirth>
///     <grade>4</grade>
///     <height>1.8</height>
///     <favouriteSymbol>$</favouriteSymbol>
///   </record>
/// </records>
/// ```
pub fn write_snapshot<W: Write>(snapshot: &Snapshot, writer: W) -> Result<()> {
    let mut out = Writer::new_with_indent(writer, b' ', 2);
    out.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
        .map_err(write_error)?;
    out.write_event(Event::Start(BytesStart::new("records")))
        .map_err(write_error)?;
    for record in snapshot.records() {
        let text = RecordText::from(record);

        let mut start = BytesStart::new("record");
        start.push_attribute(("id", text.id.as_str()));
        out.write_event(Event::Start(start)).map_err(write_error)?;

        let mut name = BytesStart::new("name");
        name.push_attribute(("first", text.first_name.as_str()));
        name.push_attribute(("last", text.last_name.as_str()));
        out.write_event(Event::Empty(name)).map_err(write_error)?;

        element(&mut out, "dateOfBirth", &text.date_of_birth)?;
        element(&mut out, "grade", &text.grade)?;
        element(&mut out, "height", &text.height)?;
        element(&mut out, "favouriteSymbol", &text.favourite_symbol)?;

        out.write_event(Event::End(BytesEnd::new("record")))
            .map_err(write_error)?;
    }
    out.write_event(Event::End(BytesEnd::new("records")))
        .map_err(write_error)?;
    out.into_inner().flush()?;
    Ok(())
}

/// Reads a whole `<records>` document.
///
/// A document that does not have the expected shape fails as a whole;
/// records whose field values do not convert are skipped one by one.
pub fn read_snapshot<R: Read>(mut reader: R) -> Result<SnapshotLoad> {
    let mut document = String::new();
    reader.read_to_string(&mut document)?;
    let parsed: XmlRecords = quick_xml::de::from_str(&document)
        .map_err(|e| CabinetError::Parse(format!("cannot read XML records: {}", e)))?;
    let entries = parsed
        .records
        .into_iter()
        .enumerate()
        .map(|(i, record)| {
            let record = FileCabinetRecord::try_from(RecordText::from(record));
            (i as u64 + 1, record)
        })
        .collect();
    Ok(SnapshotLoad::collect(entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::fixtures;

    fn export(records: Vec<FileCabinetRecord>) -> String {
        let mut out = Vec::new();
        write_snapshot(&Snapshot::new(records), &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn writes_nested_record_elements() {
        let text = export(fixtures::records()[..1].to_vec());
        assert!(text.contains("<record id=\"1\">"));
        assert!(text.contains("<name first=\"John\" last=\"Smith\"/>"));
        assert!(text.contains("<dateOfBirth>05/20/1990</dateOfBirth>"));
        assert!(text.contains("<favouriteSymbol>$</favouriteSymbol>"));
    }

    #[test]
    fn round_trip_escapes_markup() {
        let records = fixtures::records();
        let text = export(records.clone());
        assert!(text.contains("&lt;&amp; Sons&gt;"));
        let load = read_snapshot(text.as_bytes()).unwrap();
        assert!(load.skipped.is_empty());
        assert_eq!(load.snapshot.into_records(), records);
    }

    #[test]
    fn empty_document_has_no_records() {
        let load = read_snapshot(export(Vec::new()).as_bytes()).unwrap();
        assert!(load.snapshot.is_empty());
    }

    #[test]
    fn unconvertible_records_are_skipped() {
        let text = r#"<?xml version="1.0" encoding="utf-8"?>
<records>
  <record id="3">
    <name first="Ann" last="Lee"/>
    <dateOfBirth>01/02/1970</dateOfBirth>
    <grade>2</grade>
    <height>tall</height>
    <favouriteSymbol>%</favouriteSymbol>
  </record>
  <record id="4">
    <name first="Bob" last="Ray"/>
    <dateOfBirth>03/04/1975</dateOfBirth>
    <grade>5</grade>
    <height>1.75</height>
    <favouriteSymbol>+</favouriteSymbol>
  </record>
</records>"#;
        let load = read_snapshot(text.as_bytes()).unwrap();
        assert_eq!(load.snapshot.records()[0].id, 4);
        assert_eq!(load.skipped.len(), 1);
        assert_eq!(load.skipped[0].position, 1);
    }

    #[test]
    fn malformed_document_fails() {
        let err = read_snapshot("<records><record id=\"1\">".as_bytes()).unwrap_err();
        assert!(matches!(err, CabinetError::Parse(_)));
    }
}
