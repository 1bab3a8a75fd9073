use ::csv::{ReaderBuilder, StringRecord, Trim, WriterBuilder};
use std::io::{Read, Write};

use super::{RecordText, SnapshotLoad};
use crate::engine::{CabinetError, FileCabinetRecord, Result, Snapshot};

pub const HEADER: [&str; 7] = [
    "Id",
    "First Name",
    "Last Name",
    "Date of birth",
    "Grade",
    "Height",
    "Favourite symbol",
];

fn csv_error(e: ::csv::Error) -> CabinetError {
    let message = e.to_string();
    match e.into_kind() {
        ::csv::ErrorKind::Io(io) => CabinetError::Io(io),
        _ => CabinetError::Parse(message),
    }
}

/// Writes the header and one row per record.
pub fn write_snapshot<W: Write>(snapshot: &Snapshot, writer: W) -> Result<()> {
    let mut out = WriterBuilder::new().has_headers(false).from_writer(writer);
    out.write_record(HEADER).map_err(csv_error)?;
    for record in snapshot.records() {
        out.serialize(RecordText::from(record)).map_err(csv_error)?;
    }
    out.flush()?;
    Ok(())
}

/// Reads rows under the standard header; rows that do not convert are skipped.
pub fn read_snapshot<R: Read>(reader: R) -> Result<SnapshotLoad> {
    let mut input = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::Headers)
        .flexible(true)
        .from_reader(reader);
    let headers = input.headers().map_err(csv_error)?.clone();
    if headers != StringRecord::from(HEADER.to_vec()) {
        return Err(CabinetError::Parse(format!(
            "unexpected CSV header '{}'",
            headers.iter().collect::<Vec<_>>().join(",")
        )));
    }

    let mut entries = Vec::new();
    for row in input.records() {
        let entry = match row {
            Ok(row) => {
                let line = row.position().map_or(0, |p| p.line());
                let record = row
                    .deserialize::<RecordText>(Some(&headers))
                    .map_err(csv_error)
                    .and_then(FileCabinetRecord::try_from);
                (line, record)
            }
            Err(e) => (e.position().map_or(0, |p| p.line()), Err(csv_error(e))),
        };
        match entry {
            (_, Err(e @ CabinetError::Io(_))) => return Err(e),
            entry => entries.push(entry),
        }
    }
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
    fn writes_header_and_interchange_formats() {
        let text = export(fixtures::records()[..1].to_vec());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Id,First Name,Last Name,Date of birth,Grade,Height,Favourite symbol");
        assert_eq!(lines[1], "1,John,Smith,05/20/1990,4,1.8,$");
    }

    #[test]
    fn header_is_written_for_empty_snapshot() {
        assert_eq!(export(Vec::new()).lines().count(), 1);
    }

    #[test]
    fn round_trip_keeps_awkward_names() {
        let records = fixtures::records();
        let load = read_snapshot(export(records.clone()).as_bytes()).unwrap();
        assert!(load.skipped.is_empty());
        assert_eq!(load.snapshot.into_records(), records);
    }

    #[test]
    fn padded_names_keep_their_spaces() {
        let mut record = fixtures::records().remove(0);
        record.first_name = " John".into();
        record.last_name = "Smith  ".into();
        let load = read_snapshot(export(vec![record.clone()]).as_bytes()).unwrap();
        assert_eq!(load.snapshot.into_records(), vec![record]);
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let text = "Id,First Name,Last Name,Date of birth,Grade,Height,Favourite symbol\n\
                    1,John,Smith,05/20/1990,4,1.8,$\n\
                    2,Jane,Doe,31/31/1990,4,1.8,$\n\
                    3,Short,Row\n\
                    4,Ann,Lee,01/02/1970,2,1.6,%\n";
        let load = read_snapshot(text.as_bytes()).unwrap();
        let ids: Vec<u32> = load.snapshot.records().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 4]);
        let lines: Vec<u64> = load.skipped.iter().map(|s| s.position).collect();
        assert_eq!(lines, vec![3, 4]);
    }

    #[test]
    fn foreign_header_is_rejected() {
        let err = read_snapshot("a,b,c\n1,2,3\n".as_bytes()).unwrap_err();
        assert!(matches!(err, CabinetError::Parse(_)));
    }
}
