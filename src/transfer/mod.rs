//! Snapshot import and export in CSV and XML.
//!
//! Both formats carry dates as `MM/dd/yyyy` and heights as invariant
//! decimals, so exporting a snapshot and importing the file back yields an
//! equal record set.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    io::{Read, Write},
    str::FromStr,
};
use tracing::warn;

use crate::engine::{
    parse_date, CabinetError, FileCabinetRecord, Result, Snapshot, INTERCHANGE_DATE_FORMAT,
};

pub mod csv;
pub mod xml;

/// Interchange file format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Csv,
    Xml,
}

impl Format {
    pub fn write_snapshot<W: Write>(self, snapshot: &Snapshot, writer: W) -> Result<()> {
        match self {
            Format::Csv => csv::write_snapshot(snapshot, writer),
            Format::Xml => xml::write_snapshot(snapshot, writer),
        }
    }

    pub fn read_snapshot<R: Read>(self, reader: R) -> Result<SnapshotLoad> {
        match self {
            Format::Csv => csv::read_snapshot(reader),
            Format::Xml => xml::read_snapshot(reader),
        }
    }
}

impl FromStr for Format {
    type Err = CabinetError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Format::Csv),
            "xml" => Ok(Format::Xml),
            other => Err(CabinetError::Argument(format!(
                "unsupported format '{}'; use csv or xml",
                other
            ))),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Csv => f.write_str("csv"),
            Format::Xml => f.write_str("xml"),
        }
    }
}

/// An entry that could not be turned into a record.
#[derive(Debug)]
pub struct Skipped {
    /// Line number for CSV, record ordinal for XML.
    pub position: u64,
    pub error: CabinetError,
}

/// Records read from a file plus the entries that were left out.
#[derive(Debug, Default)]
pub struct SnapshotLoad {
    pub snapshot: Snapshot,
    pub skipped: Vec<Skipped>,
}

impl SnapshotLoad {
    fn collect(entries: Vec<(u64, Result<FileCabinetRecord>)>) -> Self {
        let mut records = Vec::with_capacity(entries.len());
        let mut skipped = Vec::new();
        for (position, entry) in entries {
            match entry {
                Ok(record) => records.push(record),
                Err(error) => {
                    warn!(position, %error, "skipping unreadable entry");
                    skipped.push(Skipped { position, error });
                }
            }
        }
        Self {
            snapshot: Snapshot::new(records),
            skipped,
        }
    }
}

/// A record with every field as text, as the interchange formats hold it.
///
/// Serde names are the CSV column captions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct RecordText {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "First Name")]
    pub first_name: String,
    #[serde(rename = "Last Name")]
    pub last_name: String,
    #[serde(rename = "Date of birth")]
    pub date_of_birth: String,
    #[serde(rename = "Grade")]
    pub grade: String,
    #[serde(rename = "Height")]
    pub height: String,
    #[serde(rename = "Favourite symbol")]
    pub favourite_symbol: String,
}

impl From<&FileCabinetRecord> for RecordText {
    fn from(record: &FileCabinetRecord) -> Self {
        Self {
            id: record.id.to_string(),
            first_name: record.first_name.clone(),
            last_name: record.last_name.clone(),
            date_of_birth: record.date_of_birth.format(INTERCHANGE_DATE_FORMAT).to_string(),
            grade: record.grade.to_string(),
            height: record.height.to_string(),
            favourite_symbol: record.favourite_symbol.to_string(),
        }
    }
}

impl TryFrom<RecordText> for FileCabinetRecord {
    type Error = CabinetError;

    fn try_from(text: RecordText) -> Result<Self> {
        let bad = |what: &str, raw: &str| CabinetError::Parse(format!("'{}' is not a valid {}", raw, what));
        let id = text.id.trim().parse().map_err(|_| bad("id", &text.id))?;
        let grade = text.grade.trim().parse().map_err(|_| bad("grade", &text.grade))?;
        let height = Decimal::from_str(text.height.trim()).map_err(|_| bad("height", &text.height))?;
        let mut symbol = text.favourite_symbol.chars();
        let favourite_symbol = match (symbol.next(), symbol.next()) {
            (Some(c), None) => c,
            _ => return Err(bad("favourite symbol", &text.favourite_symbol)),
        };
        Ok(FileCabinetRecord {
            id,
            first_name: text.first_name,
            last_name: text.last_name,
            date_of_birth: parse_date(&text.date_of_birth)?,
            grade,
            height,
            favourite_symbol,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_form_round_trips_exactly() {
        for record in fixtures::records() {
            let text = RecordText::from(&record);
            assert_eq!(FileCabinetRecord::try_from(text).unwrap(), record);
        }
    }

    #[test]
    fn text_form_reports_the_bad_field() {
        let mut text = RecordText::from(&fixtures::records()[0]);
        text.height = "1,8".into();
        let err = FileCabinetRecord::try_from(text).unwrap_err();
        assert!(matches!(err, CabinetError::Parse(msg) if msg.contains("height")));
    }

    #[test]
    fn format_names() {
        assert_eq!("XML".parse::<Format>().unwrap(), Format::Xml);
        assert!(matches!("json".parse::<Format>(), Err(CabinetError::Argument(_))));
    }
}
