//! Fixed-size slot layout of the binary data file.
//!
//! ```text
//! offset  size  field
//!      0     2  tombstone flag (0 = live)
//!      2     4  id
//!      6   120  first name  [len:u8][utf-8 bytes, zero padded]
//!    126   120  last name   [len:u8][utf-8 bytes, zero padded]
//!    246     4  year
//!    250     4  month
//!    254     4  day
//!    258     2  grade
//!    260    16  height (rust_decimal wire form)
//!    276     1  favourite symbol (ASCII)
//! ```
//!
//! All integers are little-endian. A slot starts at `index * RECORD_SIZE`.

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;

use super::{CabinetError, FileCabinetRecord, Result, ValidationError};

pub const TOMBSTONE_OFFSET: usize = 0;
pub const ID_OFFSET: usize = 2;
pub const FIRST_NAME_OFFSET: usize = 6;
pub const LAST_NAME_OFFSET: usize = 126;
pub const YEAR_OFFSET: usize = 246;
pub const MONTH_OFFSET: usize = 250;
pub const DAY_OFFSET: usize = 254;
pub const GRADE_OFFSET: usize = 258;
pub const HEIGHT_OFFSET: usize = 260;
pub const SYMBOL_OFFSET: usize = 276;

pub const NAME_FIELD_SIZE: usize = 120;
/// Longest name, in UTF-8 bytes, a slot can hold (one byte goes to the length prefix).
pub const NAME_CAPACITY: usize = NAME_FIELD_SIZE - 1;
pub const RECORD_SIZE: usize = 277;

/// Header bytes needed to tell whether a slot is live and which id it holds.
pub const HEADER_SIZE: usize = FIRST_NAME_OFFSET;

/// A decoded slot: the record plus its tombstone state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Slot {
    pub deleted: bool,
    pub record: FileCabinetRecord,
}

pub fn encode_slot(record: &FileCabinetRecord, deleted: bool) -> Result<[u8; RECORD_SIZE]> {
    let mut buf = [0u8; RECORD_SIZE];
    write_tombstone(&mut buf, deleted);
    buf[ID_OFFSET..ID_OFFSET + 4].copy_from_slice(&record.id.to_le_bytes());
    encode_name(&mut buf[FIRST_NAME_OFFSET..LAST_NAME_OFFSET], "first name", &record.first_name)?;
    encode_name(&mut buf[LAST_NAME_OFFSET..YEAR_OFFSET], "last name", &record.last_name)?;
    let date = record.date_of_birth;
    buf[YEAR_OFFSET..MONTH_OFFSET].copy_from_slice(&date.year().to_le_bytes());
    buf[MONTH_OFFSET..DAY_OFFSET].copy_from_slice(&(date.month() as i32).to_le_bytes());
    buf[DAY_OFFSET..GRADE_OFFSET].copy_from_slice(&(date.day() as i32).to_le_bytes());
    buf[GRADE_OFFSET..HEIGHT_OFFSET].copy_from_slice(&record.grade.to_le_bytes());
    buf[HEIGHT_OFFSET..SYMBOL_OFFSET].copy_from_slice(&record.height.serialize());
    if !record.favourite_symbol.is_ascii() {
        return Err(ValidationError::SymbolNotAscii(record.favourite_symbol).into());
    }
    buf[SYMBOL_OFFSET] = record.favourite_symbol as u8;
    Ok(buf)
}

pub fn decode_slot(buf: &[u8]) -> Result<Slot> {
    if buf.len() != RECORD_SIZE {
        return Err(CabinetError::Corrupt(format!(
            "slot is {} bytes, expected {}",
            buf.len(),
            RECORD_SIZE
        )));
    }
    let (deleted, id) = decode_header(buf);
    let first_name = decode_name(&buf[FIRST_NAME_OFFSET..LAST_NAME_OFFSET], id)?;
    let last_name = decode_name(&buf[LAST_NAME_OFFSET..YEAR_OFFSET], id)?;
    let year = read_i32(buf, YEAR_OFFSET);
    let month = read_i32(buf, MONTH_OFFSET);
    let day = read_i32(buf, DAY_OFFSET);
    let date_of_birth = u32::try_from(month)
        .ok()
        .zip(u32::try_from(day).ok())
        .and_then(|(m, d)| NaiveDate::from_ymd_opt(year, m, d))
        .ok_or_else(|| {
            CabinetError::Corrupt(format!("record #{} has invalid date {}-{}-{}", id, year, month, day))
        })?;
    let grade = i16::from_le_bytes([buf[GRADE_OFFSET], buf[GRADE_OFFSET + 1]]);
    let mut height = [0u8; 16];
    height.copy_from_slice(&buf[HEIGHT_OFFSET..SYMBOL_OFFSET]);
    let symbol = buf[SYMBOL_OFFSET];
    if !symbol.is_ascii() {
        return Err(CabinetError::Corrupt(format!(
            "record #{} has non-ASCII symbol byte {:#04x}",
            id, symbol
        )));
    }
    Ok(Slot {
        deleted,
        record: FileCabinetRecord {
            id,
            first_name,
            last_name,
            date_of_birth,
            grade,
            height: Decimal::deserialize(height),
            favourite_symbol: symbol as char,
        },
    })
}

/// Reads the tombstone flag and id from the first `HEADER_SIZE` bytes of a slot.
pub fn decode_header(buf: &[u8]) -> (bool, u32) {
    let flag = i16::from_le_bytes([buf[TOMBSTONE_OFFSET], buf[TOMBSTONE_OFFSET + 1]]);
    let id = u32::from_le_bytes([
        buf[ID_OFFSET],
        buf[ID_OFFSET + 1],
        buf[ID_OFFSET + 2],
        buf[ID_OFFSET + 3],
    ]);
    (flag != 0, id)
}

pub fn tombstone_bytes(deleted: bool) -> [u8; 2] {
    (deleted as i16).to_le_bytes()
}

fn write_tombstone(buf: &mut [u8], deleted: bool) {
    buf[TOMBSTONE_OFFSET..ID_OFFSET].copy_from_slice(&tombstone_bytes(deleted));
}

fn encode_name(field: &mut [u8], name: &'static str, value: &str) -> Result<()> {
    let bytes = value.as_bytes();
    if bytes.len() > NAME_CAPACITY {
        return Err(ValidationError::NameTooWide {
            field: name,
            capacity: NAME_CAPACITY,
            actual: bytes.len(),
        }
        .into());
    }
    field[0] = bytes.len() as u8;
    field[1..1 + bytes.len()].copy_from_slice(bytes);
    Ok(())
}

fn decode_name(field: &[u8], id: u32) -> Result<String> {
    let len = field[0] as usize;
    if len > NAME_CAPACITY {
        return Err(CabinetError::Corrupt(format!(
            "record #{} has name length {} beyond capacity {}",
            id, len, NAME_CAPACITY
        )));
    }
    String::from_utf8(field[1..1 + len].to_vec())
        .map_err(|_| CabinetError::Corrupt(format!("record #{} has a name that is not UTF-8", id)))
}

fn read_i32(buf: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}
