use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

/// A single field rule violated by a candidate record.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("{field} must not be empty or whitespace")]
    BlankName { field: &'static str },
    #[error("{field} length must be between {min} and {max} characters, got {actual}")]
    NameLength {
        field: &'static str,
        min: usize,
        max: usize,
        actual: usize,
    },
    #[error("{field} takes {actual} bytes, the record slot holds at most {capacity}")]
    NameTooWide {
        field: &'static str,
        capacity: usize,
        actual: usize,
    },
    #[error("date of birth must be between {from} and {to}")]
    DateOutOfRange { from: NaiveDate, to: NaiveDate },
    #[error("grade must be between {min} and {max}")]
    GradeOutOfRange { min: i16, max: i16 },
    #[error("height must be between {min} and {max}")]
    HeightOutOfRange { min: Decimal, max: Decimal },
    #[error("favourite symbol '{0}' is not allowed")]
    BannedSymbol(char),
    #[error("favourite symbol '{0}' must be a printable ASCII character")]
    SymbolNotAscii(char),
    #[error("id must be a positive number")]
    ZeroId,
}

#[derive(Debug, Error)]
pub enum CabinetError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("record #{0} is not found")]
    NotFound(u32),
    #[error("record #{0} already exists")]
    DuplicateId(u32),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("invalid arguments: {0}")]
    Argument(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("data file is corrupt: {0}")]
    Corrupt(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl CabinetError {
    /// True for errors that only concern the record at hand.
    pub fn is_record_level(&self) -> bool {
        matches!(
            self,
            CabinetError::Validation(_)
                | CabinetError::NotFound(_)
                | CabinetError::DuplicateId(_)
                | CabinetError::Parse(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CabinetError>;
