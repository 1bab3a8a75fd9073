use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

mod cache;
mod codec;
mod config;
mod decorators;
mod error;
mod executor;
mod memory;
mod storage;
mod validate;

pub use cache::{QueryCache, DEFAULT_CACHE_CAPACITY};
pub use codec::{decode_slot, encode_slot, Slot, NAME_CAPACITY, RECORD_SIZE};
pub use config::{RulesCatalog, ValidationMode, ValidationProfile, DEFAULT_RULES_FILE};
pub use decorators::{Logger, Meter};
pub use error::{CabinetError, Result, ValidationError};
pub use executor::{
    apply_assignments, execute_delete, execute_select, execute_update, matching_records, Assignment,
    Connective, Field, FieldValue, Predicate, Selection,
};
pub use memory::MemoryService;
pub use storage::FilesystemService;
pub use validate::{CompositeValidator, RecordValidator, ValidatorBuilder};

/// Date format used by `list`, `find dateofbirth` and the printers (`1990-May-20`).
pub const DISPLAY_DATE_FORMAT: &str = "%Y-%b-%d";

/// Date format used by CSV, XML and query values (`05/20/1990`).
pub const INTERCHANGE_DATE_FORMAT: &str = "%m/%d/%Y";

/// Parses a date written in the interchange, display or ISO format.
pub fn parse_date(input: &str) -> Result<NaiveDate> {
    let input = input.trim();
    [INTERCHANGE_DATE_FORMAT, DISPLAY_DATE_FORMAT, "%Y-%m-%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(input, fmt).ok())
        .ok_or_else(|| CabinetError::Parse(format!("'{}' is not a valid date", input)))
}

/// Person record as held by every store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCabinetRecord {
    pub id: u32,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub grade: i16,
    pub height: Decimal,
    pub favourite_symbol: char,
}

impl FileCabinetRecord {
    pub fn from_parameters(id: u32, params: &RecordParameters) -> Self {
        Self {
            id,
            first_name: params.first_name.clone(),
            last_name: params.last_name.clone(),
            date_of_birth: params.date_of_birth,
            grade: params.grade,
            height: params.height,
            favourite_symbol: params.favourite_symbol,
        }
    }

    pub fn parameters(&self) -> RecordParameters {
        RecordParameters {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            date_of_birth: self.date_of_birth,
            grade: self.grade,
            height: self.height,
            favourite_symbol: self.favourite_symbol,
        }
    }
}

/// Everything a record carries except its id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordParameters {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub grade: i16,
    pub height: Decimal,
    pub favourite_symbol: char,
}

/// Immutable point-in-time copy of all live records, in store order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    records: Vec<FileCabinetRecord>,
}

impl Snapshot {
    pub fn new(records: Vec<FileCabinetRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[FileCabinetRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<FileCabinetRecord> {
        self.records
    }
}

/// Slot accounting reported by `stat`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RecordStat {
    pub total: usize,
    pub deleted: usize,
}

impl RecordStat {
    pub fn live(&self) -> usize {
        self.total - self.deleted
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PurgeReport {
    /// Tombstoned slots that were dropped.
    pub purged: usize,
    /// Slots in the file before compaction.
    pub total: usize,
}

/// Outcome of applying a snapshot: applied count plus the records that were skipped.
#[derive(Debug, Default)]
pub struct RestoreReport {
    pub imported: usize,
    pub rejected: Vec<(u32, CabinetError)>,
}

/// Storage contract shared by the in-memory and the binary file stores and
/// by the decorators wrapping them.
pub trait RecordService {
    /// Validates and stores a new record under the next unused id.
    fn create(&mut self, params: &RecordParameters) -> Result<u32>;

    /// Stores a record under the id it carries.
    fn insert(&mut self, record: &FileCabinetRecord) -> Result<u32>;

    /// Replaces every field of the record with the same id.
    fn edit(&mut self, record: &FileCabinetRecord) -> Result<()>;

    fn remove(&mut self, id: u32) -> Result<()>;

    fn find_by_id(&self, id: u32) -> Result<Option<FileCabinetRecord>>;

    fn find_by_first_name(&self, first_name: &str) -> Result<Vec<FileCabinetRecord>>;

    fn find_by_last_name(&self, last_name: &str) -> Result<Vec<FileCabinetRecord>>;

    /// Looks up by a date in display format; unparsable input matches nothing.
    fn find_by_date_of_birth(&self, date_of_birth: &str) -> Result<Vec<FileCabinetRecord>>;

    /// All live records in store order.
    fn list(&self) -> Result<Vec<FileCabinetRecord>>;

    fn stat(&self) -> Result<RecordStat>;

    fn purge(&mut self) -> Result<PurgeReport>;

    fn snapshot(&self) -> Result<Snapshot> {
        Ok(Snapshot::new(self.list()?))
    }

    /// Applies a snapshot record by record: edits on id collision, inserts otherwise.
    fn restore(&mut self, snapshot: &Snapshot) -> Result<RestoreReport>;

    /// Releases or flushes whatever the store keeps open.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<S: RecordService + ?Sized> RecordService for Box<S> {
    fn create(&mut self, params: &RecordParameters) -> Result<u32> {
        (**self).create(params)
    }

    fn insert(&mut self, record: &FileCabinetRecord) -> Result<u32> {
        (**self).insert(record)
    }

    fn edit(&mut self, record: &FileCabinetRecord) -> Result<()> {
        (**self).edit(record)
    }

    fn remove(&mut self, id: u32) -> Result<()> {
        (**self).remove(id)
    }

    fn find_by_id(&self, id: u32) -> Result<Option<FileCabinetRecord>> {
        (**self).find_by_id(id)
    }

    fn find_by_first_name(&self, first_name: &str) -> Result<Vec<FileCabinetRecord>> {
        (**self).find_by_first_name(first_name)
    }

    fn find_by_last_name(&self, last_name: &str) -> Result<Vec<FileCabinetRecord>> {
        (**self).find_by_last_name(last_name)
    }

    fn find_by_date_of_birth(&self, date_of_birth: &str) -> Result<Vec<FileCabinetRecord>> {
        (**self).find_by_date_of_birth(date_of_birth)
    }

    fn list(&self) -> Result<Vec<FileCabinetRecord>> {
        (**self).list()
    }

    fn stat(&self) -> Result<RecordStat> {
        (**self).stat()
    }

    fn purge(&mut self) -> Result<PurgeReport> {
        (**self).purge()
    }

    fn snapshot(&self) -> Result<Snapshot> {
        (**self).snapshot()
    }

    fn restore(&mut self, snapshot: &Snapshot) -> Result<RestoreReport> {
        (**self).restore(snapshot)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// Restore loop shared by both stores.
pub(crate) fn restore_records<S: RecordService + ?Sized>(
    service: &mut S,
    snapshot: &Snapshot,
) -> Result<RestoreReport> {
    let mut report = RestoreReport::default();
    for record in snapshot.records() {
        let applied = match service.find_by_id(record.id)? {
            Some(_) => service.edit(record).map(|_| record.id),
            None => service.insert(record),
        };
        match applied {
            Ok(_) => report.imported += 1,
            Err(e) if e.is_record_level() => {
                tracing::warn!(id = record.id, error = %e, "skipping record during restore");
                report.rejected.push((record.id, e));
            }
            Err(e) => return Err(e),
        }
    }
    tracing::info!(
        imported = report.imported,
        rejected = report.rejected.len(),
        "restore complete"
    );
    Ok(report)
}

/// Id handed to the next created record: one past the highest live id.
pub(crate) fn next_free_id(max_live: Option<u32>) -> Result<u32> {
    max_live
        .unwrap_or(0)
        .checked_add(1)
        .ok_or_else(|| CabinetError::Argument("no free id left above the highest record id".into()))
}
