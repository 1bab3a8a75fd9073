use chrono::NaiveDate;
use std::{
    ffi::OsString,
    fs::{self, File, OpenOptions},
    io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, info};

use super::codec::{
    decode_header, decode_slot, encode_slot, tombstone_bytes, Slot, FIRST_NAME_OFFSET, HEADER_SIZE,
    RECORD_SIZE, TOMBSTONE_OFFSET,
};
use super::{
    next_free_id, restore_records, CabinetError, CompositeValidator, FileCabinetRecord, PurgeReport,
    RecordParameters, RecordService, RecordStat, RecordValidator, RestoreReport, Result, Snapshot,
    ValidationError, DISPLAY_DATE_FORMAT,
};

/// Index of a fixed-size slot within the data file.
///
/// Slot `n` starts at byte `n * RECORD_SIZE`. Slots are never moved except
/// by [`FilesystemService::purge`], which renumbers the survivors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SlotId(pub u64);

impl SlotId {
    fn offset(self) -> u64 {
        self.0 * RECORD_SIZE as u64
    }
}

/// Stores records in a single binary file of fixed 277-byte slots.
///
/// ## File Structure
/// ```text
/// cabinet.db:
/// [Slot0][Slot1][Slot2]...[SlotN]
///    |      |
///    |      └─ 277 bytes, see the `codec` layout table
///    └─ tombstone flag first: 0 = live, anything else = removed
/// ```
///
/// ## Removal and Compaction
/// `remove` only flips the tombstone flag of a slot. The bytes stay in
/// place until `purge` copies the live slots, in order, to a new file that
/// replaces the old one. Every read path skips tombstoned slots.
///
/// ## Concurrency
/// One process, one writer. The handle stays open for the life of the
/// service and is replaced on purge.
pub struct FilesystemService {
    path: PathBuf,
    file: File,
    validator: CompositeValidator,
}

impl FilesystemService {
    /// Opens the data file at `path`, creating it (and its directory) if needed.
    ///
    /// ## Returns
    /// * `Ok(FilesystemService)` - ready-to-use store
    /// * `Err(CabinetError::Corrupt)` - file length is not a whole number of slots
    /// * `Err(CabinetError::Io)` - the file cannot be opened
    pub fn open<P: Into<PathBuf>>(path: P, validator: CompositeValidator) -> Result<Self> {
        let path: PathBuf = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = open_data_file(&path)?;
        let service = Self {
            path,
            file,
            validator,
        };
        let slots = service.slot_count()?;
        info!(path = %service.path.display(), slots, "data file opened");
        Ok(service)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of slots in the file, live or not.
    fn slot_count(&self) -> Result<u64> {
        let len = self.file.metadata()?.len();
        if len % RECORD_SIZE as u64 != 0 {
            return Err(CabinetError::Corrupt(format!(
                "{} is {} bytes, not a multiple of the {}-byte slot size",
                self.path.display(),
                len,
                RECORD_SIZE
            )));
        }
        Ok(len / RECORD_SIZE as u64)
    }

    /// Reads every slot from the start of the file, bounded by `slot_count`.
    fn scan(&self) -> Result<Vec<(SlotId, Slot)>> {
        let count = self.slot_count()?;
        let mut handle = &self.file;
        handle.seek(SeekFrom::Start(0))?;
        let mut reader = BufReader::new(handle);
        let mut buf = [0u8; RECORD_SIZE];
        let mut out = Vec::with_capacity(count as usize);
        for index in 0..count {
            reader.read_exact(&mut buf)?;
            out.push((SlotId(index), decode_slot(&buf)?));
        }
        Ok(out)
    }

    /// Live records matching `keep`, in file order.
    fn live_where<F>(&self, keep: F) -> Result<Vec<FileCabinetRecord>>
    where
        F: Fn(&FileCabinetRecord) -> bool,
    {
        Ok(self
            .scan()?
            .into_iter()
            .filter(|(_, slot)| !slot.deleted && keep(&slot.record))
            .map(|(_, slot)| slot.record)
            .collect())
    }

    /// Finds the live slot holding `id`. Only slot headers are read.
    fn locate(&self, id: u32) -> Result<Option<SlotId>> {
        let count = self.slot_count()?;
        let mut handle = &self.file;
        let mut header = [0u8; HEADER_SIZE];
        for index in 0..count {
            let slot = SlotId(index);
            handle.seek(SeekFrom::Start(slot.offset()))?;
            handle.read_exact(&mut header)?;
            let (deleted, slot_id) = decode_header(&header);
            if !deleted && slot_id == id {
                return Ok(Some(slot));
            }
        }
        Ok(None)
    }

    fn max_live_id(&self) -> Result<Option<u32>> {
        Ok(self
            .scan()?
            .iter()
            .filter(|(_, slot)| !slot.deleted)
            .map(|(_, slot)| slot.record.id)
            .max())
    }

    fn write_at(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(bytes)?;
        self.file.flush()?;
        Ok(())
    }

    fn append(&mut self, record: &FileCabinetRecord) -> Result<()> {
        let bytes = encode_slot(record, false)?;
        let slot = SlotId(self.slot_count()?);
        self.write_at(slot.offset(), &bytes)?;
        debug!(id = record.id, slot = slot.0, "slot appended");
        Ok(())
    }

    fn purge_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".purge");
        PathBuf::from(name)
    }
}

fn open_data_file(path: &Path) -> Result<File> {
    Ok(OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?)
}

impl RecordService for FilesystemService {
    fn create(&mut self, params: &RecordParameters) -> Result<u32> {
        self.validator.validate(params)?;
        let record = FileCabinetRecord::from_parameters(next_free_id(self.max_live_id()?)?, params);
        self.append(&record)?;
        Ok(record.id)
    }

    fn insert(&mut self, record: &FileCabinetRecord) -> Result<u32> {
        if record.id == 0 {
            return Err(ValidationError::ZeroId.into());
        }
        self.validator.validate(&record.parameters())?;
        if self.locate(record.id)?.is_some() {
            return Err(CabinetError::DuplicateId(record.id));
        }
        self.append(record)?;
        Ok(record.id)
    }

    fn edit(&mut self, record: &FileCabinetRecord) -> Result<()> {
        self.validator.validate(&record.parameters())?;
        let slot = self
            .locate(record.id)?
            .ok_or(CabinetError::NotFound(record.id))?;
        let bytes = encode_slot(record, false)?;
        // tombstone and id stay as they are
        self.write_at(
            slot.offset() + FIRST_NAME_OFFSET as u64,
            &bytes[FIRST_NAME_OFFSET..],
        )?;
        debug!(id = record.id, slot = slot.0, "slot rewritten");
        Ok(())
    }

    fn remove(&mut self, id: u32) -> Result<()> {
        let slot = self.locate(id)?.ok_or(CabinetError::NotFound(id))?;
        self.write_at(slot.offset() + TOMBSTONE_OFFSET as u64, &tombstone_bytes(true))?;
        debug!(id, slot = slot.0, "slot tombstoned");
        Ok(())
    }

    fn find_by_id(&self, id: u32) -> Result<Option<FileCabinetRecord>> {
        Ok(self.live_where(|r| r.id == id)?.into_iter().next())
    }

    fn find_by_first_name(&self, first_name: &str) -> Result<Vec<FileCabinetRecord>> {
        let wanted = first_name.to_lowercase();
        self.live_where(|r| r.first_name.to_lowercase() == wanted)
    }

    fn find_by_last_name(&self, last_name: &str) -> Result<Vec<FileCabinetRecord>> {
        let wanted = last_name.to_lowercase();
        self.live_where(|r| r.last_name.to_lowercase() == wanted)
    }

    fn find_by_date_of_birth(&self, date_of_birth: &str) -> Result<Vec<FileCabinetRecord>> {
        match NaiveDate::parse_from_str(date_of_birth.trim(), DISPLAY_DATE_FORMAT) {
            Ok(date) => self.live_where(|r| r.date_of_birth == date),
            Err(_) => Ok(Vec::new()),
        }
    }

    fn list(&self) -> Result<Vec<FileCabinetRecord>> {
        self.live_where(|_| true)
    }

    fn stat(&self) -> Result<RecordStat> {
        let slots = self.scan()?;
        Ok(RecordStat {
            total: slots.len(),
            deleted: slots.iter().filter(|(_, slot)| slot.deleted).count(),
        })
    }

    /// Compacts the data file.
    ///
    /// Live slots are copied, in their original order, to `<path>.purge`,
    /// which is synced and renamed over the data file. The handle is then
    /// reopened on the new file.
    fn purge(&mut self) -> Result<PurgeReport> {
        let slots = self.scan()?;
        let total = slots.len();
        let tmp_path = self.purge_path();
        {
            let tmp = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(tmp);
            for (_, slot) in slots.iter().filter(|(_, slot)| !slot.deleted) {
                writer.write_all(&encode_slot(&slot.record, false)?)?;
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        self.file.sync_all()?;
        fs::rename(&tmp_path, &self.path)?;
        self.file = open_data_file(&self.path)?;
        let purged = total - self.slot_count()? as usize;
        info!(purged, total, "data file purged");
        Ok(PurgeReport { purged, total })
    }

    fn restore(&mut self, snapshot: &Snapshot) -> Result<RestoreReport> {
        restore_records(self, snapshot)
    }

    fn close(&mut self) -> Result<()> {
        self.file.sync_all()?;
        info!(path = %self.path.display(), "data file closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{RulesCatalog, ValidationMode, ValidatorBuilder};
    use rust_decimal::Decimal;
    use tempfile::tempdir;

    fn validator() -> CompositeValidator {
        let rules = RulesCatalog::builtin();
        ValidatorBuilder::from_profile(rules.profile(ValidationMode::Default)).create()
    }

    fn params(first: &str) -> RecordParameters {
        RecordParameters {
            first_name: first.into(),
            last_name: "Smith".into(),
            date_of_birth: NaiveDate::from_ymd_opt(1990, 5, 20).unwrap(),
            grade: 4,
            height: Decimal::new(18, 1),
            favourite_symbol: '$',
        }
    }

    fn assert_stat_matches_list(service: &FilesystemService) {
        let stat = service.stat().unwrap();
        assert_eq!(stat.total - stat.deleted, service.list().unwrap().len());
    }

    #[test]
    fn remove_then_purge() {
        let dir = tempdir().unwrap();
        let mut s = FilesystemService::open(dir.path().join("cabinet.db"), validator()).unwrap();
        assert_eq!(s.create(&params("John")).unwrap(), 1);

        s.remove(1).unwrap();
        assert!(s.list().unwrap().is_empty());
        assert_eq!(s.stat().unwrap(), RecordStat { total: 1, deleted: 1 });

        assert_eq!(s.purge().unwrap(), PurgeReport { purged: 1, total: 1 });
        assert_eq!(s.stat().unwrap(), RecordStat { total: 0, deleted: 0 });
        assert_eq!(fs::metadata(s.path()).unwrap().len(), 0);
    }

    #[test]
    fn create_after_highest_possible_id_fails_cleanly() {
        let dir = tempdir().unwrap();
        let mut s = FilesystemService::open(dir.path().join("cabinet.db"), validator()).unwrap();
        let top = FileCabinetRecord::from_parameters(u32::MAX, &params("John"));
        s.insert(&top).unwrap();
        assert!(matches!(
            s.create(&params("Jane")),
            Err(CabinetError::Argument(msg)) if msg.contains("no free id")
        ));
        assert_eq!(s.stat().unwrap(), RecordStat { total: 1, deleted: 0 });
    }

    #[test]
    fn purge_keeps_order_and_is_idempotent() {
        let dir = tempdir().unwrap();
        let mut s = FilesystemService::open(dir.path().join("cabinet.db"), validator()).unwrap();
        for name in ["Ann", "Bob", "Carl", "Dora"] {
            s.create(&params(name)).unwrap();
        }
        s.remove(2).unwrap();
        s.remove(4).unwrap();
        assert_stat_matches_list(&s);

        s.purge().unwrap();
        let first = s.list().unwrap();
        assert_eq!(first.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(s.stat().unwrap().deleted, 0);

        assert_eq!(s.purge().unwrap().purged, 0);
        assert_eq!(s.list().unwrap(), first);
        assert_eq!(s.stat().unwrap(), RecordStat { total: 2, deleted: 0 });
    }

    #[test]
    fn edit_rewrites_fields_in_place() {
        let dir = tempdir().unwrap();
        let mut s = FilesystemService::open(dir.path().join("cabinet.db"), validator()).unwrap();
        s.create(&params("John")).unwrap();
        s.create(&params("Jane")).unwrap();
        let mut record = s.find_by_id(2).unwrap().unwrap();
        record.first_name = "Janet".into();
        record.grade = -3;
        s.edit(&record).unwrap();

        assert_eq!(s.find_by_id(2).unwrap(), Some(record));
        assert_eq!(s.stat().unwrap().total, 2);
    }

    #[test]
    fn missing_ids_end_the_scan_with_not_found() {
        let dir = tempdir().unwrap();
        let mut s = FilesystemService::open(dir.path().join("cabinet.db"), validator()).unwrap();
        s.create(&params("John")).unwrap();
        s.remove(1).unwrap();
        assert!(matches!(s.remove(1), Err(CabinetError::NotFound(1))));
        let ghost = FileCabinetRecord::from_parameters(9, &params("Ghost"));
        assert!(matches!(s.edit(&ghost), Err(CabinetError::NotFound(9))));
    }

    #[test]
    fn tombstoned_rows_are_invisible_to_finders() {
        let dir = tempdir().unwrap();
        let mut s = FilesystemService::open(dir.path().join("cabinet.db"), validator()).unwrap();
        s.create(&params("John")).unwrap();
        s.create(&params("john")).unwrap();
        s.remove(1).unwrap();
        let found = s.find_by_first_name("JOHN").unwrap();
        assert_eq!(found.iter().map(|r| r.id).collect::<Vec<_>>(), vec![2]);
        assert_eq!(s.find_by_date_of_birth("1990-May-20").unwrap().len(), 1);
        assert!(s.find_by_date_of_birth("not a date").unwrap().is_empty());
        assert_eq!(s.find_by_id(1).unwrap(), None);
        assert_stat_matches_list(&s);
    }

    #[test]
    fn records_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("cabinet.db");
        {
            let mut s = FilesystemService::open(&path, validator()).unwrap();
            s.create(&params("John")).unwrap();
            s.create(&params("Jane")).unwrap();
            s.remove(1).unwrap();
            s.close().unwrap();
        }
        let s = FilesystemService::open(&path, validator()).unwrap();
        assert_eq!(s.stat().unwrap(), RecordStat { total: 2, deleted: 1 });
        assert_eq!(s.list().unwrap()[0].first_name, "Jane");
    }

    #[test]
    fn truncated_file_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cabinet.db");
        fs::write(&path, vec![0u8; RECORD_SIZE + 5]).unwrap();
        assert!(matches!(
            FilesystemService::open(&path, validator()),
            Err(CabinetError::Corrupt(_))
        ));
    }

    #[test]
    fn insert_respects_existing_ids() {
        let dir = tempdir().unwrap();
        let mut s = FilesystemService::open(dir.path().join("cabinet.db"), validator()).unwrap();
        let record = FileCabinetRecord::from_parameters(10, &params("John"));
        assert_eq!(s.insert(&record).unwrap(), 10);
        assert!(matches!(s.insert(&record), Err(CabinetError::DuplicateId(10))));
        assert_eq!(s.create(&params("Jane")).unwrap(), 11);
    }

    #[test]
    fn restore_overwrites_colliding_ids() {
        let dir = tempdir().unwrap();
        let mut s = FilesystemService::open(dir.path().join("cabinet.db"), validator()).unwrap();
        s.create(&params("John")).unwrap();
        let incoming = Snapshot::new(vec![
            FileCabinetRecord::from_parameters(1, &params("Johnny")),
            FileCabinetRecord::from_parameters(2, &params("X")),
            FileCabinetRecord::from_parameters(3, &params("Mary")),
        ]);
        let report = s.restore(&incoming).unwrap();
        assert_eq!(report.imported, 2);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].0, 2);

        let names: Vec<_> = s.list().unwrap().into_iter().map(|r| (r.id, r.first_name)).collect();
        assert_eq!(names, vec![(1, "Johnny".to_string()), (3, "Mary".to_string())]);
    }
}
