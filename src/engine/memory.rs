use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::debug;

use super::{
    next_free_id, restore_records, CabinetError, CompositeValidator, FileCabinetRecord, PurgeReport,
    RecordParameters, RecordService, RecordStat, RecordValidator, RestoreReport, Result, Snapshot,
    ValidationError, DISPLAY_DATE_FORMAT,
};

/// Keeps records in memory, in insertion order, with hash indices by first
/// name, last name and date of birth.
///
/// Name index keys are lowercased so lookups are case-insensitive. Buckets
/// hold ids; the records themselves live only in `records`.
pub struct MemoryService {
    validator: CompositeValidator,
    records: HashMap<u32, FileCabinetRecord>,
    order: Vec<u32>,
    by_first_name: HashMap<String, Vec<u32>>,
    by_last_name: HashMap<String, Vec<u32>>,
    by_date_of_birth: HashMap<NaiveDate, Vec<u32>>,
}

impl MemoryService {
    pub fn new(validator: CompositeValidator) -> Self {
        Self {
            validator,
            records: HashMap::new(),
            order: Vec::new(),
            by_first_name: HashMap::new(),
            by_last_name: HashMap::new(),
            by_date_of_birth: HashMap::new(),
        }
    }

    fn next_id(&self) -> Result<u32> {
        next_free_id(self.order.iter().copied().max())
    }

    fn index(&mut self, record: &FileCabinetRecord) {
        self.by_first_name
            .entry(name_key(&record.first_name))
            .or_default()
            .push(record.id);
        self.by_last_name
            .entry(name_key(&record.last_name))
            .or_default()
            .push(record.id);
        self.by_date_of_birth
            .entry(record.date_of_birth)
            .or_default()
            .push(record.id);
    }

    fn unindex(&mut self, record: &FileCabinetRecord) {
        unlink(&mut self.by_first_name, &name_key(&record.first_name), record.id);
        unlink(&mut self.by_last_name, &name_key(&record.last_name), record.id);
        unlink(&mut self.by_date_of_birth, &record.date_of_birth, record.id);
    }

    fn resolve(&self, ids: Option<&Vec<u32>>) -> Vec<FileCabinetRecord> {
        ids.map(|ids| ids.iter().filter_map(|id| self.records.get(id).cloned()).collect())
            .unwrap_or_default()
    }

    fn store(&mut self, record: FileCabinetRecord) {
        self.index(&record);
        self.order.push(record.id);
        self.records.insert(record.id, record);
    }
}

fn name_key(name: &str) -> String {
    name.to_lowercase()
}

fn unlink<K: std::hash::Hash + Eq>(index: &mut HashMap<K, Vec<u32>>, key: &K, id: u32) {
    if let Some(bucket) = index.get_mut(key) {
        bucket.retain(|&other| other != id);
        if bucket.is_empty() {
            index.remove(key);
        }
    }
}

impl RecordService for MemoryService {
    fn create(&mut self, params: &RecordParameters) -> Result<u32> {
        self.validator.validate(params)?;
        let record = FileCabinetRecord::from_parameters(self.next_id()?, params);
        let id = record.id;
        self.store(record);
        debug!(id, "record created");
        Ok(id)
    }

    fn insert(&mut self, record: &FileCabinetRecord) -> Result<u32> {
        if record.id == 0 {
            return Err(ValidationError::ZeroId.into());
        }
        if self.records.contains_key(&record.id) {
            return Err(CabinetError::DuplicateId(record.id));
        }
        self.validator.validate(&record.parameters())?;
        self.store(record.clone());
        debug!(id = record.id, "record inserted");
        Ok(record.id)
    }

    fn edit(&mut self, record: &FileCabinetRecord) -> Result<()> {
        let existing = self
            .records
            .get(&record.id)
            .cloned()
            .ok_or(CabinetError::NotFound(record.id))?;
        self.validator.validate(&record.parameters())?;
        self.unindex(&existing);
        self.index(record);
        self.records.insert(record.id, record.clone());
        debug!(id = record.id, "record edited");
        Ok(())
    }

    fn remove(&mut self, id: u32) -> Result<()> {
        let record = self.records.remove(&id).ok_or(CabinetError::NotFound(id))?;
        self.unindex(&record);
        self.order.retain(|&other| other != id);
        debug!(id, "record removed");
        Ok(())
    }

    fn find_by_id(&self, id: u32) -> Result<Option<FileCabinetRecord>> {
        Ok(self.records.get(&id).cloned())
    }

    fn find_by_first_name(&self, first_name: &str) -> Result<Vec<FileCabinetRecord>> {
        Ok(self.resolve(self.by_first_name.get(&name_key(first_name))))
    }

    fn find_by_last_name(&self, last_name: &str) -> Result<Vec<FileCabinetRecord>> {
        Ok(self.resolve(self.by_last_name.get(&name_key(last_name))))
    }

    fn find_by_date_of_birth(&self, date_of_birth: &str) -> Result<Vec<FileCabinetRecord>> {
        match NaiveDate::parse_from_str(date_of_birth.trim(), DISPLAY_DATE_FORMAT) {
            Ok(date) => Ok(self.resolve(self.by_date_of_birth.get(&date))),
            Err(_) => Ok(Vec::new()),
        }
    }

    fn list(&self) -> Result<Vec<FileCabinetRecord>> {
        Ok(self.resolve(Some(&self.order)))
    }

    fn stat(&self) -> Result<RecordStat> {
        Ok(RecordStat {
            total: self.order.len(),
            deleted: 0,
        })
    }

    fn purge(&mut self) -> Result<PurgeReport> {
        Ok(PurgeReport {
            purged: 0,
            total: self.order.len(),
        })
    }

    fn restore(&mut self, snapshot: &Snapshot) -> Result<RestoreReport> {
        restore_records(self, snapshot)
    }
}
