use chrono::Local;
use parking_lot::Mutex;
use std::{io::Write, time::Instant};
use tracing::{info, warn};

use super::{
    FileCabinetRecord, PurgeReport, RecordParameters, RecordService, RecordStat, RestoreReport,
    Result, Snapshot, INTERCHANGE_DATE_FORMAT,
};

/// Measures how long every call into the wrapped service takes.
pub struct Meter<S> {
    inner: S,
}

impl<S: RecordService> Meter<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

fn timed<T>(operation: &'static str, call: impl FnOnce() -> T) -> T {
    let started = Instant::now();
    let out = call();
    let elapsed = started.elapsed();
    info!(
        operation,
        elapsed_us = elapsed.as_micros() as u64,
        "{} method execution duration is {} ticks.",
        operation,
        elapsed.as_nanos() / 100
    );
    out
}

impl<S: RecordService> RecordService for Meter<S> {
    fn create(&mut self, params: &RecordParameters) -> Result<u32> {
        timed("Create", || self.inner.create(params))
    }

    fn insert(&mut self, record: &FileCabinetRecord) -> Result<u32> {
        timed("Insert", || self.inner.insert(record))
    }

    fn edit(&mut self, record: &FileCabinetRecord) -> Result<()> {
        timed("Edit", || self.inner.edit(record))
    }

    fn remove(&mut self, id: u32) -> Result<()> {
        timed("Remove", || self.inner.remove(id))
    }

    fn find_by_id(&self, id: u32) -> Result<Option<FileCabinetRecord>> {
        timed("FindById", || self.inner.find_by_id(id))
    }

    fn find_by_first_name(&self, first_name: &str) -> Result<Vec<FileCabinetRecord>> {
        timed("FindByFirstName", || self.inner.find_by_first_name(first_name))
    }

    fn find_by_last_name(&self, last_name: &str) -> Result<Vec<FileCabinetRecord>> {
        timed("FindByLastName", || self.inner.find_by_last_name(last_name))
    }

    fn find_by_date_of_birth(&self, date_of_birth: &str) -> Result<Vec<FileCabinetRecord>> {
        timed("FindByDateOfBirth", || self.inner.find_by_date_of_birth(date_of_birth))
    }

    fn list(&self) -> Result<Vec<FileCabinetRecord>> {
        timed("List", || self.inner.list())
    }

    fn stat(&self) -> Result<RecordStat> {
        timed("Stat", || self.inner.stat())
    }

    fn purge(&mut self) -> Result<PurgeReport> {
        timed("Purge", || self.inner.purge())
    }

    fn snapshot(&self) -> Result<Snapshot> {
        timed("MakeSnapshot", || self.inner.snapshot())
    }

    fn restore(&mut self, snapshot: &Snapshot) -> Result<RestoreReport> {
        timed("Restore", || self.inner.restore(snapshot))
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
}

/// Appends a line per call and per outcome of the wrapped service to a writer.
///
/// ```text
/// 10/19/2026 14:03 - Calling Create() with FirstName = 'John', LastName = 'Smith', ...
/// 10/19/2026 14:03 - Create() returned '1'
/// ```
pub struct Logger<S, W> {
    inner: S,
    sink: Mutex<W>,
}

impl<S: RecordService, W: Write> Logger<S, W> {
    pub fn new(inner: S, sink: W) -> Self {
        Self {
            inner,
            sink: Mutex::new(sink),
        }
    }

    pub fn into_parts(self) -> (S, W) {
        (self.inner, self.sink.into_inner())
    }
}

fn write_line<W: Write>(sink: &Mutex<W>, message: &str) {
    let stamp = Local::now().format("%m/%d/%Y %H:%M");
    let mut sink = sink.lock();
    if let Err(e) = writeln!(sink, "{} - {}", stamp, message).and_then(|_| sink.flush()) {
        warn!(error = %e, "cannot write call log");
    }
}

fn logged<W: Write, T>(
    sink: &Mutex<W>,
    operation: &str,
    args: String,
    call: impl FnOnce() -> Result<T>,
    describe: impl FnOnce(&T) -> String,
) -> Result<T> {
    if args.is_empty() {
        write_line(sink, &format!("Calling {}()", operation));
    } else {
        write_line(sink, &format!("Calling {}() with {}", operation, args));
    }
    let out = call();
    match &out {
        Ok(value) => write_line(sink, &format!("{}() returned {}", operation, describe(value))),
        Err(e) => write_line(sink, &format!("{}() failed: {}", operation, e)),
    }
    out
}

fn describe_parameters(params: &RecordParameters) -> String {
    format!(
        "FirstName = '{}', LastName = '{}', DateOfBirth = '{}', Grade = '{}', Height = '{}', FavouriteSymbol = '{}'",
        params.first_name,
        params.last_name,
        params.date_of_birth.format(INTERCHANGE_DATE_FORMAT),
        params.grade,
        params.height,
        params.favourite_symbol
    )
}

fn describe_record(record: &FileCabinetRecord) -> String {
    format!("Id = '{}', {}", record.id, describe_parameters(&record.parameters()))
}

fn count(records: &[FileCabinetRecord]) -> String {
    format!("{} record(s)", records.len())
}

impl<S: RecordService, W: Write> RecordService for Logger<S, W> {
    fn create(&mut self, params: &RecordParameters) -> Result<u32> {
        let inner = &mut self.inner;
        logged(&self.sink, "Create", describe_parameters(params), || inner.create(params), |id| {
            format!("'{}'", id)
        })
    }

    fn insert(&mut self, record: &FileCabinetRecord) -> Result<u32> {
        let inner = &mut self.inner;
        logged(&self.sink, "Insert", describe_record(record), || inner.insert(record), |id| {
            format!("'{}'", id)
        })
    }

    fn edit(&mut self, record: &FileCabinetRecord) -> Result<()> {
        let inner = &mut self.inner;
        logged(&self.sink, "Edit", describe_record(record), || inner.edit(record), |_| {
            "nothing".to_string()
        })
    }

    fn remove(&mut self, id: u32) -> Result<()> {
        let inner = &mut self.inner;
        logged(&self.sink, "Remove", format!("Id = '{}'", id), || inner.remove(id), |_| {
            "nothing".to_string()
        })
    }

    fn find_by_id(&self, id: u32) -> Result<Option<FileCabinetRecord>> {
        logged(&self.sink, "FindById", format!("Id = '{}'", id), || self.inner.find_by_id(id), |r| {
            match r {
                Some(_) => "1 record(s)".to_string(),
                None => "0 record(s)".to_string(),
            }
        })
    }

    fn find_by_first_name(&self, first_name: &str) -> Result<Vec<FileCabinetRecord>> {
        logged(
            &self.sink,
            "FindByFirstName",
            format!("FirstName = '{}'", first_name),
            || self.inner.find_by_first_name(first_name),
            |r| count(r),
        )
    }

    fn find_by_last_name(&self, last_name: &str) -> Result<Vec<FileCabinetRecord>> {
        logged(
            &self.sink,
            "FindByLastName",
            format!("LastName = '{}'", last_name),
            || self.inner.find_by_last_name(last_name),
            |r| count(r),
        )
    }

    fn find_by_date_of_birth(&self, date_of_birth: &str) -> Result<Vec<FileCabinetRecord>> {
        logged(
            &self.sink,
            "FindByDateOfBirth",
            format!("DateOfBirth = '{}'", date_of_birth),
            || self.inner.find_by_date_of_birth(date_of_birth),
            |r| count(r),
        )
    }

    fn list(&self) -> Result<Vec<FileCabinetRecord>> {
        logged(&self.sink, "List", String::new(), || self.inner.list(), |r| count(r))
    }

    fn stat(&self) -> Result<RecordStat> {
        logged(&self.sink, "Stat", String::new(), || self.inner.stat(), |s| {
            format!("total = '{}', deleted = '{}'", s.total, s.deleted)
        })
    }

    fn purge(&mut self) -> Result<PurgeReport> {
        let inner = &mut self.inner;
        logged(&self.sink, "Purge", String::new(), || inner.purge(), |p| {
            format!("purged = '{}' of '{}'", p.purged, p.total)
        })
    }

    fn snapshot(&self) -> Result<Snapshot> {
        logged(&self.sink, "MakeSnapshot", String::new(), || self.inner.snapshot(), |s| {
            format!("{} record(s)", s.len())
        })
    }

    fn restore(&mut self, snapshot: &Snapshot) -> Result<RestoreReport> {
        let inner = &mut self.inner;
        logged(
            &self.sink,
            "Restore",
            format!("{} record(s)", snapshot.len()),
            || inner.restore(snapshot),
            |r| format!("imported = '{}', rejected = '{}'", r.imported, r.rejected.len()),
        )
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
}
