//! # file_cabinet - personal record cabinet
//!
//! Stores fixed-schema person records (names, date of birth, grade,
//! height, favourite symbol) either in memory or in a binary data file of
//! fixed 277-byte slots, and drives them from an interactive shell.
//!
//! ## Architecture Overview
//!
//! 1. **Shell Layer** (`shell` module): command loop, dispatch table, prompts and printers
//! 2. **Query Layer** (`sql` module): `insert`/`update`/`delete`/`select` parameters parsed as SQL
//! 3. **Engine Layer** (`engine` module): record model, storage contract, the memory and
//!    file stores, validation, query evaluation and the select cache
//! 4. **Transfer Layer** (`transfer` module): snapshots to and from CSV and XML
//!
//! ## Key Components
//!
//! - **RecordService**: storage contract shared by both stores and the decorators
//! - **FilesystemService**: slot file with tombstones, compacted by `purge`
//! - **MemoryService**: record list with name and date-of-birth hash indices
//! - **ValidatorBuilder**: composes field validators from a validation profile
//! - **Meter / Logger**: timing and call-log wrappers around any store
//!
//! ## Usage Example
//!
//! ```bash
//! cargo run -- --storage file --data ./cabinet.db --validation-rules custom --use-stopwatch
//! > create
//! > select firstname, lastname where grade = 4 or height = 1.8
//! > export csv records.csv
//! ```

/// Interactive command loop and console output
pub mod shell;

/// Record model, stores, validation and query evaluation
pub mod engine;

/// Query command parsing and execution
pub mod sql;

/// CSV and XML snapshot import/export
pub mod transfer;
