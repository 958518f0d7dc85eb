//! History: immutable records of finished sets, exercises and workouts.
//!
//! - [`migrate`]: pure live -> History conversion
//! - [`records`]: the record types and access-level views
//! - [`timeline`]: versioned binary telemetry encoding
//! - [`archive`]: write-once persistence on top of the ledger

pub mod archive;
pub mod migrate;
pub mod records;
pub mod timeline;

pub use archive::HistoryArchive;
pub use migrate::{
    migrate_exercise, migrate_session, migrate_set, IssueScope, Migrated, MigrationIssue,
};
pub use records::{
    Access, HistoryExercise, HistorySession, HistorySet, HistorySetView, VitalsRecord,
};
pub use timeline::{EncodedTimeline, FiniteCheck, MigrationError, TIMELINE_VERSION};
