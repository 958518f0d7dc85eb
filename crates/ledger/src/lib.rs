//! Write-once record ledger for Spotter.
//!
//! History records are immutable once created. The ledger enforces that at the
//! storage layer: a record is addressed by the BLAKE3 hash of its bytes and
//! bound to a caller-chosen key exactly once.
//!
//! ```rust,no_run
//! use ledger::{FileLedger, RecordStore};
//!
//! let ledger = FileLedger::open("/tmp/spotter-history").unwrap();
//! let entry = ledger.append("history_session", "3f2a", b"{}").unwrap();
//! let bytes = ledger.read(&entry.hash).unwrap();
//! assert!(bytes.is_some());
//! ```

pub mod entry;
pub mod hash;
pub mod store;

pub use entry::LedgerEntry;
pub use hash::{HashError, RecordHash};
pub use store::{FileLedger, LedgerError, MemoryLedger, RecordStore};
