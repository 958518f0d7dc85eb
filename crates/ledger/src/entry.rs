//! Sidecar metadata for ledger records.

use crate::hash::RecordHash;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the ledger knows about a record without reading it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub hash: RecordHash,
    /// Record family, e.g. `history_session`.
    pub kind: String,
    /// Caller-chosen identity. One key maps to exactly one record, forever.
    pub key: String,
    pub size: u64,
    pub stored_at: DateTime<Utc>,
}
