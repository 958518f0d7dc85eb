//! Persisted History Sessions.

use crate::history::records::HistorySession;
use anyhow::{Context, Result};
use ledger::{FileLedger, LedgerEntry, MemoryLedger, RecordStore};
use spotproto::SessionId;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

const SESSION_KIND: &str = "history_session";

/// Write-once archive of finished workouts, keyed by session id.
#[derive(Clone)]
pub struct HistoryArchive {
    store: Arc<dyn RecordStore>,
}

impl HistoryArchive {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub fn open(dir: &Path) -> Result<Self> {
        let ledger = FileLedger::open(dir)
            .with_context(|| format!("failed to open history at {}", dir.display()))?;
        Ok(Self::new(Arc::new(ledger)))
    }

    /// Open for listing and reading only.
    pub fn open_read_only(dir: &Path) -> Self {
        Self::new(Arc::new(FileLedger::open_read_only(dir)))
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryLedger::new()))
    }

    pub fn store(&self, session: &HistorySession) -> Result<LedgerEntry> {
        let json = serde_json::to_vec_pretty(session).context("failed to serialize history session")?;
        let entry = self
            .store
            .append(SESSION_KIND, &session.id.to_string(), &json)
            .with_context(|| format!("failed to archive session {}", session.id))?;
        info!(session_id = %session.id, hash = %entry.hash, size = entry.size, "session archived");
        Ok(entry)
    }

    pub fn load(&self, id: SessionId) -> Result<Option<HistorySession>> {
        let Some(entry) = self.store.lookup(SESSION_KIND, &id.to_string())? else {
            return Ok(None);
        };
        let bytes = self
            .store
            .read(&entry.hash)?
            .with_context(|| format!("session {id} is indexed but its record {} is missing", entry.hash))?;
        let session = serde_json::from_slice(&bytes)
            .with_context(|| format!("failed to parse archived session {id}"))?;
        Ok(Some(session))
    }

    /// Archived sessions, oldest first.
    pub fn list(&self) -> Result<Vec<LedgerEntry>> {
        self.store.entries(SESSION_KIND)
    }
}

impl std::fmt::Debug for HistoryArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryArchive").finish_non_exhaustive()
    }
}
