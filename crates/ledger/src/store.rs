//! Record stores.
//!
//! Layout of a [`FileLedger`]:
//! ```text
//! {root}/
//! ├── objects/
//! │   └── ab/
//! │       └── cdef0123...          # record bytes (remainder of hash)
//! └── entries/
//!     └── history_session/
//!         └── {key}.json           # LedgerEntry
//! ```
//!
//! Objects are content-addressed and shared. Entries bind a key to exactly one
//! object and are created with `create_new`, so a key can never be rebound.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use anyhow::{Context, Result};
use chrono::Utc;
use thiserror::Error;
use tracing::debug;

use crate::entry::LedgerEntry;
use crate::hash::RecordHash;

#[derive(Debug, Error, PartialEq)]
pub enum LedgerError {
    #[error("{kind}/{key} is already recorded as {existing}; records are immutable")]
    AlreadyRecorded {
        kind: String,
        key: String,
        existing: RecordHash,
    },

    #[error("ledger is read-only")]
    ReadOnly,

    #[error("invalid ledger name {0:?}: use letters, digits, '-' or '_'")]
    InvalidName(String),
}

/// Append-only record storage.
///
/// Appending the same bytes under the same key again is a no-op that returns
/// the original entry. Appending different bytes under a recorded key fails
/// with [`LedgerError::AlreadyRecorded`].
pub trait RecordStore: Send + Sync {
    fn append(&self, kind: &str, key: &str, data: &[u8]) -> Result<LedgerEntry>;

    /// Returns `Ok(None)` if the hash is unknown.
    fn read(&self, hash: &RecordHash) -> Result<Option<Vec<u8>>>;

    fn lookup(&self, kind: &str, key: &str) -> Result<Option<LedgerEntry>>;

    /// All entries of a kind, oldest first.
    fn entries(&self, kind: &str) -> Result<Vec<LedgerEntry>>;
}

fn check_name(name: &str) -> Result<(), LedgerError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(LedgerError::InvalidName(name.to_string()))
    }
}

fn new_entry(kind: &str, key: &str, data: &[u8]) -> LedgerEntry {
    LedgerEntry {
        hash: RecordHash::of(data),
        kind: kind.to_string(),
        key: key.to_string(),
        size: data.len() as u64,
        stored_at: Utc::now(),
    }
}

fn sort_entries(entries: &mut [LedgerEntry]) {
    entries.sort_by(|a, b| a.stored_at.cmp(&b.stored_at).then(a.key.cmp(&b.key)));
}

/// Filesystem ledger.
#[derive(Debug, Clone)]
pub struct FileLedger {
    root: PathBuf,
    read_only: bool,
}

impl FileLedger {
    /// Open (creating directories as needed) a writable ledger.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("objects")).context("failed to create ledger objects directory")?;
        fs::create_dir_all(root.join("entries")).context("failed to create ledger entries directory")?;
        Ok(Self {
            root,
            read_only: false,
        })
    }

    /// Open a ledger for reading only. The directory does not have to exist.
    pub fn open_read_only(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            read_only: true,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, hash: &RecordHash) -> PathBuf {
        self.root.join("objects").join(hash.shard()).join(hash.leaf())
    }

    fn entry_dir(&self, kind: &str) -> PathBuf {
        self.root.join("entries").join(kind)
    }

    fn entry_path(&self, kind: &str, key: &str) -> PathBuf {
        self.entry_dir(kind).join(format!("{key}.json"))
    }

    fn read_entry(path: &Path) -> Result<LedgerEntry> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("failed to read ledger entry {}", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("failed to parse ledger entry {}", path.display()))
    }

    fn write_object(&self, hash: &RecordHash, data: &[u8]) -> Result<()> {
        let path = self.object_path(hash);
        if path.exists() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("failed to create object shard directory")?;
        }
        // Write beside the target, then rename, so readers never see a torn object.
        let tmp = path.with_extension("partial");
        fs::write(&tmp, data).context("failed to write ledger object")?;
        fs::rename(&tmp, &path).context("failed to move ledger object into place")?;
        Ok(())
    }

    fn existing_or_conflict(
        &self,
        path: &Path,
        candidate: LedgerEntry,
    ) -> Result<LedgerEntry> {
        let existing = Self::read_entry(path)?;
        if existing.hash == candidate.hash {
            debug!(kind = %existing.kind, key = %existing.key, "record already stored");
            return Ok(existing);
        }
        Err(LedgerError::AlreadyRecorded {
            kind: candidate.kind,
            key: candidate.key,
            existing: existing.hash,
        }
        .into())
    }
}

impl RecordStore for FileLedger {
    fn append(&self, kind: &str, key: &str, data: &[u8]) -> Result<LedgerEntry> {
        if self.read_only {
            return Err(LedgerError::ReadOnly.into());
        }
        check_name(kind)?;
        check_name(key)?;

        let entry = new_entry(kind, key, data);
        let entry_path = self.entry_path(kind, key);
        if entry_path.exists() {
            return self.existing_or_conflict(&entry_path, entry);
        }

        self.write_object(&entry.hash, data)?;

        fs::create_dir_all(self.entry_dir(kind)).context("failed to create entry directory")?;
        let json = serde_json::to_vec_pretty(&entry).context("failed to serialize ledger entry")?;
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&entry_path)
        {
            Ok(mut file) => {
                file.write_all(&json).context("failed to write ledger entry")?;
                debug!(kind, key, hash = %entry.hash, size = entry.size, "record appended");
                Ok(entry)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                self.existing_or_conflict(&entry_path, entry)
            }
            Err(e) => Err(e).context("failed to create ledger entry"),
        }
    }

    fn read(&self, hash: &RecordHash) -> Result<Option<Vec<u8>>> {
        let path = self.object_path(hash);
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read(&path).context("failed to read ledger object")?;
        Ok(Some(data))
    }

    fn lookup(&self, kind: &str, key: &str) -> Result<Option<LedgerEntry>> {
        check_name(kind)?;
        check_name(key)?;
        let path = self.entry_path(kind, key);
        if !path.exists() {
            return Ok(None);
        }
        Self::read_entry(&path).map(Some)
    }

    fn entries(&self, kind: &str) -> Result<Vec<LedgerEntry>> {
        check_name(kind)?;
        let dir = self.entry_dir(kind);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for item in fs::read_dir(&dir).context("failed to list ledger entries")? {
            let path = item.context("failed to read ledger directory entry")?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                entries.push(Self::read_entry(&path)?);
            }
        }
        sort_entries(&mut entries);
        Ok(entries)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    objects: HashMap<RecordHash, Vec<u8>>,
    entries: BTreeMap<(String, String), LedgerEntry>,
}

/// In-memory ledger, same semantics as [`FileLedger`].
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: RwLock<MemoryState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryLedger {
    fn append(&self, kind: &str, key: &str, data: &[u8]) -> Result<LedgerEntry> {
        check_name(kind)?;
        check_name(key)?;
        let entry = new_entry(kind, key, data);

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let slot = (kind.to_string(), key.to_string());
        if let Some(existing) = state.entries.get(&slot) {
            if existing.hash == entry.hash {
                return Ok(existing.clone());
            }
            return Err(LedgerError::AlreadyRecorded {
                kind: entry.kind,
                key: entry.key,
                existing: existing.hash.clone(),
            }
            .into());
        }

        state
            .objects
            .entry(entry.hash.clone())
            .or_insert_with(|| data.to_vec());
        state.entries.insert(slot, entry.clone());
        Ok(entry)
    }

    fn read(&self, hash: &RecordHash) -> Result<Option<Vec<u8>>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state.objects.get(hash).cloned())
    }

    fn lookup(&self, kind: &str, key: &str) -> Result<Option<LedgerEntry>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state
            .entries
            .get(&(kind.to_string(), key.to_string()))
            .cloned())
    }

    fn entries(&self, kind: &str) -> Result<Vec<LedgerEntry>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let mut entries: Vec<LedgerEntry> = state
            .entries
            .values()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect();
        sort_entries(&mut entries);
        Ok(entries)
    }
}
