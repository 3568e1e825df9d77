// src/watch/ledger.rs

//! Record of source files already merged into a project's store.
//!
//! The on-disk form (`processed_files.txt`) holds one absolute path per
//! line. Entries are only ever appended, and an entry is written before it
//! becomes visible in memory, so a restart never re-ingests a file whose
//! contribution already reached the store.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::errors::Result;

/// Abstract storage for ledger entries.
pub trait LedgerStore: Send + Sync + std::fmt::Debug {
    fn load(&self) -> Result<Vec<PathBuf>>;
    fn append(&mut self, path: &Path) -> Result<()>;
}

/// Stores entries in a newline-separated text file.
#[derive(Debug)]
pub struct FileLedgerStore {
    path: PathBuf,
}

impl FileLedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl LedgerStore for FileLedgerStore {
    fn load(&self) -> Result<Vec<PathBuf>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(contents
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(PathBuf::from)
            .collect())
    }

    fn append(&mut self, path: &Path) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(format!("{}\n", path.display()).as_bytes())?;
        file.sync_data()?;
        Ok(())
    }
}

/// Stores entries in memory only.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    entries: Vec<PathBuf>,
}

impl LedgerStore for MemoryLedgerStore {
    fn load(&self) -> Result<Vec<PathBuf>> {
        Ok(self.entries.clone())
    }

    fn append(&mut self, path: &Path) -> Result<()> {
        self.entries.push(path.to_path_buf());
        Ok(())
    }
}

/// Processed set plus the files currently being worked on.
///
/// A path is *claimed* for the duration of its ingestion so that duplicate
/// filesystem events for the same file do not start a second unit of work.
#[derive(Debug)]
pub struct ProcessedLedger {
    entries: HashSet<PathBuf>,
    in_flight: HashSet<PathBuf>,
    store: Box<dyn LedgerStore>,
}

impl ProcessedLedger {
    pub fn open(store: Box<dyn LedgerStore>) -> Result<Self> {
        let entries: HashSet<PathBuf> = store.load()?.into_iter().collect();
        info!(entries = entries.len(), "loaded processed-file ledger");
        Ok(Self {
            entries,
            in_flight: HashSet::new(),
            store,
        })
    }

    pub fn in_memory() -> Self {
        Self {
            entries: HashSet::new(),
            in_flight: HashSet::new(),
            store: Box::new(MemoryLedgerStore::default()),
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains(path)
    }

    /// Claim `path` for ingestion. Returns `false` when it is already
    /// processed or already being worked on.
    pub fn try_claim(&mut self, path: &Path) -> bool {
        if self.entries.contains(path) || self.in_flight.contains(path) {
            return false;
        }
        self.in_flight.insert(path.to_path_buf());
        true
    }

    /// Give up a claim without recording the file, so a later event can
    /// retry it.
    pub fn release(&mut self, path: &Path) {
        self.in_flight.remove(path);
    }

    /// Record `path` as processed.
    ///
    /// On a persistence failure the claim is kept, so the file is not
    /// ingested a second time during this session.
    pub fn complete(&mut self, path: &Path) -> Result<()> {
        self.store.append(path)?;
        self.entries.insert(path.to_path_buf());
        self.in_flight.remove(path);
        debug!(?path, "recorded processed file");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claims_are_exclusive_until_released_or_completed() {
        let mut ledger = ProcessedLedger::in_memory();
        let path = Path::new("/run/reads_1.fastq");

        assert!(ledger.try_claim(path));
        assert!(!ledger.try_claim(path));

        ledger.release(path);
        assert!(ledger.try_claim(path));

        ledger.complete(path).unwrap();
        assert!(ledger.contains(path));
        assert!(!ledger.try_claim(path));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn file_ledger_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("processed_files.txt");

        let mut ledger = ProcessedLedger::open(Box::new(FileLedgerStore::new(&file))).unwrap();
        for name in ["a.fastq", "b.fastq"] {
            let path = dir.path().join(name);
            assert!(ledger.try_claim(&path));
            ledger.complete(&path).unwrap();
        }

        let reopened = ProcessedLedger::open(Box::new(FileLedgerStore::new(&file))).unwrap();
        assert_eq!(reopened.len(), 2);
        assert!(reopened.contains(&dir.path().join("a.fastq")));
        assert!(!reopened.contains(&dir.path().join("c.fastq")));
    }
}
