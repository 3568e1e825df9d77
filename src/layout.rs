// src/layout.rs

//! On-disk layout of a project directory.
//!
//! ```text
//! <projects_root>/<project_id>/
//!   alertinfo.cfg          project configuration (JSON)
//!   database/<base>.mmi    reference index (exactly one)
//!   database/<base>.fa     combined query sequences
//!   merged.bam(.bai)       cumulative store + positional index
//!   coverage.csv           coverage log
//!   processed_files.txt    processed-file ledger
//!   minimap2/runs/         per-file alignment scratch space
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{NanocasError, Result};

/// File extension of a published reference index.
pub const INDEX_EXTENSION: &str = "mmi";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    root: PathBuf,
}

impl ProjectLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Layout of `project_id` below the configured projects root.
    pub fn for_project(projects_root: &Path, project_id: &str) -> Self {
        Self::new(projects_root.join(project_id))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn alert_config(&self) -> PathBuf {
        self.root.join("alertinfo.cfg")
    }

    pub fn database_dir(&self) -> PathBuf {
        self.root.join("database")
    }

    pub fn store(&self) -> PathBuf {
        self.root.join("merged.bam")
    }

    pub fn store_index(&self) -> PathBuf {
        self.root.join("merged.bam.bai")
    }

    pub fn coverage_log(&self) -> PathBuf {
        self.root.join("coverage.csv")
    }

    pub fn ledger(&self) -> PathBuf {
        self.root.join("processed_files.txt")
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.root.join("minimap2").join("runs")
    }

    /// Scratch path in the project root used while rebuilding the store.
    pub fn scratch(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// All published index artifacts in the database directory.
    pub fn index_candidates(&self) -> Result<Vec<PathBuf>> {
        let dir = self.database_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_file() && is_published_index(&path) {
                found.push(path);
            }
        }
        found.sort();
        Ok(found)
    }

    /// The single reference index the pipeline aligns against.
    ///
    /// Zero or several candidates is a configuration error.
    pub fn select_index(&self) -> Result<PathBuf> {
        let mut candidates = self.index_candidates()?;
        match candidates.len() {
            1 => Ok(candidates.remove(0)),
            0 => Err(NanocasError::config(format!(
                "no .{INDEX_EXTENSION} index found in {}",
                self.database_dir().display()
            ))),
            n => Err(NanocasError::config(format!(
                "{n} .{INDEX_EXTENSION} indexes found in {}; expected exactly one",
                self.database_dir().display()
            ))),
        }
    }
}

fn is_published_index(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'));
    !hidden && path.extension().and_then(|e| e.to_str()) == Some(INDEX_EXTENSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_index_requires_exactly_one() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ProjectLayout::new(dir.path());

        assert!(matches!(layout.select_index(), Err(NanocasError::ConfigError(_))));

        fs::create_dir_all(layout.database_dir()).unwrap();
        fs::write(layout.database_dir().join("20240101000000.mmi"), b"idx").unwrap();
        fs::write(layout.database_dir().join(".20240102000000.mmi"), b"tmp").unwrap();
        fs::write(layout.database_dir().join("20240101000000.fa"), b">a\nACGT\n").unwrap();
        assert_eq!(
            layout.select_index().unwrap(),
            layout.database_dir().join("20240101000000.mmi")
        );

        fs::write(layout.database_dir().join("20240103000000.mmi"), b"idx").unwrap();
        match layout.select_index() {
            Err(NanocasError::ConfigError(msg)) => assert!(msg.contains("expected exactly one")),
            other => panic!("expected ConfigError, got {other:?}"),
        }
    }
}
