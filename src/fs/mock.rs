// src/fs/mock.rs

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use anyhow::{Result, anyhow};

use super::FileSystem;

/// A file whose observed size follows a script.
///
/// Each `file_size` call consumes the next sample; the last sample repeats
/// forever. A `None` sample means the file is gone at that point.
#[derive(Debug, Clone)]
struct MockFile {
    samples: VecDeque<Option<u64>>,
    modified: SystemTime,
}

impl MockFile {
    fn next_sample(&mut self) -> Option<u64> {
        if self.samples.len() > 1 {
            self.samples.pop_front().flatten()
        } else {
            self.samples.front().copied().flatten()
        }
    }

    fn current(&self) -> Option<u64> {
        self.samples.front().copied().flatten()
    }
}

/// In-memory filesystem used to drive the stability gate and directory
/// scans deterministically in tests.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, MockFile>>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file with a fixed size.
    pub fn add_file(&self, path: impl AsRef<Path>, size: u64) {
        self.script_sizes(path, vec![Some(size)]);
    }

    /// Add a file whose size changes from one sample to the next.
    pub fn script_sizes(&self, path: impl AsRef<Path>, samples: Vec<Option<u64>>) {
        let mut files = self.files.lock().unwrap();
        let modified = SystemTime::UNIX_EPOCH + Duration::from_secs(files.len() as u64);
        files.insert(
            path.as_ref().to_path_buf(),
            MockFile {
                samples: samples.into(),
                modified,
            },
        );
    }

    pub fn set_modified(&self, path: impl AsRef<Path>, modified: SystemTime) {
        if let Some(file) = self.files.lock().unwrap().get_mut(path.as_ref()) {
            file.modified = modified;
        }
    }

    pub fn remove(&self, path: impl AsRef<Path>) {
        self.files.lock().unwrap().remove(path.as_ref());
    }
}

impl FileSystem for MockFileSystem {
    fn file_size(&self, path: &Path) -> Result<Option<u64>> {
        let mut files = self.files.lock().unwrap();
        Ok(files.get_mut(path).and_then(MockFile::next_sample))
    }

    fn is_file(&self, path: &Path) -> bool {
        let files = self.files.lock().unwrap();
        files.get(path).and_then(MockFile::current).is_some()
    }

    fn modified(&self, path: &Path) -> Result<SystemTime> {
        let files = self.files.lock().unwrap();
        files
            .get(path)
            .map(|f| f.modified)
            .ok_or_else(|| anyhow!("File not found: {:?}", path))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let files = self.files.lock().unwrap();
        Ok(files
            .keys()
            .filter(|p| p.parent() == Some(path))
            .cloned()
            .collect())
    }
}
