// src/fs/scratch.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

/// A file path owned by one unit of work.
///
/// The file (if any) is removed when the guard is dropped, unless it has been
/// moved into its final place with [`ScratchFile::persist`]. This keeps
/// failed or cancelled steps from leaving half-written artifacts behind.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
    armed: bool,
}

impl ScratchFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            armed: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rename the scratch file over `target` and disarm the guard.
    pub fn persist(mut self, target: &Path) -> std::io::Result<()> {
        fs::rename(&self.path, target)?;
        self.armed = false;
        Ok(())
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if self.armed && fs::remove_file(&self.path).is_ok() {
            debug!(path = ?self.path, "removed scratch file");
        }
    }
}
