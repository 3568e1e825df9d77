// src/pipeline/store.rs

use std::path::{Path, PathBuf};

use tracing::{error, info};

use crate::errors::Result;
use crate::exec::AlignmentToolkit;
use crate::fs::scratch::ScratchFile;
use crate::layout::ProjectLayout;
use crate::pipeline::StepOutcome;

/// The project's cumulative alignment store and its positional index.
///
/// Every rebuild happens in scratch files next to the store. The index is
/// moved into place first and the store last, so a failed rebuild leaves the
/// previous store untouched.
#[derive(Debug, Clone)]
pub struct CumulativeStore {
    path: PathBuf,
    index: PathBuf,
    merge_scratch: PathBuf,
    sort_scratch: PathBuf,
    index_scratch: PathBuf,
}

impl CumulativeStore {
    pub fn new(layout: &ProjectLayout) -> Self {
        Self {
            path: layout.store(),
            index: layout.store_index(),
            merge_scratch: layout.scratch("temp_merged.bam"),
            sort_scratch: layout.scratch("merged_sorted.bam"),
            index_scratch: layout.scratch("merged_sorted.bam.bai"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn index(&self) -> &Path {
        &self.index
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Rebuild the store with `artifact` folded in, leaving the result in
    /// scratch files. Nothing visible changes until the returned
    /// [`StagedStore`] is committed; dropping it discards the rebuild.
    ///
    /// Callers must serialize merges per project.
    pub async fn stage(
        &self,
        tools: &dyn AlignmentToolkit,
        artifact: &Path,
    ) -> Result<StepOutcome<StagedStore>> {
        let sorted = ScratchFile::new(&self.sort_scratch);
        let sorted_index = ScratchFile::new(&self.index_scratch);

        let rebuilt = if self.exists() {
            let merged = ScratchFile::new(&self.merge_scratch);
            match tools
                .merge(&[self.path.clone(), artifact.to_path_buf()], merged.path())
                .await
            {
                Ok(()) => tools.sort(merged.path(), sorted.path()).await,
                Err(f) => Err(f),
            }
        } else {
            info!(store = ?self.path, "creating cumulative store");
            tools.sort(artifact, sorted.path()).await
        };

        let indexed = match rebuilt {
            Ok(()) => tools.index(sorted.path(), sorted_index.path()).await,
            Err(f) => Err(f),
        };
        if let Err(failure) = indexed {
            error!(store = ?self.path, %failure, "store rebuild failed; previous store kept");
            return Ok(StepOutcome::ToolFailed(failure));
        }

        Ok(StepOutcome::Ready(StagedStore {
            sorted,
            sorted_index,
            path: self.path.clone(),
            index: self.index.clone(),
        }))
    }

    /// Rebuild the index of the current store after a commit that moved the
    /// new index into place but not the new store.
    pub async fn restore_index(&self, tools: &dyn AlignmentToolkit) {
        if !self.exists() {
            return;
        }
        if let Err(failure) = tools.index(&self.path, &self.index).await {
            error!(store = ?self.path, %failure, "failed to restore store index");
        }
    }
}

/// A rebuilt store waiting in scratch files.
#[derive(Debug)]
pub struct StagedStore {
    sorted: ScratchFile,
    sorted_index: ScratchFile,
    path: PathBuf,
    index: PathBuf,
}

impl StagedStore {
    /// Move the rebuilt index and then the store into place.
    ///
    /// Synchronous, so a cancelled task either commits both renames or none.
    /// On error the index may already be the new one; see
    /// [`CumulativeStore::restore_index`].
    pub fn commit(self) -> std::io::Result<()> {
        self.sorted_index.persist(&self.index)?;
        if let Err(e) = self.sorted.persist(&self.path) {
            error!(store = ?self.path, error = %e, "failed to swap in rebuilt store");
            return Err(e);
        }
        Ok(())
    }
}
