// src/pipeline/artifact.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::errors::Result;
use crate::exec::AlignmentToolkit;
use crate::fs::scratch::ScratchFile;
use crate::layout::ProjectLayout;
use crate::pipeline::StepOutcome;
use crate::types::FileKind;

/// A validated alignment ready to be merged.
///
/// Artifacts produced by the aligner are scratch files and are removed when
/// the artifact is dropped; upstream alignments are left where they are.
#[derive(Debug)]
pub struct Artifact {
    path: PathBuf,
    scratch_guard: Option<ScratchFile>,
}

impl Artifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_scratch(&self) -> bool {
        self.scratch_guard.is_some()
    }
}

/// Name of the aligner output for `source` inside the runs directory.
pub fn aligned_name(source: &Path) -> String {
    let stem = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "reads".to_string());
    format!("{stem}_sorted.bam")
}

/// Produce a validated alignment artifact for `source`.
///
/// Raw reads are aligned against the project's single reference index; a
/// missing or ambiguous index is a configuration error. Upstream alignments
/// only go through validation.
pub async fn prepare_artifact(
    tools: &dyn AlignmentToolkit,
    layout: &ProjectLayout,
    kind: FileKind,
    source: &Path,
) -> Result<StepOutcome<Artifact>> {
    let artifact = if kind.needs_alignment() {
        let index = layout.select_index()?;
        let runs = layout.runs_dir();
        fs::create_dir_all(&runs)?;

        let scratch = ScratchFile::new(runs.join(aligned_name(source)));
        debug!(?source, ?index, output = ?scratch.path(), "aligning reads");
        if let Err(failure) = tools.align(&index, source, scratch.path()).await {
            warn!(?source, %failure, "alignment failed");
            return Ok(StepOutcome::ToolFailed(failure));
        }
        Artifact {
            path: scratch.path().to_path_buf(),
            scratch_guard: Some(scratch),
        }
    } else {
        Artifact {
            path: source.to_path_buf(),
            scratch_guard: None,
        }
    };

    match tools.quickcheck(artifact.path()).await {
        Ok(true) => Ok(StepOutcome::Ready(artifact)),
        Ok(false) => {
            warn!(path = ?artifact.path(), "alignment artifact failed validation");
            Ok(StepOutcome::Invalid(artifact.path().to_path_buf()))
        }
        Err(failure) => Ok(StepOutcome::ToolFailed(failure)),
    }
}
