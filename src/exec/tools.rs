// src/exec/tools.rs

//! The external aligner and alignment toolbox behind narrow traits.
//!
//! [`AlignmentToolkit`] covers everything the ingestion pipeline and the
//! database build job need to run; [`CoverageSource`] covers reading
//! statistics back out of the store. [`ExternalToolkit`] implements both by
//! shelling out to `minimap2` and `samtools`. Tests substitute fakes.

use std::fmt::Debug;
use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::warn;

use crate::config::model::ToolsSection;
use crate::coverage::source::{CoverageSource, DepthTable, ReferenceTable};
use crate::errors::{NanocasError, Result};
use crate::exec::command::{ToolCommand, ToolResult, run_tool, stream_tool};

#[async_trait]
pub trait AlignmentToolkit: Send + Sync + Debug {
    /// Align `reads` against `index` and write a coordinate-sorted binary
    /// alignment to `output`.
    async fn align(&self, index: &Path, reads: &Path, output: &Path) -> ToolResult;

    /// Structural check of an alignment file. `Ok(false)` means the file is
    /// not a valid alignment; `Err` means the check itself could not run.
    async fn quickcheck(&self, artifact: &Path) -> ToolResult<bool>;

    /// Merge `inputs` into a single alignment file at `output`.
    async fn merge(&self, inputs: &[PathBuf], output: &Path) -> ToolResult;

    /// Coordinate-sort `input` into `output`.
    async fn sort(&self, input: &Path, output: &Path) -> ToolResult;

    /// Build the positional index of `store` at `output`.
    async fn index(&self, store: &Path, output: &Path) -> ToolResult;

    /// Build a reference index from a sequence file. Tool output goes to `log`.
    async fn build_index(&self, sequences: &Path, output: &Path, log: &Path) -> ToolResult;
}

/// Toolkit backed by the `minimap2` and `samtools` executables.
#[derive(Debug, Clone)]
pub struct ExternalToolkit {
    minimap2: String,
    samtools: String,
    preset: String,
}

impl ExternalToolkit {
    pub fn new(tools: &ToolsSection) -> Self {
        Self {
            minimap2: tools.minimap2.clone(),
            samtools: tools.samtools.clone(),
            preset: tools.preset.clone(),
        }
    }

    fn samtools(&self, sub: &str) -> ToolCommand {
        ToolCommand::new(&self.samtools).arg(sub)
    }
}

#[async_trait]
impl AlignmentToolkit for ExternalToolkit {
    async fn align(&self, index: &Path, reads: &Path, output: &Path) -> ToolResult {
        let sam = output.with_extension("sam");

        let aligned = run_tool(
            &ToolCommand::new(&self.minimap2)
                .arg("-a")
                .arg("-o")
                .arg(&sam)
                .arg(index)
                .arg(reads),
        )
        .await;

        let sorted = match aligned {
            Ok(()) => {
                run_tool(
                    &self
                        .samtools("sort")
                        .arg("-O")
                        .arg("bam")
                        .arg("-o")
                        .arg(output)
                        .arg(&sam),
                )
                .await
            }
            Err(f) => Err(f),
        };

        if let Err(e) = fs::remove_file(&sam)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = ?sam, error = %e, "failed to remove intermediate alignment");
        }
        sorted
    }

    async fn quickcheck(&self, artifact: &Path) -> ToolResult<bool> {
        match run_tool(&self.samtools("quickcheck").arg(artifact)).await {
            Ok(()) => Ok(true),
            Err(f) if f.code.is_some() => Ok(false),
            Err(f) => Err(f),
        }
    }

    async fn merge(&self, inputs: &[PathBuf], output: &Path) -> ToolResult {
        let mut cmd = self.samtools("merge").arg("-f").arg(output);
        for input in inputs {
            cmd = cmd.arg(input);
        }
        run_tool(&cmd).await
    }

    async fn sort(&self, input: &Path, output: &Path) -> ToolResult {
        run_tool(
            &self
                .samtools("sort")
                .arg("-O")
                .arg("bam")
                .arg("-o")
                .arg(output)
                .arg(input),
        )
        .await
    }

    async fn index(&self, store: &Path, output: &Path) -> ToolResult {
        run_tool(&self.samtools("index").arg(store).arg(output)).await
    }

    async fn build_index(&self, sequences: &Path, output: &Path, log: &Path) -> ToolResult {
        run_tool(
            &ToolCommand::new(&self.minimap2)
                .arg("-x")
                .arg(&self.preset)
                .arg("-d")
                .arg(output)
                .arg(sequences)
                .log_to(log),
        )
        .await
    }
}

#[async_trait]
impl CoverageSource for ExternalToolkit {
    async fn reference_stats(&self, store: &Path) -> Result<ReferenceTable> {
        let mut table = ReferenceTable::default();
        let mut parse_error: Option<String> = None;
        stream_tool(&self.samtools("idxstats").arg(store), &mut |line: &str| {
            if parse_error.is_none()
                && let Err(e) = table.ingest_line(line)
            {
                parse_error = Some(e);
            }
        })
        .await?;

        match parse_error {
            Some(e) => Err(NanocasError::Other(anyhow::anyhow!(
                "unreadable reference table for {}: {e}",
                store.display()
            ))),
            None => Ok(table),
        }
    }

    async fn depth_table(&self, store: &Path) -> Result<DepthTable> {
        let mut table = DepthTable::default();
        stream_tool(&self.samtools("depth").arg("-a").arg(store), &mut |line: &str| {
            table.ingest_line(line)
        })
        .await?;
        Ok(table)
    }
}
