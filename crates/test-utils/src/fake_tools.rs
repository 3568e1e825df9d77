//! In-process stand-in for the aligner and the alignment toolbox.
//!
//! Alignment files are plain text:
//!
//! ```text
//! #fake-bam
//! geneA	0	100
//! geneA	50	100
//! *
//! ```
//!
//! Every line after the header is one read: `reference\tstart\tlength`, or
//! `*` for a read that did not align. Raw read files given to `align` use the
//! same body without the header.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use nanocas::coverage::{CoverageSource, DepthSummary, DepthTable, ReferenceStats, ReferenceTable};
use nanocas::errors::{NanocasError, Result};
use nanocas::exec::{AlignmentToolkit, ToolFailure, ToolResult};

pub const ALIGNMENT_HEADER: &str = "#fake-bam";
pub const STORE_INDEX_HEADER: &str = "#fake-bai";
pub const REFERENCE_INDEX_HEADER: &str = "#fake-mmi";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolOp {
    Align,
    Quickcheck,
    Merge,
    Sort,
    Index,
    BuildIndex,
}

impl ToolOp {
    fn tool_name(self) -> &'static str {
        match self {
            ToolOp::Align => "minimap2",
            ToolOp::BuildIndex => "minimap2 -d",
            ToolOp::Quickcheck => "samtools quickcheck",
            ToolOp::Merge => "samtools merge",
            ToolOp::Sort => "samtools sort",
            ToolOp::Index => "samtools index",
        }
    }
}

#[derive(Debug, Default)]
struct FakeState {
    calls: HashMap<ToolOp, usize>,
    /// Remaining injected failures per operation.
    failures: HashMap<ToolOp, usize>,
}

/// Fake toolkit implementing both [`AlignmentToolkit`] and
/// [`CoverageSource`] over the text format above.
#[derive(Debug, Clone, Default)]
pub struct FakeToolkit {
    references: Vec<(String, u64)>,
    build_delay: Option<Duration>,
    merge_delay: Option<Duration>,
    state: Arc<Mutex<FakeState>>,
}

/// Contents of an alignment file holding `reads`.
pub fn fake_alignment(reads: &[&str]) -> String {
    let mut out = String::from(ALIGNMENT_HEADER);
    out.push('\n');
    for read in reads {
        out.push_str(read);
        out.push('\n');
    }
    out
}

impl FakeToolkit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a reference in the store header, in order.
    pub fn with_reference(mut self, name: &str, length: u64) -> Self {
        self.references.push((name.to_string(), length));
        self
    }

    /// Make `build_index` take this long before finishing.
    pub fn with_build_delay(mut self, delay: Duration) -> Self {
        self.build_delay = Some(delay);
        self
    }

    /// Make `merge` take this long before writing its output.
    pub fn with_merge_delay(mut self, delay: Duration) -> Self {
        self.merge_delay = Some(delay);
        self
    }

    /// Make the next `times` calls of `op` fail with exit code 1.
    pub fn fail(&self, op: ToolOp, times: usize) {
        self.state.lock().unwrap().failures.insert(op, times);
    }

    /// Make every call of `op` fail.
    pub fn fail_always(&self, op: ToolOp) {
        self.fail(op, usize::MAX);
    }

    pub fn calls(&self, op: ToolOp) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .get(&op)
            .copied()
            .unwrap_or(0)
    }

    fn enter(&self, op: ToolOp) -> ToolResult {
        let mut state = self.state.lock().unwrap();
        *state.calls.entry(op).or_insert(0) += 1;
        match state.failures.get_mut(&op) {
            Some(remaining) if *remaining > 0 => {
                if *remaining != usize::MAX {
                    *remaining -= 1;
                }
                Err(ToolFailure {
                    tool: op.tool_name().to_string(),
                    code: Some(1),
                    stderr: "injected failure".to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    fn io_failure(op: ToolOp, err: impl std::fmt::Display) -> ToolFailure {
        ToolFailure {
            tool: op.tool_name().to_string(),
            code: Some(1),
            stderr: err.to_string(),
        }
    }

    /// Read lines of an alignment file, `None` when it is not one.
    fn read_alignment(path: &Path) -> Option<Vec<String>> {
        let text = fs::read_to_string(path).ok()?;
        let mut lines = text.lines();
        if lines.next()? != ALIGNMENT_HEADER {
            return None;
        }
        let reads: Vec<String> = lines
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect();
        reads.iter().all(|r| parse_read(r).is_some()).then_some(reads)
    }

    fn write_alignment(path: &Path, reads: &[String]) -> std::io::Result<()> {
        let refs: Vec<&str> = reads.iter().map(String::as_str).collect();
        fs::write(path, fake_alignment(&refs))
    }

    fn load_store(path: &Path) -> Result<Vec<String>> {
        Self::read_alignment(path).ok_or_else(|| {
            NanocasError::Other(anyhow::anyhow!("{path:?} is not a fake alignment"))
        })
    }
}

/// `Some(None)` for an unaligned read, `Some(Some(..))` for an aligned one.
fn parse_read(line: &str) -> Option<Option<(String, u64, u64)>> {
    let line = line.trim();
    if line == "*" {
        return Some(None);
    }
    let mut cols = line.split('\t');
    let name = cols.next()?.to_string();
    let start = cols.next()?.parse().ok()?;
    let len = cols.next()?.parse().ok()?;
    Some(Some((name, start, len)))
}

#[async_trait]
impl AlignmentToolkit for FakeToolkit {
    async fn align(&self, index: &Path, reads: &Path, output: &Path) -> ToolResult {
        self.enter(ToolOp::Align)?;
        if !index.is_file() {
            return Err(Self::io_failure(ToolOp::Align, format!("missing index {index:?}")));
        }
        let text = fs::read_to_string(reads).map_err(|e| Self::io_failure(ToolOp::Align, e))?;
        let body: Vec<String> = text
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect();
        Self::write_alignment(output, &body).map_err(|e| Self::io_failure(ToolOp::Align, e))
    }

    async fn quickcheck(&self, artifact: &Path) -> ToolResult<bool> {
        self.enter(ToolOp::Quickcheck)?;
        Ok(Self::read_alignment(artifact).is_some())
    }

    async fn merge(&self, inputs: &[PathBuf], output: &Path) -> ToolResult {
        self.enter(ToolOp::Merge)?;
        if let Some(delay) = self.merge_delay {
            tokio::time::sleep(delay).await;
        }
        let mut reads = Vec::new();
        for input in inputs {
            let more = Self::read_alignment(input)
                .ok_or_else(|| Self::io_failure(ToolOp::Merge, format!("bad input {input:?}")))?;
            reads.extend(more);
        }
        Self::write_alignment(output, &reads).map_err(|e| Self::io_failure(ToolOp::Merge, e))
    }

    async fn sort(&self, input: &Path, output: &Path) -> ToolResult {
        self.enter(ToolOp::Sort)?;
        let mut reads = Self::read_alignment(input)
            .ok_or_else(|| Self::io_failure(ToolOp::Sort, format!("bad input {input:?}")))?;
        reads.sort();
        Self::write_alignment(output, &reads).map_err(|e| Self::io_failure(ToolOp::Sort, e))
    }

    async fn index(&self, store: &Path, output: &Path) -> ToolResult {
        self.enter(ToolOp::Index)?;
        let reads = Self::read_alignment(store)
            .ok_or_else(|| Self::io_failure(ToolOp::Index, format!("bad input {store:?}")))?;
        fs::write(output, format!("{STORE_INDEX_HEADER}\n{}\n", reads.len()))
            .map_err(|e| Self::io_failure(ToolOp::Index, e))
    }

    async fn build_index(&self, sequences: &Path, output: &Path, log: &Path) -> ToolResult {
        self.enter(ToolOp::BuildIndex)?;
        if let Some(delay) = self.build_delay {
            tokio::time::sleep(delay).await;
        }
        let text =
            fs::read_to_string(sequences).map_err(|e| Self::io_failure(ToolOp::BuildIndex, e))?;
        fs::write(log, "[fake] building index\n")
            .map_err(|e| Self::io_failure(ToolOp::BuildIndex, e))?;
        fs::write(output, format!("{REFERENCE_INDEX_HEADER}\n{text}"))
            .map_err(|e| Self::io_failure(ToolOp::BuildIndex, e))
    }
}

#[async_trait]
impl CoverageSource for FakeToolkit {
    async fn reference_stats(&self, store: &Path) -> Result<ReferenceTable> {
        let reads = Self::load_store(store)?;
        let mut table = ReferenceTable {
            references: self
                .references
                .iter()
                .map(|(name, length)| ReferenceStats {
                    name: name.clone(),
                    length: *length,
                    mapped: 0,
                })
                .collect(),
            unmapped: 0,
        };
        for read in &reads {
            match parse_read(read).flatten() {
                Some((name, _, _)) => {
                    if let Some(r) = table.references.iter_mut().find(|r| r.name == name) {
                        r.mapped += 1;
                    }
                }
                None => table.unmapped += 1,
            }
        }
        Ok(table)
    }

    async fn depth_table(&self, store: &Path) -> Result<DepthTable> {
        let reads = Self::load_store(store)?;
        let mut depth: HashMap<&str, Vec<u64>> = self
            .references
            .iter()
            .map(|(name, length)| (name.as_str(), vec![0; *length as usize]))
            .collect();

        for (name, start, len) in reads.iter().filter_map(|r| parse_read(r).flatten()) {
            if let Some(positions) = depth.get_mut(name.as_str()) {
                let end = (start + len).min(positions.len() as u64);
                for pos in start..end {
                    positions[pos as usize] += 1;
                }
            }
        }

        let mut table = DepthTable::default();
        for (name, positions) in depth {
            table.summaries.insert(
                name.to_string(),
                DepthSummary {
                    total_depth: positions.iter().sum(),
                    covered_positions: positions.iter().filter(|d| **d > 0).count() as u64,
                },
            );
        }
        Ok(table)
    }
}
