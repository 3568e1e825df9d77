// src/pipeline/mod.rs

//! Per-file ingestion: turn an arrived file into a validated alignment
//! artifact and fold it into the project's cumulative store.
//!
//! - [`artifact`] aligns raw reads (or takes an upstream alignment as-is) and
//!   validates the result.
//! - [`store`] merges a validated artifact into the store and rebuilds the
//!   store's positional index, swapping both into place only on success.

pub mod artifact;
pub mod store;

use std::path::PathBuf;

use crate::exec::ToolFailure;

pub use artifact::{Artifact, prepare_artifact};
pub use store::{CumulativeStore, StagedStore};

/// Result of one pipeline step that can fail in an expected way.
#[derive(Debug)]
pub enum StepOutcome<T> {
    Ready(T),
    /// An external tool could not run or exited non-zero.
    ToolFailed(ToolFailure),
    /// The file is not a valid alignment.
    Invalid(PathBuf),
}

/// Result of ingesting one arrived file.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// The file's contribution is in the store. `records` is the size of the
    /// coverage pass that followed (zero when the pass failed).
    Merged { records: usize, alerts: usize },
    ToolFailed(ToolFailure),
    Invalid(PathBuf),
}
