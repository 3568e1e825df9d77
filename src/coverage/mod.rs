// src/coverage/mod.rs

//! Coverage computation over the cumulative store.
//!
//! A coverage pass produces one [`CoverageRecord`] per reference in the
//! store's header, plus a final `unmapped` row carrying the number of reads
//! that did not align to any reference.

pub mod log;
pub mod source;

use std::path::Path;

use serde::Serialize;
use tracing::warn;

use crate::errors::{NanocasError, Result};

pub use log::{COVERAGE_HEADER, CoverageLog};
pub use source::{CoverageSource, DepthSummary, DepthTable, ReferenceStats, ReferenceTable};

/// Reference name of the pseudo-row counting unaligned reads.
pub const UNMAPPED_REFERENCE: &str = "unmapped";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageRecord {
    pub timestamp: String,
    pub reference: String,
    /// Mean depth (x).
    pub depth: f64,
    /// Percentage of positions with depth > 0.
    pub breadth: f64,
    pub read_count: u64,
}

/// `(depth, breadth)` of a reference of `length` positions.
///
/// A zero-length reference reports zero for both.
pub fn reference_metrics(length: u64, summary: DepthSummary) -> (f64, f64) {
    if length == 0 {
        return (0.0, 0.0);
    }
    let len = length as f64;
    (
        summary.total_depth as f64 / len,
        summary.covered_positions as f64 / len * 100.0,
    )
}

/// Compute coverage records for the store at `store`.
///
/// The store must have a positional index at `store_index`. References whose
/// depth could not be read are skipped; failing to list references at all
/// aborts the pass.
pub async fn compute_pass(
    source: &dyn CoverageSource,
    store: &Path,
    store_index: &Path,
    timestamp: &str,
) -> Result<Vec<CoverageRecord>> {
    if !store_index.is_file() {
        return Err(NanocasError::ArtifactValidation(store_index.to_path_buf()));
    }

    let table = source.reference_stats(store).await?;
    let depths = source.depth_table(store).await?;

    let mut records = Vec::with_capacity(table.references.len() + 1);
    for reference in &table.references {
        if let Some(reason) = depths.faulted.get(&reference.name) {
            warn!(reference = %reference.name, %reason, "skipping reference in coverage pass");
            continue;
        }
        let summary = depths
            .summaries
            .get(&reference.name)
            .copied()
            .unwrap_or_default();
        let (depth, breadth) = reference_metrics(reference.length, summary);
        records.push(CoverageRecord {
            timestamp: timestamp.to_string(),
            reference: reference.name.clone(),
            depth,
            breadth,
            read_count: reference.mapped,
        });
    }

    records.push(CoverageRecord {
        timestamp: timestamp.to_string(),
        reference: UNMAPPED_REFERENCE.to_string(),
        depth: 0.0,
        breadth: 0.0,
        read_count: table.unmapped,
    });

    Ok(records)
}
