// src/coverage/source.rs

//! Raw per-reference statistics read from the cumulative store.

use std::collections::HashMap;
use std::fmt::Debug;
use std::path::Path;

use async_trait::async_trait;

use crate::errors::Result;

/// One row of the store's reference table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceStats {
    pub name: String,
    pub length: u64,
    pub mapped: u64,
}

/// Reference table of the store, in header order, plus the number of reads
/// not assigned to any reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceTable {
    pub references: Vec<ReferenceStats>,
    pub unmapped: u64,
}

impl ReferenceTable {
    /// Fold one `name\tlength\tmapped\tunmapped` line into the table.
    ///
    /// The `*` pseudo-reference only contributes to the unmapped count.
    pub fn ingest_line(&mut self, line: &str) -> std::result::Result<(), String> {
        let line = line.trim_end();
        if line.is_empty() {
            return Ok(());
        }
        let cols: Vec<&str> = line.split('\t').collect();
        if cols.len() < 4 {
            return Err(format!("expected 4 columns, got {}: {line:?}", cols.len()));
        }
        let parse = |s: &str, what: &str| {
            s.trim()
                .parse::<u64>()
                .map_err(|e| format!("bad {what} {s:?}: {e}"))
        };
        let length = parse(cols[1], "length")?;
        let mapped = parse(cols[2], "mapped count")?;
        let unmapped = parse(cols[3], "unmapped count")?;

        self.unmapped += unmapped;
        if cols[0] != "*" {
            self.references.push(ReferenceStats {
                name: cols[0].to_string(),
                length,
                mapped,
            });
        }
        Ok(())
    }
}

/// Per-position depth folded into totals for one reference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DepthSummary {
    pub total_depth: u64,
    pub covered_positions: u64,
}

/// Depth totals for every reference seen in the store.
///
/// References whose depth stream could not be interpreted end up in
/// `faulted` and are left out of the coverage pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DepthTable {
    pub summaries: HashMap<String, DepthSummary>,
    pub faulted: HashMap<String, String>,
}

impl DepthTable {
    /// Fold one `reference\tposition\tdepth` line into the table.
    pub fn ingest_line(&mut self, line: &str) {
        let line = line.trim_end();
        if line.is_empty() {
            return;
        }
        let mut cols = line.split('\t');
        let (Some(reference), Some(_pos), Some(depth)) = (cols.next(), cols.next(), cols.next())
        else {
            self.faulted
                .entry(line.split('\t').next().unwrap_or_default().to_string())
                .or_insert_with(|| format!("malformed depth line {line:?}"));
            return;
        };

        if self.faulted.contains_key(reference) {
            return;
        }
        match depth.trim().parse::<u64>() {
            Ok(depth) => {
                let summary = self.summaries.entry(reference.to_string()).or_default();
                summary.total_depth += depth;
                if depth > 0 {
                    summary.covered_positions += 1;
                }
            }
            Err(e) => {
                self.summaries.remove(reference);
                self.faulted
                    .insert(reference.to_string(), format!("bad depth {depth:?}: {e}"));
            }
        }
    }
}

/// Source of reference statistics for a positionally indexed store.
#[async_trait]
pub trait CoverageSource: Send + Sync + Debug {
    async fn reference_stats(&self, store: &Path) -> Result<ReferenceTable>;

    /// Depth at every position of every reference, zero-depth positions
    /// included, folded per reference.
    async fn depth_table(&self, store: &Path) -> Result<DepthTable>;
}
