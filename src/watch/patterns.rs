// src/watch/patterns.rs

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::types::FileKind;

/// Compiled file-name patterns deciding which arrivals a project ingests.
///
/// Only the final path component is matched, so `reads.fastq.gz` qualifies
/// for a FASTQ project wherever it lands in the source directory.
#[derive(Clone)]
pub struct ArrivalFilter {
    kind: FileKind,
    set: GlobSet,
}

impl fmt::Debug for ArrivalFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrivalFilter")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl ArrivalFilter {
    /// Filter accepting the extensions of `kind`.
    pub fn for_kind(kind: FileKind) -> Result<Self> {
        let patterns: Vec<String> = kind
            .extensions()
            .iter()
            .map(|ext| format!("*{ext}"))
            .collect();
        let set = build_globset(&patterns)
            .with_context(|| format!("building arrival globset for {kind}"))?;
        Ok(Self { kind, set })
    }

    pub fn kind(&self) -> FileKind {
        self.kind
    }

    pub fn matches(&self, path: &Path) -> bool {
        path.file_name().is_some_and(|name| self.set.is_match(name))
    }
}

/// Build a GlobSet from simple string patterns.
fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}
