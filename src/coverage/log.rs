// src/coverage/log.rs

//! Append-only coverage log (`coverage.csv`).

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::anyhow;

use crate::coverage::CoverageRecord;
use crate::errors::{NanocasError, Result};

pub const COVERAGE_HEADER: &str = "timestamp,reference,depth,breadth,read_count";

#[derive(Debug, Clone)]
pub struct CoverageLog {
    path: PathBuf,
}

impl CoverageLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Start a fresh log containing only the header line.
    pub fn initialize(&self) -> Result<()> {
        fs::write(&self.path, format!("{COVERAGE_HEADER}\n"))?;
        Ok(())
    }

    /// Append one coverage pass. The whole batch goes out in a single write
    /// so concurrent readers never see half a pass.
    pub fn append(&self, records: &[CoverageRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut batch = String::new();
        if !self.path.exists() {
            batch.push_str(COVERAGE_HEADER);
            batch.push('\n');
        }
        for record in records {
            batch.push_str(&format_record(record));
            batch.push('\n');
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(batch.as_bytes())?;
        Ok(())
    }

    /// Every record in the log, oldest first.
    pub fn read_all(&self) -> Result<Vec<CoverageRecord>> {
        let contents = fs::read_to_string(&self.path)?;
        split_rows(&contents)
            .into_iter()
            .filter(|l| !l.is_empty() && *l != COVERAGE_HEADER)
            .map(parse_record)
            .collect()
    }
}

fn format_record(r: &CoverageRecord) -> String {
    format!(
        "{},{},{},{},{}",
        escape_field(&r.timestamp),
        escape_field(&r.reference),
        r.depth,
        r.breadth,
        r.read_count
    )
}

fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Split the log into rows. A newline inside a quoted field belongs to the
/// field.
fn split_rows(contents: &str) -> Vec<&str> {
    let mut rows = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    for (i, c) in contents.char_indices() {
        match c {
            '"' => quoted = !quoted,
            '\n' if !quoted => {
                rows.push(contents[start..i].trim_end_matches('\r'));
                start = i + 1;
            }
            _ => {}
        }
    }
    if start < contents.len() {
        rows.push(&contents[start..]);
    }
    rows
}

fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, quoted) {
            ('"', true) if chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            ('"', _) => quoted = !quoted,
            (',', false) => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

fn parse_record(line: &str) -> Result<CoverageRecord> {
    let bad = |what: &str| NanocasError::Other(anyhow!("bad coverage line ({what}): {line:?}"));

    let fields = split_fields(line);
    let [timestamp, reference, depth, breadth, read_count] = fields.as_slice() else {
        return Err(bad("expected 5 fields"));
    };

    Ok(CoverageRecord {
        timestamp: timestamp.clone(),
        reference: reference.clone(),
        depth: depth.parse().map_err(|_| bad("depth"))?,
        breadth: breadth.parse().map_err(|_| bad("breadth"))?,
        read_count: read_count.parse().map_err(|_| bad("read_count"))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(reference: &str, depth: f64) -> CoverageRecord {
        CoverageRecord {
            timestamp: "2024-03-01 10:00:00".to_string(),
            reference: reference.to_string(),
            depth,
            breadth: 12.5,
            read_count: 3,
        }
    }

    #[test]
    fn initialize_writes_only_the_header() {
        let dir = tempfile::tempdir().unwrap();
        let log = CoverageLog::new(dir.path().join("coverage.csv"));
        log.initialize().unwrap();
        assert_eq!(
            fs::read_to_string(log.path()).unwrap(),
            "timestamp,reference,depth,breadth,read_count\n"
        );
        assert!(log.read_all().unwrap().is_empty());
    }

    #[test]
    fn appended_passes_read_back_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = CoverageLog::new(dir.path().join("coverage.csv"));
        log.initialize().unwrap();

        let first = vec![record("geneA", 0.1), record("unmapped", 0.0)];
        let second = vec![record("contig 7, partial \"x\"", 1.0 / 3.0)];
        log.append(&first).unwrap();
        log.append(&second).unwrap();

        let all = log.read_all().unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0], first[0]);
        assert_eq!(all[2], second[0]);
    }

    #[test]
    fn quoted_line_breaks_stay_inside_the_reference() {
        let dir = tempfile::tempdir().unwrap();
        let log = CoverageLog::new(dir.path().join("coverage.csv"));
        let odd = record("plasmid\r\nsegment 2", 4.0);
        log.append(&[odd.clone(), record("geneA", 1.0)]).unwrap();

        let all = log.read_all().unwrap();
        assert_eq!(all, vec![odd, record("geneA", 1.0)]);
    }

    #[test]
    fn append_without_initialize_adds_header() {
        let dir = tempfile::tempdir().unwrap();
        let log = CoverageLog::new(dir.path().join("coverage.csv"));
        log.append(&[record("geneA", 2.0)]).unwrap();
        let contents = fs::read_to_string(log.path()).unwrap();
        assert!(contents.starts_with(COVERAGE_HEADER));
        assert_eq!(contents.lines().count(), 2);
    }
}
