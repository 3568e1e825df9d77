use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifier of a project as assigned by the external registry.
pub type ProjectId = String;

/// Kind of sequencing output a project ingests.
///
/// - `Fastq`: raw reads, aligned against the project index before merging.
/// - `Bam`: alignments produced upstream, validated and merged as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileKind {
    #[default]
    Fastq,
    Bam,
}

impl FileKind {
    /// File-name suffixes accepted for this kind.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            FileKind::Fastq => &[".fastq", ".fasta", ".fastq.gz", ".fq.gz"],
            FileKind::Bam => &[".bam"],
        }
    }

    /// True when arriving files must go through the aligner first.
    pub fn needs_alignment(self) -> bool {
        matches!(self, FileKind::Fastq)
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileKind::Fastq => write!(f, "FASTQ"),
            FileKind::Bam => write!(f, "BAM"),
        }
    }
}

impl FromStr for FileKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "FASTQ" => Ok(FileKind::Fastq),
            "BAM" => Ok(FileKind::Bam),
            other => Err(format!(
                "invalid fileType: {other} (expected \"FASTQ\" or \"BAM\")"
            )),
        }
    }
}

/// Severity attached to an outgoing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
}

impl Severity {
    /// Numeric level understood by sequencing-device message logs.
    pub fn level(self) -> u8 {
        match self {
            Severity::Info => 1,
            Severity::Warning => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_kind_parses_registry_spelling() {
        assert_eq!("FASTQ".parse::<FileKind>().unwrap(), FileKind::Fastq);
        assert_eq!(" bam ".parse::<FileKind>().unwrap(), FileKind::Bam);
        assert!("SAM".parse::<FileKind>().is_err());
    }

    #[test]
    fn file_kind_serde_uses_uppercase() {
        let kind: FileKind = serde_json::from_str("\"BAM\"").unwrap();
        assert_eq!(kind, FileKind::Bam);
        assert_eq!(serde_json::to_string(&FileKind::Fastq).unwrap(), "\"FASTQ\"");
    }
}
