// src/jobs/mod.rs

//! Asynchronous database build jobs.
//!
//! A job assembles the query sequences of a project into one combined input
//! file and builds the reference index the ingestion pipeline aligns
//! against. Jobs run on a small worker pool ([`queue`]) and report an ordered
//! stream of [`JobUpdate`]s ending in exactly one terminal state.

pub mod build;
pub mod queue;

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use uuid::Uuid;

use crate::errors::NanocasError;
use crate::types::ProjectId;

pub use build::run_build;
pub use queue::{JobHandle, JobQueue};

pub type JobId = Uuid;

/// A query sequence to include in the database.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuerySpec {
    pub name: String,
    pub file: PathBuf,
    pub threshold: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuildRequest {
    pub project_id: ProjectId,
    /// Sequencing device the project belongs to; may be empty.
    pub device: String,
    /// Directory the sequencing device writes its output to. Handed back in
    /// the result so the caller can start watching it.
    pub minion: PathBuf,
    pub queries: Vec<QuerySpec>,
    /// Project directory the database is built in.
    pub target_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildResult {
    pub minion: PathBuf,
    #[serde(rename = "nanocas_location")]
    pub location: PathBuf,
    pub device: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCode {
    IndexBuildFailed,
    IoError,
    ConfigError,
    Cancelled,
}

impl fmt::Display for FailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCode::IndexBuildFailed => write!(f, "INDEX_BUILD_FAILED"),
            FailureCode::IoError => write!(f, "IO_ERROR"),
            FailureCode::ConfigError => write!(f, "CONFIG_ERROR"),
            FailureCode::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Why a job ended in `FAILURE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    pub code: FailureCode,
    pub message: String,
}

impl JobFailure {
    pub fn new(code: FailureCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self::new(FailureCode::Cancelled, "job cancelled")
    }
}

impl From<NanocasError> for JobFailure {
    fn from(err: NanocasError) -> Self {
        let code = match &err {
            NanocasError::ToolInvocation { .. } => FailureCode::IndexBuildFailed,
            NanocasError::ConfigError(_) | NanocasError::JsonError(_) | NanocasError::TomlError(_) => {
                FailureCode::ConfigError
            }
            _ => FailureCode::IoError,
        };
        Self::new(code, err.to_string())
    }
}

impl From<std::io::Error> for JobFailure {
    fn from(err: std::io::Error) -> Self {
        Self::new(FailureCode::IoError, err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Progress { percent: u8, message: String },
    Success { percent: u8, result: BuildResult },
    Failure { code: FailureCode, message: String },
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Success { .. } | JobState::Failure { .. })
    }

    pub fn percent(&self) -> Option<u8> {
        match self {
            JobState::Progress { percent, .. } | JobState::Success { percent, .. } => Some(*percent),
            _ => None,
        }
    }
}

impl From<JobFailure> for JobState {
    fn from(f: JobFailure) -> Self {
        JobState::Failure {
            code: f.code,
            message: f.message,
        }
    }
}

/// One entry of a job's update stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobUpdate {
    pub job_id: JobId,
    pub project_id: ProjectId,
    #[serde(flatten)]
    pub state: JobState,
}
