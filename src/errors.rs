// src/errors.rs

//! Crate-wide error type and aliases.
//!
//! Variants follow the failure taxonomy of the ingestion engine. Most of them
//! are file-local or project-local: callers log them with context and keep
//! going rather than tearing down the process.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NanocasError {
    /// A newly observed file never became safe to ingest.
    #[error("Arrival error for {path:?}: {reason}")]
    Arrival { path: PathBuf, reason: ArrivalReason },

    /// An external tool could not be spawned or exited non-zero.
    #[error("Tool `{tool}` failed (exit code {code:?}): {stderr}")]
    ToolInvocation {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Invalid alignment artifact: {0:?}")]
    ArtifactValidation(PathBuf),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Notification channel `{channel}` failed: {reason}")]
    Channel { channel: String, reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Why the stability gate gave up on a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArrivalReason {
    /// The file vanished between two size samples.
    Disappeared,
    /// The size kept changing until the timeout elapsed.
    TimedOut { waited_secs: u64 },
    /// Stat failed for a reason other than the file being gone.
    Stat(String),
}

impl fmt::Display for ArrivalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArrivalReason::Disappeared => write!(f, "file no longer exists"),
            ArrivalReason::TimedOut { waited_secs } => {
                write!(f, "file did not stabilize within {waited_secs} seconds")
            }
            ArrivalReason::Stat(msg) => write!(f, "error checking file size: {msg}"),
        }
    }
}

impl NanocasError {
    pub fn config(msg: impl Into<String>) -> Self {
        NanocasError::ConfigError(msg.into())
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, NanocasError>;
