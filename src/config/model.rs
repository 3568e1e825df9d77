// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Engine settings as read from a TOML file.
///
/// ```toml
/// [paths]
/// projects_root = "/data/nanocas"
///
/// [stability]
/// interval_ms = 1000
/// timeout_secs = 60
///
/// [tools]
/// minimap2 = "minimap2"
/// samtools = "samtools"
/// preset = "map-ont"
///
/// [jobs]
/// workers = 1
/// ```
///
/// All sections are optional and have reasonable defaults. This is the raw
/// deserialized form; use [`Settings`] (obtained through `TryFrom`) in the
/// rest of the application.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawSettings {
    #[serde(default)]
    pub paths: PathsSection,

    #[serde(default)]
    pub stability: StabilitySection,

    #[serde(default)]
    pub tools: ToolsSection,

    #[serde(default)]
    pub jobs: JobsSection,
}

/// Validated engine settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub paths: PathsSection,
    pub stability: StabilitySection,
    pub tools: ToolsSection,
    pub jobs: JobsSection,
}

impl Settings {
    /// Construct settings without validation. Prefer `Settings::try_from`.
    pub(crate) fn new_unchecked(raw: RawSettings) -> Self {
        Self {
            paths: raw.paths,
            stability: raw.stability,
            tools: raw.tools,
            jobs: raw.jobs,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new_unchecked(RawSettings::default())
    }
}

/// `[paths]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PathsSection {
    /// Directory holding one sub-directory per project.
    ///
    /// Defaults to `$HOME/.nanocas`.
    #[serde(default)]
    pub projects_root: Option<PathBuf>,
}

impl PathsSection {
    pub fn projects_root(&self) -> PathBuf {
        match &self.projects_root {
            Some(root) => root.clone(),
            None => std::env::var_os("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".nanocas"),
        }
    }
}

/// `[stability]` section: how long and how often the size of a newly
/// observed file is polled before it is considered fully written.
#[derive(Debug, Clone, Deserialize)]
pub struct StabilitySection {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for StabilitySection {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl StabilitySection {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// `[tools]` section: executables for the external aligner and the
/// alignment toolbox.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    #[serde(default = "default_minimap2")]
    pub minimap2: String,

    #[serde(default = "default_samtools")]
    pub samtools: String,

    /// Preset passed to the index builder (`-x`).
    #[serde(default = "default_preset")]
    pub preset: String,
}

fn default_minimap2() -> String {
    "minimap2".to_string()
}

fn default_samtools() -> String {
    "samtools".to_string()
}

fn default_preset() -> String {
    "map-ont".to_string()
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            minimap2: default_minimap2(),
            samtools: default_samtools(),
            preset: default_preset(),
        }
    }
}

/// `[jobs]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct JobsSection {
    /// Number of database build jobs that may run concurrently.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_workers() -> usize {
    1
}

impl Default for JobsSection {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}
