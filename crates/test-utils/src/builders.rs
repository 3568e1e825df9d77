#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use nanocas::alert::NotificationSink;
use nanocas::config::{AlertInfo, NotificationConfig, Query, RawSettings, Settings};
use nanocas::config::model::{JobsSection, PathsSection, StabilitySection};
use nanocas::coverage::{COVERAGE_HEADER, CoverageSource};
use nanocas::engine::{EngineContext, EventSink};
use nanocas::exec::AlignmentToolkit;
use nanocas::fs::RealFileSystem;
use nanocas::layout::ProjectLayout;
use nanocas::types::FileKind;
use tempfile::TempDir;

use crate::fake_tools::{FakeToolkit, fake_alignment};
use crate::sinks::{RecordingEventSink, RecordingNotifier};

/// Settings with a short stability window, rooted at `projects_root`.
pub fn test_settings(projects_root: &Path) -> Settings {
    Settings::try_from(RawSettings {
        paths: PathsSection {
            projects_root: Some(projects_root.to_path_buf()),
        },
        stability: StabilitySection {
            interval_ms: 20,
            timeout_secs: 2,
        },
        jobs: JobsSection { workers: 2 },
        ..RawSettings::default()
    })
    .expect("test settings are valid")
}

/// A project directory with its configuration, a reference index and an
/// empty source directory, all inside one temporary directory.
pub struct ProjectFixture {
    pub id: String,
    dir: TempDir,
    info: AlertInfo,
    pub toolkit: FakeToolkit,
    pub events: RecordingEventSink,
    pub notifier: RecordingNotifier,
}

impl ProjectFixture {
    pub fn new(kind: FileKind) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let id = "proj-1".to_string();
        let fixture = Self {
            info: AlertInfo {
                project_id: id.clone(),
                file_type: kind,
                ..AlertInfo::default()
            },
            id,
            dir,
            toolkit: FakeToolkit::new(),
            events: RecordingEventSink::new(),
            notifier: RecordingNotifier::new(),
        };
        fs::create_dir_all(fixture.layout().database_dir()).expect("create database dir");
        fs::create_dir_all(fixture.source()).expect("create source dir");
        fixture
    }

    /// Add a reference both to the fake store header and as a query.
    pub fn with_query(mut self, header: &str, length: u64, threshold: f64) -> Self {
        self.toolkit = self.toolkit.with_reference(header, length);
        self.info.queries.push(Query {
            header: header.to_string(),
            ..Query::new(header, threshold)
        });
        self
    }

    /// Add a reference that no query watches.
    pub fn with_reference(mut self, name: &str, length: u64) -> Self {
        self.toolkit = self.toolkit.with_reference(name, length);
        self
    }

    pub fn with_device(mut self, device: &str) -> Self {
        self.info.device = device.to_string();
        self
    }

    pub fn with_notifications(mut self, config: NotificationConfig) -> Self {
        self.info.alert_notif_config = config;
        self
    }

    pub fn with_toolkit(mut self, toolkit: FakeToolkit) -> Self {
        self.toolkit = toolkit;
        self
    }

    /// Write `alertinfo.cfg`, a single reference index and the coverage log
    /// header. Returns the fixture for chaining.
    pub fn materialize(self) -> Self {
        let layout = self.layout();
        fs::write(
            layout.alert_config(),
            serde_json::to_vec_pretty(&self.info).expect("serialize alert info"),
        )
        .expect("write alertinfo.cfg");
        fs::write(layout.database_dir().join("refs.mmi"), "#fake-mmi\n").expect("write index");
        fs::write(layout.coverage_log(), format!("{COVERAGE_HEADER}\n"))
            .expect("write coverage log");
        self
    }

    pub fn projects_root(&self) -> PathBuf {
        self.dir.path().join("projects")
    }

    pub fn layout(&self) -> ProjectLayout {
        ProjectLayout::for_project(&self.projects_root(), &self.id)
    }

    /// Source directory the device writes to, with symlinks resolved so it
    /// matches what a watcher records.
    pub fn source(&self) -> PathBuf {
        fs::canonicalize(self.dir.path())
            .expect("resolve temp dir")
            .join("source")
    }

    pub fn settings(&self) -> Settings {
        test_settings(&self.projects_root())
    }

    /// Engine context wired to this fixture's fakes and recorders.
    pub fn context(&self) -> Arc<EngineContext> {
        let toolkit = Arc::new(self.toolkit.clone());
        Arc::new(EngineContext {
            settings: self.settings(),
            fs: Arc::new(RealFileSystem),
            tools: toolkit.clone() as Arc<dyn AlignmentToolkit>,
            coverage: toolkit as Arc<dyn CoverageSource>,
            notifier: Arc::new(self.notifier.clone()) as Arc<dyn NotificationSink>,
            events: Arc::new(self.events.clone()) as Arc<dyn EventSink>,
        })
    }

    /// Write a file of reads (for FASTQ projects) into the source directory.
    pub fn write_reads(&self, name: &str, reads: &[&str]) -> PathBuf {
        let path = self.source().join(name);
        fs::write(&path, reads.join("\n") + "\n").expect("write reads");
        path
    }

    /// Write an upstream alignment (for BAM projects) into the source
    /// directory.
    pub fn write_alignment(&self, name: &str, reads: &[&str]) -> PathBuf {
        let path = self.source().join(name);
        fs::write(&path, fake_alignment(reads)).expect("write alignment");
        path
    }

    /// Write reads outside the source directory and move them in, so a
    /// running watcher only ever sees the complete file.
    pub fn deliver_reads(&self, name: &str, reads: &[&str]) -> PathBuf {
        let staging = self.dir.path().join("staging");
        fs::create_dir_all(&staging).expect("create staging dir");
        let staged = staging.join(name);
        fs::write(&staged, reads.join("\n") + "\n").expect("write staged reads");
        let path = self.source().join(name);
        fs::rename(&staged, &path).expect("move reads into source");
        path
    }

    /// Backdate a source file so scans order it deterministically.
    pub fn set_age(&self, path: &Path, secs_ago: u64) {
        let file = fs::File::options()
            .write(true)
            .open(path)
            .expect("open for mtime");
        file.set_modified(SystemTime::now() - Duration::from_secs(secs_ago))
            .expect("set mtime");
    }

    /// Current project configuration on disk.
    pub fn read_config(&self) -> AlertInfo {
        let text = fs::read_to_string(self.layout().alert_config()).expect("read alertinfo.cfg");
        serde_json::from_str(&text).expect("parse alertinfo.cfg")
    }

    /// Lines of the processed-files ledger, empty when it does not exist.
    pub fn ledger_lines(&self) -> Vec<String> {
        fs::read_to_string(self.layout().ledger())
            .map(|t| t.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}
