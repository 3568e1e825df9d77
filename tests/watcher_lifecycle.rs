// tests/watcher_lifecycle.rs

use std::error::Error;
use std::path::{Path, PathBuf};

use tokio::time::{Duration, sleep};

use nanocas::engine::{StartStatus, StopStatus, WatcherManager, WatcherStatus};
use nanocas::errors::NanocasError;
use nanocas::types::FileKind;
use nanocas_test_utils::{ProjectFixture, ToolOp, eventually, init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn fixture() -> ProjectFixture {
    ProjectFixture::new(FileKind::Fastq)
        .with_query("geneA", 100, 5.0)
        .materialize()
}

#[tokio::test]
async fn start_is_idempotent_and_stop_reports_state() -> TestResult {
    init_tracing();
    let fixture = fixture();
    let manager = WatcherManager::new(fixture.context());
    let layout = fixture.layout();

    let first = manager.start_at(&fixture.id, layout.clone(), &fixture.source()).await?;
    let second = manager.start_at(&fixture.id, layout, &fixture.source()).await?;
    assert_eq!(first, StartStatus::Started);
    assert_eq!(second, StartStatus::AlreadyRunning);
    assert!(manager.status(&fixture.id).await);
    assert_eq!(manager.running().await, vec![fixture.id.clone()]);

    assert_eq!(manager.stop(&fixture.id).await, StopStatus::Stopped);
    assert_eq!(manager.stop(&fixture.id).await, StopStatus::NotRunning);
    assert!(!manager.status(&fixture.id).await);

    assert_eq!(
        fixture.events.lifecycle(),
        vec![
            WatcherStatus::Started,
            WatcherStatus::AlreadyRunning,
            WatcherStatus::Stopped,
            WatcherStatus::NotRunning,
        ]
    );
    Ok(())
}

#[tokio::test]
async fn start_resolves_projects_under_the_configured_root() -> TestResult {
    let fixture = fixture();
    let manager = WatcherManager::new(fixture.context());

    assert_eq!(
        manager.start(&fixture.id, &fixture.source()).await?,
        StartStatus::Started
    );
    manager.shutdown().await;
    assert!(manager.running().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn missing_source_directory_is_reported_and_not_registered() {
    let fixture = fixture();
    let manager = WatcherManager::new(fixture.context());
    let missing = fixture.source().join("does-not-exist");

    match manager.start_at(&fixture.id, fixture.layout(), &missing).await {
        Err(NanocasError::ConfigError(msg)) => assert!(msg.contains("does not exist")),
        other => panic!("expected ConfigError, got {other:?}"),
    }
    assert!(!manager.status(&fixture.id).await);
    assert_eq!(fixture.events.lifecycle(), vec![WatcherStatus::Error]);
}

#[tokio::test]
async fn missing_project_configuration_fails_to_start() -> TestResult {
    let fixture = ProjectFixture::new(FileKind::Fastq);
    let manager = WatcherManager::new(fixture.context());

    let result = manager
        .start_at(&fixture.id, fixture.layout(), &fixture.source())
        .await;

    assert!(matches!(result, Err(NanocasError::ConfigError(_))));
    assert!(manager.running().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn existing_files_are_caught_up_oldest_first() -> TestResult {
    init_tracing();
    let fixture = fixture();
    let newer = fixture.write_reads("b.fastq", &["geneA\t0\t10"]);
    let older = fixture.write_reads("a_late_name.fastq", &["geneA\t0\t10"]);
    fixture.set_age(&newer, 60);
    fixture.set_age(&older, 600);
    fixture.write_reads("notes.txt", &["ignored"]);

    let manager = WatcherManager::new(fixture.context());
    manager
        .start_at(&fixture.id, fixture.layout(), &fixture.source())
        .await?;

    assert!(eventually(|| fixture.ledger_lines().len() == 2).await);
    assert_eq!(
        fixture.ledger_lines(),
        vec![older.display().to_string(), newer.display().to_string()]
    );

    manager.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn new_arrivals_are_ingested_while_running() -> TestResult {
    init_tracing();
    let fixture = fixture();
    let manager = WatcherManager::new(fixture.context());
    manager
        .start_at(&fixture.id, fixture.layout(), &fixture.source())
        .await?;

    let reads = fixture.deliver_reads("reads_0.fastq", &["geneA\t0\t100"]);
    assert!(eventually(|| fixture.ledger_lines().len() == 1).await);
    assert_eq!(fixture.ledger_lines(), vec![reads.display().to_string()]);
    assert!(eventually(|| fixture.events.coverage_updates().len() == 1).await);

    with_timeout(manager.shutdown()).await;
    Ok(())
}

#[tokio::test]
async fn stopped_projects_ignore_new_files() -> TestResult {
    let fixture = fixture();
    let manager = WatcherManager::new(fixture.context());
    manager
        .start_at(&fixture.id, fixture.layout(), &fixture.source())
        .await?;
    manager.stop(&fixture.id).await;

    fixture.deliver_reads("late.fastq", &["geneA\t0\t100"]);
    sleep(Duration::from_millis(300)).await;

    assert!(fixture.ledger_lines().is_empty());
    assert_eq!(fixture.toolkit.calls(ToolOp::Align), 0);
    Ok(())
}

#[tokio::test]
async fn a_stopped_project_can_be_started_again() -> TestResult {
    let fixture = fixture();
    let manager = WatcherManager::new(fixture.context());
    let layout = fixture.layout();

    manager.start_at(&fixture.id, layout.clone(), &fixture.source()).await?;
    manager.stop(&fixture.id).await;
    let restarted = manager.start_at(&fixture.id, layout, &fixture.source()).await?;

    assert_eq!(restarted, StartStatus::Started);
    manager.shutdown().await;
    Ok(())
}

/// `path` spelled relative to the current working directory.
#[cfg(unix)]
fn relative_to_cwd(path: &Path) -> PathBuf {
    let cwd = std::env::current_dir().expect("current dir");
    let mut relative = PathBuf::new();
    for _ in cwd.components().skip(1) {
        relative.push("..");
    }
    relative.join(path.strip_prefix("/").expect("absolute path"))
}

#[cfg(unix)]
#[tokio::test]
async fn relative_source_is_recorded_with_absolute_paths() -> TestResult {
    init_tracing();
    let fixture = fixture();
    let existing = fixture.write_reads("reads_0.fastq", &["geneA\t0\t10"]);
    let relative = relative_to_cwd(&fixture.source());
    assert!(relative.is_relative());

    let manager = WatcherManager::new(fixture.context());
    manager
        .start_at(&fixture.id, fixture.layout(), &relative)
        .await?;
    assert!(eventually(|| fixture.ledger_lines().len() == 1).await);

    let live = fixture.deliver_reads("reads_1.fastq", &["geneA\t0\t10"]);
    assert!(eventually(|| fixture.ledger_lines().len() == 2).await);
    manager.shutdown().await;

    assert_eq!(
        fixture.ledger_lines(),
        vec![existing.display().to_string(), live.display().to_string()]
    );
    Ok(())
}
