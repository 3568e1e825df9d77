// tests/ingest_pipeline.rs

use std::error::Error;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use nanocas::alert::{Channel, NotificationSink};
use nanocas::coverage::{CoverageLog, UNMAPPED_REFERENCE};
use nanocas::engine::ProjectRuntime;
use nanocas::errors::NanocasError;
use nanocas::pipeline::IngestOutcome;
use nanocas::types::{FileKind, Severity};
use nanocas::watch::handle_arrival;
use nanocas_test_utils::{
    FakeToolkit, ProjectFixture, ToolOp, eventually, init_tracing, with_timeout,
};

type TestResult = Result<(), Box<dyn Error>>;

fn open(fixture: &ProjectFixture) -> Arc<ProjectRuntime> {
    Arc::new(
        ProjectRuntime::open(&fixture.id, fixture.layout(), fixture.context())
            .expect("project opens"),
    )
}

#[tokio::test]
async fn successive_files_accumulate_in_the_store() -> TestResult {
    init_tracing();
    let fixture = ProjectFixture::new(FileKind::Fastq)
        .with_query("geneA", 100, 5.0)
        .with_reference("geneB", 50)
        .materialize();
    let project = open(&fixture);

    let first = fixture.write_reads("reads_0.fastq", &["geneA\t0\t100", "geneA\t0\t50", "*"]);
    let outcome = project.ingest(&first).await?;
    assert_eq!(
        outcome,
        IngestOutcome::Merged {
            records: 3,
            alerts: 0
        }
    );

    let second = fixture.write_reads(
        "reads_1.fastq",
        &["geneA\t0\t100", "geneA\t0\t100", "geneA\t0\t100", "geneA\t0\t100", "geneB\t0\t25"],
    );
    let outcome = project.ingest(&second).await?;
    assert_eq!(
        outcome,
        IngestOutcome::Merged {
            records: 3,
            alerts: 1
        }
    );

    let rows = CoverageLog::new(fixture.layout().coverage_log()).read_all()?;
    assert_eq!(rows.len(), 6);

    let latest = &rows[3..];
    assert_eq!(latest[0].reference, "geneA");
    assert_eq!(latest[0].read_count, 6);
    assert_eq!(latest[0].depth, 5.5);
    assert_eq!(latest[0].breadth, 100.0);
    assert_eq!(latest[1].reference, "geneB");
    assert_eq!(latest[1].depth, 0.5);
    assert_eq!(latest[1].breadth, 50.0);
    assert_eq!(latest[2].reference, UNMAPPED_REFERENCE);
    assert_eq!(latest[2].read_count, 1);
    assert!(latest.iter().all(|r| r.timestamp == latest[0].timestamp));

    assert_eq!(fixture.events.coverage_updates().len(), 2);
    assert_eq!(project.store().path(), fixture.layout().store().as_path());
    assert!(fixture.layout().store_index().is_file());
    assert_eq!(fixture.ledger_lines().len(), 2);
    Ok(())
}

#[tokio::test]
async fn crossing_a_threshold_fires_once_and_is_persisted() -> TestResult {
    init_tracing();
    let fixture = ProjectFixture::new(FileKind::Fastq)
        .with_query("geneA", 10, 2.0)
        .with_device("MN12345")
        .materialize();
    let project = open(&fixture);

    let reads = fixture.write_reads("a.fastq", &["geneA\t0\t10", "geneA\t0\t10"]);
    project.ingest(&reads).await?;
    let more = fixture.write_reads("b.fastq", &["geneA\t0\t10"]);
    project.ingest(&more).await?;

    let alerts = fixture.events.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].value, 2.0);
    assert_eq!(
        alerts[0].message,
        "Alert: geneA depth coverage reached 2.00x (threshold: 2x)"
    );

    let sent = fixture.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].channel, Channel::DevicePush);
    assert_eq!(sent[0].target, "MN12345");
    assert_eq!(sent[0].severity, Severity::Warning);

    let on_disk = fixture.read_config();
    assert_eq!(on_disk.queries[0].current_value, Some(3.0));
    assert!(on_disk.queries[0].triggered);
    Ok(())
}

#[tokio::test]
async fn aligned_scratch_output_is_removed_after_merge() -> TestResult {
    let fixture = ProjectFixture::new(FileKind::Fastq)
        .with_query("geneA", 100, 5.0)
        .materialize();
    let project = open(&fixture);

    let reads = fixture.write_reads("reads.fastq", &["geneA\t0\t10"]);
    project.ingest(&reads).await?;

    let leftovers: Vec<_> = fs::read_dir(fixture.layout().runs_dir())?.collect();
    assert!(leftovers.is_empty(), "runs dir not empty: {leftovers:?}");
    assert!(reads.is_file());
    assert_eq!(fixture.toolkit.calls(ToolOp::Align), 1);
    Ok(())
}

#[tokio::test]
async fn upstream_alignments_skip_the_aligner() -> TestResult {
    let fixture = ProjectFixture::new(FileKind::Bam)
        .with_query("geneA", 100, 5.0)
        .materialize();
    let project = open(&fixture);

    let bam = fixture.write_alignment("pass_0.bam", &["geneA\t0\t100"]);
    let outcome = project.ingest(&bam).await?;

    assert!(matches!(outcome, IngestOutcome::Merged { .. }));
    assert_eq!(fixture.toolkit.calls(ToolOp::Align), 0);
    assert_eq!(fixture.toolkit.calls(ToolOp::Quickcheck), 1);
    assert!(bam.is_file());
    Ok(())
}

#[tokio::test]
async fn invalid_alignment_is_recorded_and_not_merged() -> TestResult {
    init_tracing();
    let fixture = ProjectFixture::new(FileKind::Bam)
        .with_query("geneA", 100, 5.0)
        .materialize();
    let project = open(&fixture);

    let junk = fixture.source().join("truncated.bam");
    fs::write(&junk, "not an alignment\n")?;
    handle_arrival(Arc::clone(&project), junk.clone()).await;

    assert!(!fixture.layout().store().exists());
    assert!(project.is_processed(&junk).await);
    assert_eq!(fixture.ledger_lines(), vec![junk.display().to_string()]);
    assert!(fixture.events.coverage_updates().is_empty());
    Ok(())
}

#[tokio::test]
async fn tool_failure_keeps_previous_store_and_allows_retry() -> TestResult {
    init_tracing();
    let fixture = ProjectFixture::new(FileKind::Fastq)
        .with_query("geneA", 100, 5.0)
        .materialize();
    let project = open(&fixture);

    let first = fixture.write_reads("reads_0.fastq", &["geneA\t0\t100"]);
    handle_arrival(Arc::clone(&project), first.clone()).await;
    let store_before = fs::read(fixture.layout().store())?;
    let index_before = fs::read(fixture.layout().store_index())?;

    fixture.toolkit.fail(ToolOp::Merge, 1);
    let second = fixture.write_reads("reads_1.fastq", &["geneA\t0\t100"]);
    handle_arrival(Arc::clone(&project), second.clone()).await;

    assert_eq!(fs::read(fixture.layout().store())?, store_before);
    assert_eq!(fs::read(fixture.layout().store_index())?, index_before);
    assert!(!project.is_processed(&second).await);
    assert_eq!(fixture.ledger_lines().len(), 1);

    handle_arrival(Arc::clone(&project), second.clone()).await;
    assert!(project.is_processed(&second).await);
    assert_ne!(fs::read(fixture.layout().store())?, store_before);
    Ok(())
}

#[tokio::test]
async fn the_same_file_is_ingested_once() -> TestResult {
    let fixture = ProjectFixture::new(FileKind::Fastq)
        .with_query("geneA", 100, 5.0)
        .materialize();
    let project = open(&fixture);

    let reads = fixture.write_reads("reads.fastq", &["geneA\t0\t100"]);
    tokio::join!(
        handle_arrival(Arc::clone(&project), reads.clone()),
        handle_arrival(Arc::clone(&project), reads.clone()),
    );
    handle_arrival(Arc::clone(&project), reads.clone()).await;

    assert_eq!(fixture.toolkit.calls(ToolOp::Align), 1);
    assert_eq!(fixture.ledger_lines().len(), 1);
    Ok(())
}

#[tokio::test]
async fn ledger_survives_reopening_the_project() -> TestResult {
    let fixture = ProjectFixture::new(FileKind::Fastq)
        .with_query("geneA", 100, 5.0)
        .materialize();

    let reads = fixture.write_reads("reads.fastq", &["geneA\t0\t100"]);
    handle_arrival(open(&fixture), reads.clone()).await;

    let reopened = open(&fixture);
    assert!(reopened.is_processed(&reads).await);
    handle_arrival(reopened, reads).await;
    assert_eq!(fixture.toolkit.calls(ToolOp::Align), 1);
    Ok(())
}

#[tokio::test]
async fn missing_reference_index_is_a_configuration_error() -> TestResult {
    let fixture = ProjectFixture::new(FileKind::Fastq)
        .with_query("geneA", 100, 5.0)
        .materialize();
    fs::remove_file(fixture.layout().database_dir().join("refs.mmi"))?;
    let project = open(&fixture);

    let reads = fixture.write_reads("reads.fastq", &["geneA\t0\t100"]);
    match project.ingest(&reads).await {
        Err(NanocasError::ConfigError(msg)) => assert!(msg.contains("expected exactly one")),
        other => panic!("expected ConfigError, got {other:?}"),
    }
    assert_eq!(fixture.toolkit.calls(ToolOp::Align), 0);
    Ok(())
}

#[tokio::test]
async fn distinct_files_arriving_together_both_count() -> TestResult {
    init_tracing();
    let fixture = ProjectFixture::new(FileKind::Fastq)
        .with_toolkit(FakeToolkit::new().with_merge_delay(Duration::from_millis(50)))
        .with_query("geneA", 100, 50.0)
        .materialize();
    let project = open(&fixture);

    let seed = fixture.write_reads("reads_0.fastq", &["geneA\t0\t100"]);
    handle_arrival(Arc::clone(&project), seed.clone()).await;

    let a = fixture.write_reads("reads_1.fastq", &["geneA\t0\t100", "geneA\t0\t100"]);
    let b = fixture.write_reads(
        "reads_2.fastq",
        &["geneA\t0\t100", "geneA\t0\t100", "geneA\t0\t100"],
    );
    tokio::join!(
        handle_arrival(Arc::clone(&project), a.clone()),
        handle_arrival(Arc::clone(&project), b.clone()),
    );

    let counts: Vec<u64> = CoverageLog::new(fixture.layout().coverage_log())
        .read_all()?
        .into_iter()
        .filter(|r| r.reference == "geneA")
        .map(|r| r.read_count)
        .collect();
    assert_eq!(counts.len(), 3);
    assert_eq!(counts.last(), Some(&6));
    assert_eq!(fixture.toolkit.calls(ToolOp::Merge), 2);

    let mut ledger = fixture.ledger_lines();
    ledger.sort();
    let mut expected: Vec<String> = [&seed, &a, &b]
        .iter()
        .map(|p| p.display().to_string())
        .collect();
    expected.sort();
    assert_eq!(ledger, expected);
    Ok(())
}

#[tokio::test]
async fn aborted_merge_leaves_store_and_ledger_unchanged() -> TestResult {
    init_tracing();
    let fixture = ProjectFixture::new(FileKind::Fastq)
        .with_toolkit(FakeToolkit::new().with_merge_delay(Duration::from_secs(30)))
        .with_query("geneA", 100, 5.0)
        .materialize();
    let project = open(&fixture);

    let first = fixture.write_reads("reads_0.fastq", &["geneA\t0\t100"]);
    project.ingest(&first).await?;
    let store_before = fs::read(fixture.layout().store())?;
    let index_before = fs::read(fixture.layout().store_index())?;

    let second = fixture.write_reads("reads_1.fastq", &["geneA\t0\t100"]);
    let unit = tokio::spawn({
        let project = Arc::clone(&project);
        let second = second.clone();
        async move { project.ingest(&second).await }
    });
    assert!(eventually(|| fixture.toolkit.calls(ToolOp::Merge) == 1).await);
    unit.abort();
    assert!(unit.await.is_err_and(|e| e.is_cancelled()));

    assert_eq!(fs::read(fixture.layout().store())?, store_before);
    assert_eq!(fs::read(fixture.layout().store_index())?, index_before);
    assert!(!project.is_processed(&second).await);
    assert_eq!(fixture.ledger_lines(), vec![first.display().to_string()]);
    for scratch in ["temp_merged.bam", "merged_sorted.bam", "merged_sorted.bam.bai"] {
        assert!(!fixture.layout().scratch(scratch).exists(), "{scratch} left behind");
    }
    Ok(())
}

/// Notifier whose sends block until the test releases them.
#[derive(Debug, Default)]
struct HeldNotifier {
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl NotificationSink for HeldNotifier {
    async fn send(
        &self,
        _channel: Channel,
        _target: &str,
        _message: &str,
        _severity: Severity,
    ) -> nanocas::errors::Result<()> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(())
    }
}

#[tokio::test]
async fn slow_notifications_do_not_hold_up_the_next_merge() -> TestResult {
    init_tracing();
    let fixture = ProjectFixture::new(FileKind::Fastq)
        .with_query("geneA", 10, 1.0)
        .with_device("MN12345")
        .materialize();
    let notifier = Arc::new(HeldNotifier::default());
    let mut ctx = (*fixture.context()).clone();
    ctx.notifier = Arc::clone(&notifier) as Arc<dyn NotificationSink>;
    let project = Arc::new(ProjectRuntime::open(
        &fixture.id,
        fixture.layout(),
        Arc::new(ctx),
    )?);

    let first = fixture.write_reads("a.fastq", &["geneA\t0\t10"]);
    let alerting = tokio::spawn({
        let project = Arc::clone(&project);
        async move { project.ingest(&first).await }
    });
    with_timeout(notifier.entered.notified()).await;

    let second = fixture.write_reads("b.fastq", &["geneA\t0\t10"]);
    let merged = tokio::time::timeout(Duration::from_secs(2), project.ingest(&second)).await;
    notifier.release.notify_one();

    assert!(matches!(merged, Ok(Ok(IngestOutcome::Merged { alerts: 0, .. }))));
    assert!(matches!(
        with_timeout(alerting).await?,
        Ok(IngestOutcome::Merged { alerts: 1, .. })
    ));
    assert_eq!(fixture.ledger_lines().len(), 2);
    Ok(())
}
