// src/jobs/build.rs

//! The database build job itself.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::alert::Channel;
use crate::config::{AlertInfo, JsonConfigStore, ProjectConfigStore, Query, update_blocking};
use crate::coverage::CoverageLog;
use crate::engine::context::EngineContext;
use crate::errors::NanocasError;
use crate::fs::scratch::ScratchFile;
use crate::jobs::{BuildRequest, BuildResult, JobFailure, JobState, QuerySpec};
use crate::layout::{INDEX_EXTENSION, ProjectLayout};
use crate::types::Severity;

/// Name of the index builder's log inside the database directory.
pub const BUILD_LOG: &str = "building_index.txt";

/// Forwards progress, dropping anything that would not move the percentage
/// forward.
struct ProgressReporter<'a> {
    last: Option<u8>,
    sink: &'a mut (dyn FnMut(JobState) + Send),
}

impl ProgressReporter<'_> {
    fn report(&mut self, percent: u8, message: impl Into<String>) {
        if self.last.is_some_and(|last| percent <= last) {
            return;
        }
        self.last = Some(percent);
        (self.sink)(JobState::Progress {
            percent,
            message: message.into(),
        });
    }
}

/// Percentage reported after the `done`-th of `total` queries.
pub fn query_progress(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    (done * 50 / total) as u8
}

/// Run one build job to its terminal state.
///
/// Non-terminal states are handed to `on_progress` in order; the terminal
/// state is returned.
pub async fn run_build(
    ctx: &EngineContext,
    request: &BuildRequest,
    cancel: &CancellationToken,
    on_progress: &mut (dyn FnMut(JobState) + Send),
) -> JobState {
    let mut reporter = ProgressReporter {
        last: None,
        sink: on_progress,
    };

    match build_database(ctx, request, cancel, &mut reporter).await {
        Ok(result) => {
            info!(project = %request.project_id, location = ?result.location, "database build finished");
            announce_ready(ctx, request).await;
            JobState::Success {
                percent: 100,
                result,
            }
        }
        Err(failure) => {
            warn!(
                project = %request.project_id,
                code = %failure.code,
                message = %failure.message,
                "database build failed"
            );
            failure.into()
        }
    }
}

async fn build_database(
    ctx: &EngineContext,
    request: &BuildRequest,
    cancel: &CancellationToken,
    reporter: &mut ProgressReporter<'_>,
) -> Result<BuildResult, JobFailure> {
    let layout = ProjectLayout::new(&request.target_dir);
    let database = layout.database_dir();
    fs::create_dir_all(&database)?;
    fs::create_dir_all(layout.runs_dir())?;

    let fallback = AlertInfo {
        project_id: request.project_id.clone(),
        ..AlertInfo::default()
    };
    let config: Arc<dyn ProjectConfigStore> =
        Arc::new(JsonConfigStore::open_or(layout.alert_config(), fallback)?);

    let base = Local::now().format("%Y%m%d%H%M%S").to_string();
    let combined = ScratchFile::new(database.join(format!(".{base}.fa.partial")));
    let mut out = File::create(combined.path()).await?;

    let total = request.queries.len();
    for (i, query) in request.queries.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(JobFailure::cancelled());
        }
        let header = first_header(&query.file).await?;
        let mut src = File::open(&query.file).await?;
        tokio::io::copy(&mut src, &mut out).await?;

        let spec = query.clone();
        update_blocking(Arc::clone(&config), move |info: &mut AlertInfo| {
            record_query(info, &spec, &header)
        })
        .await?;
        reporter.report(
            query_progress(i + 1, total),
            format!("Processed query {} of {total}: {}", i + 1, query.name),
        );
    }
    out.flush().await?;
    drop(out);

    let device = request.device.clone();
    update_blocking(config, move |info: &mut AlertInfo| info.device = device.clone()).await?;

    reporter.report(98, "Building the index.");
    let index = ScratchFile::new(database.join(format!(".{base}.{INDEX_EXTENSION}.partial")));
    let log = database.join(BUILD_LOG);
    tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(JobFailure::cancelled()),
        built = ctx.tools.build_index(combined.path(), index.path(), &log) => built.map_err(NanocasError::from)?,
    }

    publish_index(&layout, index, &database.join(format!("{base}.{INDEX_EXTENSION}")))?;
    combined.persist(&database.join(format!("{base}.fa")))?;
    CoverageLog::new(layout.coverage_log()).initialize()?;

    Ok(BuildResult {
        minion: request.minion.clone(),
        location: request.target_dir.clone(),
        device: request.device.clone(),
    })
}

/// Header of the first FASTA record in `path`, without the leading `>`.
/// Empty when the file has no header line.
pub async fn first_header(path: &Path) -> std::io::Result<String> {
    let mut reader = BufReader::new(File::open(path).await?);
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            return Ok(String::new());
        }
        let text = String::from_utf8_lossy(&line);
        if let Some(header) = text.strip_prefix('>') {
            return Ok(header.trim().to_string());
        }
    }
}

/// Store the sequence header of `spec` on the configured query with the same
/// name, appending a new query when none matches.
fn record_query(info: &mut AlertInfo, spec: &QuerySpec, header: &str) {
    match info.queries.iter_mut().find(|q| q.name == spec.name) {
        Some(existing) => {
            existing.header = header.to_string();
            existing.file = Some(spec.file.clone());
        }
        None => info.queries.push(Query {
            header: header.to_string(),
            file: Some(spec.file.clone()),
            ..Query::new(spec.name.clone(), spec.threshold)
        }),
    }
}

/// Move a finished index into place, removing every previously published
/// index so exactly one remains.
fn publish_index(layout: &ProjectLayout, index: ScratchFile, target: &Path) -> std::io::Result<()> {
    let stale: Vec<PathBuf> = layout
        .index_candidates()
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    index.persist(target)?;
    for old in stale.iter().filter(|p| p.as_path() != target) {
        if let Err(e) = fs::remove_file(old) {
            warn!(path = ?old, error = %e, "failed to remove stale index");
        }
    }
    info!(index = ?target, "published reference index");
    Ok(())
}

async fn announce_ready(ctx: &EngineContext, request: &BuildRequest) {
    if request.device.trim().is_empty() {
        return;
    }
    let message = format!(
        "nanoCAS project {} is ready; watching {}",
        request.project_id,
        request.minion.display()
    );
    if let Err(e) = ctx
        .notifier
        .send(Channel::DevicePush, request.device.trim(), &message, Severity::Info)
        .await
    {
        warn!(project = %request.project_id, error = %e, "failed to announce project");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_progress_spans_first_half() {
        assert_eq!(query_progress(1, 3), 16);
        assert_eq!(query_progress(2, 3), 33);
        assert_eq!(query_progress(3, 3), 50);
        assert_eq!(query_progress(1, 1), 50);
    }

    #[tokio::test]
    async fn first_header_skips_leading_noise() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q.fa");
        std::fs::write(&path, "\n;comment\n>blaKPC-2 carbapenemase \nACGT\n>second\n").unwrap();
        assert_eq!(first_header(&path).await.unwrap(), "blaKPC-2 carbapenemase");

        std::fs::write(&path, "ACGT\n").unwrap();
        assert_eq!(first_header(&path).await.unwrap(), "");
    }

    #[test]
    fn record_query_matches_by_name_or_appends() {
        let mut info = AlertInfo::default();
        info.queries.push(Query::new("KPC", 5.0));
        let spec = |name: &str| QuerySpec {
            name: name.into(),
            file: PathBuf::from(format!("/refs/{name}.fa")),
            threshold: 2.0,
        };

        record_query(&mut info, &spec("NDM"), "blaNDM-1");
        record_query(&mut info, &spec("KPC"), "blaKPC-2");

        assert_eq!(info.queries.len(), 2);
        assert_eq!(info.queries[0].name, "KPC");
        assert_eq!(info.queries[0].header, "blaKPC-2");
        assert_eq!(info.queries[0].threshold, 5.0);
        assert_eq!(info.queries[1].name, "NDM");
        assert_eq!(info.queries[1].header, "blaNDM-1");
        assert_eq!(info.queries[1].threshold, 2.0);
    }
}
