// src/watch/event_handler.rs

//! Turning filesystem events into ingestion work for one project.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::Event;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::engine::project::ProjectRuntime;
use crate::errors::{ArrivalReason, NanocasError};
use crate::fs::FileSystem;
use crate::pipeline::IngestOutcome;
use crate::watch::patterns::ArrivalFilter;
use crate::watch::stability::wait_for_stability;
use crate::watch::watcher::arrival_paths;

/// Handle one candidate file from claim to ledger.
///
/// 1. Claim the path (skips files already processed or in flight).
/// 2. Wait until the file stops growing.
/// 3. Ingest it.
/// 4. Record or release the claim depending on the outcome.
pub async fn handle_arrival(project: Arc<ProjectRuntime>, path: PathBuf) {
    if !project.claim(&path).await {
        debug!(project = %project.id(), ?path, "already processed or in flight; skipping");
        return;
    }

    let stability = &project.context().settings.stability;
    if let Err(err) = wait_for_stability(
        &*project.context().fs,
        &path,
        stability.interval(),
        stability.timeout(),
    )
    .await
    {
        match &err {
            NanocasError::Arrival {
                reason: ArrivalReason::TimedOut { .. },
                ..
            } => warn!(project = %project.id(), error = %err, "skipping unstable file"),
            _ => error!(project = %project.id(), error = %err, "abandoning arrival"),
        }
        project.release(&path).await;
        return;
    }

    info!(project = %project.id(), ?path, "processing file");
    match project.ingest(&path).await {
        Ok(IngestOutcome::Merged { records, alerts }) => {
            info!(project = %project.id(), ?path, records, alerts, "file ingested");
        }
        Ok(IngestOutcome::Invalid(artifact)) => {
            warn!(project = %project.id(), ?path, ?artifact, "discarding invalid alignment");
            project.mark_processed(&path).await;
        }
        Ok(IngestOutcome::ToolFailed(failure)) => {
            error!(project = %project.id(), ?path, %failure, "ingestion aborted; will retry on next arrival");
            project.release(&path).await;
        }
        Err(err) => {
            error!(project = %project.id(), ?path, error = %err, "ingestion failed");
            project.release(&path).await;
        }
    }
}

/// Files already present in `source` that the project has not processed,
/// oldest first.
pub async fn pending_arrivals(
    project: &ProjectRuntime,
    fs: &dyn FileSystem,
    source: &Path,
) -> Vec<PathBuf> {
    let entries = match fs.read_dir(source) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(project = %project.id(), error = %e, "catch-up scan failed");
            return Vec::new();
        }
    };

    let mut pending = Vec::new();
    for path in entries {
        if !fs.is_file(&path) || !project.filter().matches(&path) {
            continue;
        }
        if project.is_processed(&path).await {
            continue;
        }
        let modified = fs.modified(&path).ok();
        pending.push((modified, path));
    }
    pending.sort();
    pending.into_iter().map(|(_, path)| path).collect()
}

/// Dispatch loop of one project's watcher.
///
/// Existing unprocessed files are ingested first, one at a time in
/// modification order; every later candidate runs as its own unit of work.
/// On cancellation all outstanding units are aborted.
pub async fn run_arrival_loop(
    project: Arc<ProjectRuntime>,
    source: PathBuf,
    mut events: mpsc::UnboundedReceiver<Event>,
    cancel: CancellationToken,
) {
    let filter: ArrivalFilter = project.filter().clone();
    let mut units: JoinSet<()> = JoinSet::new();

    let backlog = pending_arrivals(&project, &*project.context().fs, &source).await;
    if !backlog.is_empty() {
        info!(project = %project.id(), files = backlog.len(), "catching up on existing files");
        let project = Arc::clone(&project);
        units.spawn(async move {
            for path in backlog {
                handle_arrival(Arc::clone(&project), path).await;
            }
        });
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(project = %project.id(), "arrival loop cancelled");
                break;
            }
            maybe_event = events.recv() => {
                let Some(event) = maybe_event else {
                    warn!(project = %project.id(), "watch event channel closed");
                    break;
                };
                for path in arrival_paths(&event) {
                    if !filter.matches(&path) {
                        continue;
                    }
                    units.spawn(handle_arrival(Arc::clone(&project), path));
                }
            }
            Some(joined) = units.join_next(), if !units.is_empty() => {
                if let Err(e) = joined
                    && e.is_panic()
                {
                    error!(project = %project.id(), error = %e, "arrival unit panicked");
                }
            }
        }
    }

    units.shutdown().await;
    debug!(project = %project.id(), "arrival loop finished");
}
