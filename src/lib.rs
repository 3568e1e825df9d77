// src/lib.rs

pub mod alert;
pub mod cli;
pub mod config;
pub mod coverage;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod jobs;
pub mod layout;
pub mod logging;
pub mod pipeline;
pub mod types;
pub mod watch;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::cli::{CliArgs, Command};
use crate::config::{Settings, default_settings_path, load_settings, load_settings_or_default};
use crate::coverage::{COVERAGE_HEADER, CoverageLog};
use crate::engine::{EngineContext, StartStatus, TracingEventSink, WatcherManager};
use crate::jobs::{BuildRequest, JobHandle, JobQueue, JobState, QuerySpec};
use crate::layout::ProjectLayout;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - settings loading
/// - the shared engine context (tools, notifier, event sink)
/// - the watcher manager and the build job queue
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let settings = resolve_settings(args.config.as_deref())?;
    let ctx = Arc::new(EngineContext::production(
        settings,
        Arc::new(TracingEventSink),
    ));

    match args.command {
        Command::Watch { project, source } => watch(ctx, &project, &source).await,
        Command::Build {
            project,
            source,
            device,
        } => build(ctx, &project, &source, device).await,
        Command::Check { project } => check(&ctx.layout(&project)),
    }
}

/// An explicit `--config` must exist; the implicit default may be absent.
fn resolve_settings(path: Option<&Path>) -> Result<Settings> {
    let settings = match path {
        Some(p) => load_settings(p).with_context(|| format!("loading settings {p:?}"))?,
        None => load_settings_or_default(default_settings_path())?,
    };
    info!(projects_root = ?settings.paths.projects_root(), "settings loaded");
    Ok(settings)
}

async fn watch(ctx: Arc<EngineContext>, project: &str, source: &Path) -> Result<()> {
    let manager = WatcherManager::new(ctx);
    if manager.start(project, source).await? == StartStatus::AlreadyRunning {
        warn!(project, "watcher was already running");
    }
    wait_for_ctrl_c().await;
    manager.shutdown().await;
    Ok(())
}

async fn build(
    ctx: Arc<EngineContext>,
    project: &str,
    source: &Path,
    device: Option<String>,
) -> Result<()> {
    let layout = ctx.layout(project);
    let info = config::load_alert_info(layout.alert_config())?;

    let queries: Vec<QuerySpec> = info
        .queries
        .iter()
        .filter_map(|q| {
            q.file.as_ref().map(|file| QuerySpec {
                name: q.name.clone(),
                file: file.clone(),
                threshold: q.threshold,
            })
        })
        .collect();
    if queries.len() < info.queries.len() {
        warn!(
            project,
            skipped = info.queries.len() - queries.len(),
            "queries without a sequence file are left out of the database"
        );
    }

    let request = BuildRequest {
        project_id: project.to_string(),
        device: device.unwrap_or(info.device),
        minion: source.to_path_buf(),
        queries,
        target_dir: layout.root().to_path_buf(),
    };

    let queue = JobQueue::start(Arc::clone(&ctx));
    let handle = queue.submit(request)?;

    let terminal = tokio::select! {
        state = follow_job(handle) => state,
        _ = wait_for_ctrl_c() => {
            queue.shutdown().await;
            bail!("build interrupted");
        }
    };
    queue.shutdown().await;

    match terminal {
        JobState::Success { result, .. } => {
            let manager = WatcherManager::new(ctx);
            manager.start(project, &result.minion).await?;
            wait_for_ctrl_c().await;
            manager.shutdown().await;
            Ok(())
        }
        JobState::Failure { code, message } => bail!("build failed ({code}): {message}"),
        other => bail!("build ended without a terminal state: {other:?}"),
    }
}

/// Print the job's updates and return its terminal state.
async fn follow_job(mut handle: JobHandle) -> JobState {
    let mut last = JobState::Pending;
    while let Some(update) = handle.next_update().await {
        match &update.state {
            JobState::Pending => println!("[nanocas] job {} pending", update.job_id),
            JobState::Progress { percent, message } => println!("[nanocas] {percent}% {message}"),
            JobState::Success { percent, .. } => println!("[nanocas] {percent}% done"),
            JobState::Failure { code, message } => println!("[nanocas] failed: {code} {message}"),
        }
        last = update.state;
    }
    last
}

fn check(layout: &ProjectLayout) -> Result<()> {
    let info = config::load_alert_info(layout.alert_config())?;
    let index = layout.select_index()?;
    let log = CoverageLog::new(layout.coverage_log());
    let header_ok = coverage_header_ok(log.path())?;

    println!("nanocas check");
    println!("  project      = {}", layout.root().display());
    println!("  fileType     = {}", info.file_type);
    println!("  device       = {}", display_or_none(&info.device));
    println!("  index        = {}", index.display());
    println!("  store        = {}", presence(&layout.store()));
    println!("  coverage log = {}", if header_ok { "ok" } else { "missing" });
    println!();
    println!("queries ({}):", info.queries.len());
    for q in &info.queries {
        let current = q
            .current_value
            .map(|v| format!("{v:.2}x"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  - {} (header: {}) threshold {}x, current {current}{}",
            q.name,
            display_or_none(&q.header),
            q.threshold,
            if q.triggered { " [triggered]" } else { "" }
        );
    }
    Ok(())
}

/// `Ok(false)` when the log does not exist yet; an error when it exists with
/// a different header.
fn coverage_header_ok(path: &Path) -> Result<bool> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e).with_context(|| format!("reading {path:?}")),
    };
    match contents.lines().next() {
        Some(line) if line.trim_end() == COVERAGE_HEADER => Ok(true),
        other => bail!(
            "coverage log {path:?} has unexpected header {:?}",
            other.unwrap_or_default()
        ),
    }
}

fn presence(path: &Path) -> &'static str {
    if path.exists() { "present" } else { "absent" }
}

fn display_or_none(s: &str) -> &str {
    if s.trim().is_empty() { "<none>" } else { s }
}

async fn wait_for_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("Ctrl+C received; shutting down");
}
