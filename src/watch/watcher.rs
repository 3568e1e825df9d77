// src/watch/watcher.rs

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use notify::event::{AccessKind, AccessMode, ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Handle for the filesystem watcher.
///
/// This exists mainly so the underlying `RecommendedWatcher` is kept alive for
/// as long as needed. Dropping this handle will stop file watching.
pub struct WatcherHandle {
    _inner: RecommendedWatcher,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle").finish()
    }
}

/// Start watching `source` (non-recursively) and forward raw notify events
/// into the async world.
pub fn spawn_source_watcher(
    source: &Path,
) -> Result<(WatcherHandle, mpsc::UnboundedReceiver<Event>)> {
    // Channel from the blocking notify callback into the async world.
    let (event_tx, event_rx) = mpsc::unbounded_channel::<Event>();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                // The receiver is gone once the project stops; late events are dropped.
                let _ = event_tx.send(event);
            }
            Err(err) => warn!(error = %err, "file watch error"),
        },
        Config::default(),
    )
    .context("creating filesystem watcher")?;

    watcher
        .watch(source, RecursiveMode::NonRecursive)
        .with_context(|| format!("watching {}", source.display()))?;

    info!("file watcher started on {:?}", source);

    Ok((WatcherHandle { _inner: watcher }, event_rx))
}

/// Paths in `event` that may be a newly arrived file.
///
/// Creation, content modification, completed writes and the destination of a
/// rename all qualify. Removals, reads and the source side of a rename do not.
pub fn arrival_paths(event: &Event) -> Vec<PathBuf> {
    match &event.kind {
        EventKind::Create(_) => event.paths.clone(),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Vec::new(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.last().cloned().into_iter().collect()
        }
        EventKind::Modify(_) => event.paths.clone(),
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => event.paths.clone(),
        EventKind::Access(_) | EventKind::Remove(_) => Vec::new(),
        EventKind::Any | EventKind::Other => event.paths.clone(),
    }
}
