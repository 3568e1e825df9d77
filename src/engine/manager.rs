// src/engine/manager.rs

//! Registry of live project watchers.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::engine::context::EngineContext;
use crate::engine::events::{EngineEvent, WatcherStatus};
use crate::engine::project::ProjectRuntime;
use crate::errors::{NanocasError, Result};
use crate::layout::ProjectLayout;
use crate::types::ProjectId;
use crate::watch::{WatcherHandle, run_arrival_loop, spawn_source_watcher};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartStatus {
    Started,
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopStatus {
    Stopped,
    NotRunning,
}

/// One live watch: the notify registration, the dispatch loop and the token
/// that cancels both.
#[derive(Debug)]
struct ProjectWatch {
    project: Arc<ProjectRuntime>,
    registration: WatcherHandle,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ProjectWatch {
    fn is_live(&self) -> bool {
        !self.task.is_finished()
    }

    async fn stop(self) {
        self.cancel.cancel();
        drop(self.registration);
        if let Err(e) = self.task.await
            && e.is_panic()
        {
            error!(project = %self.project.id(), error = %e, "arrival loop panicked");
        }
    }
}

/// Owns every project's watcher. At most one live watch exists per project
/// id.
#[derive(Debug)]
pub struct WatcherManager {
    ctx: Arc<EngineContext>,
    watches: Mutex<HashMap<ProjectId, ProjectWatch>>,
}

impl WatcherManager {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self {
            ctx,
            watches: Mutex::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.ctx
    }

    /// Start watching `source` for the project stored under the configured
    /// projects root.
    pub async fn start(&self, project_id: &str, source: &Path) -> Result<StartStatus> {
        let layout = self.ctx.layout(project_id);
        self.start_at(project_id, layout, source).await
    }

    /// Start watching `source` for the project rooted at `layout`.
    ///
    /// Idempotent: a second start for a live project reports
    /// [`StartStatus::AlreadyRunning`]. Configuration and registration errors
    /// leave the project unregistered.
    pub async fn start_at(
        &self,
        project_id: &str,
        layout: ProjectLayout,
        source: &Path,
    ) -> Result<StartStatus> {
        let mut watches = self.watches.lock().await;

        if let Some(existing) = watches.get(project_id) {
            if existing.is_live() {
                info!(project = project_id, "watcher already running");
                self.ctx
                    .events
                    .emit(EngineEvent::lifecycle(project_id, WatcherStatus::AlreadyRunning));
                return Ok(StartStatus::AlreadyRunning);
            }
            if let Some(dead) = watches.remove(project_id) {
                warn!(project = project_id, "replacing finished watcher");
                dead.stop().await;
            }
        }

        let watch = match self.spawn_watch(project_id, layout, source) {
            Ok(watch) => watch,
            Err(e) => {
                error!(project = project_id, error = %e, "failed to start watcher");
                self.ctx
                    .events
                    .emit(EngineEvent::lifecycle_error(project_id, e.to_string()));
                return Err(e);
            }
        };

        watches.insert(project_id.to_string(), watch);
        info!(project = project_id, ?source, "watcher started");
        self.ctx
            .events
            .emit(EngineEvent::lifecycle(project_id, WatcherStatus::Started));
        Ok(StartStatus::Started)
    }

    fn spawn_watch(
        &self,
        project_id: &str,
        layout: ProjectLayout,
        source: &Path,
    ) -> Result<ProjectWatch> {
        if !source.is_dir() {
            return Err(NanocasError::config(format!(
                "source directory {} does not exist",
                source.display()
            )));
        }
        // Ledger entries are absolute, whatever directory we were started from.
        let source = source.canonicalize().map_err(|e| {
            NanocasError::config(format!(
                "cannot resolve source directory {}: {e}",
                source.display()
            ))
        })?;
        let project = Arc::new(ProjectRuntime::open(project_id, layout, self.ctx.clone())?);
        let (registration, events) = spawn_source_watcher(&source)?;

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_arrival_loop(
            Arc::clone(&project),
            source,
            events,
            cancel.clone(),
        ));

        Ok(ProjectWatch {
            project,
            registration,
            cancel,
            task,
        })
    }

    /// Stop a project's watcher and cancel its in-flight work.
    pub async fn stop(&self, project_id: &str) -> StopStatus {
        let removed = self.watches.lock().await.remove(project_id);
        match removed {
            Some(watch) => {
                watch.stop().await;
                info!(project = project_id, "watcher stopped");
                self.ctx
                    .events
                    .emit(EngineEvent::lifecycle(project_id, WatcherStatus::Stopped));
                StopStatus::Stopped
            }
            None => {
                info!(project = project_id, "no watcher running");
                self.ctx
                    .events
                    .emit(EngineEvent::lifecycle(project_id, WatcherStatus::NotRunning));
                StopStatus::NotRunning
            }
        }
    }

    pub async fn status(&self, project_id: &str) -> bool {
        self.watches
            .lock()
            .await
            .get(project_id)
            .is_some_and(ProjectWatch::is_live)
    }

    /// Ids of projects with a live watcher.
    pub async fn running(&self) -> Vec<ProjectId> {
        let watches = self.watches.lock().await;
        let mut ids: Vec<ProjectId> = watches
            .iter()
            .filter(|(_, w)| w.is_live())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Stop every watcher.
    pub async fn shutdown(&self) {
        let drained: Vec<(ProjectId, ProjectWatch)> =
            self.watches.lock().await.drain().collect();
        for (project_id, watch) in drained {
            watch.stop().await;
            self.ctx
                .events
                .emit(EngineEvent::lifecycle(&project_id, WatcherStatus::Stopped));
        }
        info!("all watchers stopped");
    }
}
