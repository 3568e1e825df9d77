// src/jobs/queue.rs

//! Worker pool running database build jobs.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::context::EngineContext;
use crate::errors::{NanocasError, Result};
use crate::jobs::build::run_build;
use crate::jobs::{BuildRequest, JobFailure, JobId, JobState, JobUpdate};

struct QueuedJob {
    id: JobId,
    request: BuildRequest,
    updates: mpsc::UnboundedSender<JobUpdate>,
}

/// Caller's side of a submitted job.
#[derive(Debug)]
pub struct JobHandle {
    pub id: JobId,
    updates: mpsc::UnboundedReceiver<JobUpdate>,
    finished: bool,
}

impl JobHandle {
    /// Next update in the job's stream, `None` after the terminal state.
    ///
    /// A job dropped by a shutting-down queue before it ran ends with a
    /// `CANCELLED` failure.
    pub async fn next_update(&mut self) -> Option<JobUpdate> {
        if self.finished {
            return None;
        }
        match self.updates.recv().await {
            Some(update) => {
                self.finished = update.state.is_terminal();
                Some(update)
            }
            None => {
                self.finished = true;
                Some(JobUpdate {
                    job_id: self.id,
                    project_id: String::new(),
                    state: JobFailure::cancelled().into(),
                })
            }
        }
    }

    /// Skip the progress stream and wait for the terminal state.
    pub async fn wait(mut self) -> JobState {
        let mut last = JobState::from(JobFailure::cancelled());
        while let Some(update) = self.next_update().await {
            last = update.state;
        }
        last
    }
}

/// Fixed-size pool of workers sharing one job channel.
#[derive(Debug)]
pub struct JobQueue {
    tx: Mutex<Option<mpsc::UnboundedSender<QueuedJob>>>,
    cancel: CancellationToken,
    workers: AsyncMutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for QueuedJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedJob")
            .field("id", &self.id)
            .field("project", &self.request.project_id)
            .finish_non_exhaustive()
    }
}

impl JobQueue {
    /// Spawn `ctx.settings.jobs.workers` workers.
    pub fn start(ctx: Arc<EngineContext>) -> Self {
        let workers = ctx.settings.jobs.workers.max(1);
        let (tx, rx) = mpsc::unbounded_channel::<QueuedJob>();
        let rx = Arc::new(AsyncMutex::new(rx));
        let cancel = CancellationToken::new();

        let handles: Vec<JoinHandle<()>> = (0..workers)
            .map(|worker| {
                tokio::spawn(worker_loop(
                    worker,
                    Arc::clone(&ctx),
                    Arc::clone(&rx),
                    cancel.clone(),
                ))
            })
            .collect();

        info!(workers, "job queue started");
        Self {
            tx: Mutex::new(Some(tx)),
            cancel,
            workers: AsyncMutex::new(handles),
        }
    }

    /// Queue a build. The returned handle first yields `PENDING`.
    pub fn submit(&self, request: BuildRequest) -> Result<JobHandle> {
        let id = Uuid::new_v4();
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();

        let _ = updates_tx.send(JobUpdate {
            job_id: id,
            project_id: request.project_id.clone(),
            state: JobState::Pending,
        });

        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = guard
            .as_ref()
            .ok_or_else(|| NanocasError::config("job queue is shut down"))?;
        info!(job = %id, project = %request.project_id, "build job submitted");
        tx.send(QueuedJob {
            id,
            request,
            updates: updates_tx,
        })
        .map_err(|_| NanocasError::config("job queue is shut down"))?;

        Ok(JobHandle {
            id,
            updates: updates_rx,
            finished: false,
        })
    }

    /// Stop accepting jobs, cancel running ones and wait for the workers.
    pub async fn shutdown(&self) {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.cancel.cancel();

        let handles: Vec<JoinHandle<()>> = self.workers.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "job worker ended abnormally");
            }
        }
        info!("job queue stopped");
    }
}

async fn worker_loop(
    worker: usize,
    ctx: Arc<EngineContext>,
    rx: Arc<AsyncMutex<mpsc::UnboundedReceiver<QueuedJob>>>,
    cancel: CancellationToken,
) {
    loop {
        let job = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            job = async { rx.lock().await.recv().await } => job,
        };
        let Some(job) = job else { break };

        debug!(worker, job = %job.id, "worker picked up job");
        run_job(&ctx, job, &cancel).await;
    }
    debug!(worker, "job worker finished");
}

async fn run_job(ctx: &EngineContext, job: QueuedJob, cancel: &CancellationToken) {
    let QueuedJob {
        id,
        request,
        updates,
    } = job;

    let send = |state: JobState| {
        let _ = updates.send(JobUpdate {
            job_id: id,
            project_id: request.project_id.clone(),
            state,
        });
    };

    let mut on_progress = |state: JobState| send(state);
    let terminal = run_build(ctx, &request, &cancel.child_token(), &mut on_progress).await;
    info!(job = %id, project = %request.project_id, terminal = ?terminal, "build job finished");
    send(terminal);
}
