// src/engine/project.rs

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, Local};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::alert::{self, AlertDispatcher, FiredAlert};
use crate::config::{AlertInfo, JsonConfigStore, ProjectConfigStore, update_blocking};
use crate::coverage::{self, CoverageLog, CoverageRecord};
use crate::engine::context::EngineContext;
use crate::engine::events::EngineEvent;
use crate::errors::Result;
use crate::layout::ProjectLayout;
use crate::pipeline::{CumulativeStore, IngestOutcome, StagedStore, StepOutcome, prepare_artifact};
use crate::types::{FileKind, ProjectId, Severity};
use crate::watch::ledger::{FileLedgerStore, ProcessedLedger};
use crate::watch::patterns::ArrivalFilter;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Everything one watched project owns: its configuration, ledger, store and
/// the locks serializing access to them.
pub struct ProjectRuntime {
    id: ProjectId,
    layout: ProjectLayout,
    kind: FileKind,
    filter: ArrivalFilter,
    ctx: Arc<EngineContext>,
    config: Arc<dyn ProjectConfigStore>,
    ledger: Mutex<ProcessedLedger>,
    merge_lock: Mutex<()>,
    store: CumulativeStore,
    coverage_log: CoverageLog,
    dispatcher: AlertDispatcher,
}

impl fmt::Debug for ProjectRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectRuntime")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("root", &self.layout.root())
            .finish_non_exhaustive()
    }
}

impl ProjectRuntime {
    /// Load a project from its directory: configuration and ledger.
    ///
    /// A missing or malformed `alertinfo.cfg` is a configuration error.
    pub fn open(id: &str, layout: ProjectLayout, ctx: Arc<EngineContext>) -> Result<Self> {
        let config = Arc::new(JsonConfigStore::open(layout.alert_config())?);
        let ledger = ProcessedLedger::open(Box::new(FileLedgerStore::new(layout.ledger())))?;
        Self::with_parts(id, layout, ctx, config, ledger)
    }

    pub fn with_parts(
        id: &str,
        layout: ProjectLayout,
        ctx: Arc<EngineContext>,
        config: Arc<dyn ProjectConfigStore>,
        ledger: ProcessedLedger,
    ) -> Result<Self> {
        let kind = config.snapshot().file_type;
        let filter = ArrivalFilter::for_kind(kind)?;
        Ok(Self {
            id: id.to_string(),
            store: CumulativeStore::new(&layout),
            coverage_log: CoverageLog::new(layout.coverage_log()),
            dispatcher: AlertDispatcher::new(ctx.notifier.clone()),
            layout,
            kind,
            filter,
            ctx,
            config,
            ledger: Mutex::new(ledger),
            merge_lock: Mutex::new(()),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    pub fn kind(&self) -> FileKind {
        self.kind
    }

    pub fn filter(&self) -> &ArrivalFilter {
        &self.filter
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    pub fn config(&self) -> &Arc<dyn ProjectConfigStore> {
        &self.config
    }

    pub fn store(&self) -> &CumulativeStore {
        &self.store
    }

    pub async fn is_processed(&self, path: &Path) -> bool {
        self.ledger.lock().await.contains(path)
    }

    /// Claim `path` for ingestion; `false` when it is processed or in flight.
    pub async fn claim(&self, path: &Path) -> bool {
        self.ledger.lock().await.try_claim(path)
    }

    pub async fn release(&self, path: &Path) {
        self.ledger.lock().await.release(path);
    }

    pub async fn mark_processed(&self, path: &Path) {
        if let Err(e) = self.ledger.lock().await.complete(path) {
            error!(project = %self.id, ?path, error = %e, "failed to record processed file");
        }
    }

    /// Align, validate and merge one stable file, then run the coverage pass
    /// and alert evaluation for the new store.
    ///
    /// The file is recorded in the ledger in the same step that swaps its
    /// contribution into the store. Recording invalid files, or releasing
    /// files whose tools failed, is up to the caller.
    pub async fn ingest(&self, source: &Path) -> Result<IngestOutcome> {
        let artifact =
            match prepare_artifact(&*self.ctx.tools, &self.layout, self.kind, source).await? {
                StepOutcome::Ready(artifact) => artifact,
                StepOutcome::ToolFailed(f) => return Ok(IngestOutcome::ToolFailed(f)),
                StepOutcome::Invalid(p) => return Ok(IngestOutcome::Invalid(p)),
            };
        let timestamp = self.arrival_timestamp(source);

        let merging = self.merge_lock.lock().await;
        let staged = match self.store.stage(&*self.ctx.tools, artifact.path()).await? {
            StepOutcome::Ready(staged) => staged,
            StepOutcome::ToolFailed(f) => return Ok(IngestOutcome::ToolFailed(f)),
            StepOutcome::Invalid(p) => return Ok(IngestOutcome::Invalid(p)),
        };
        drop(artifact);
        self.commit(staged, source).await?;
        info!(project = %self.id, ?source, store = ?self.store.path(), "merged artifact into store");

        let records = match self.coverage_pass(&timestamp).await {
            Ok(records) => records,
            Err(e) => {
                error!(project = %self.id, error = %e, "coverage pass failed");
                return Ok(IngestOutcome::Merged {
                    records: 0,
                    alerts: 0,
                });
            }
        };
        let evaluated = self.evaluate_alerts(&records).await;
        drop(merging);

        let alerts = match evaluated {
            Some((info, fired)) => {
                self.dispatch_alerts(&info, &fired).await;
                fired.len()
            }
            None => 0,
        };

        Ok(IngestOutcome::Merged {
            records: records.len(),
            alerts,
        })
    }

    /// Swap a staged store into place and record `source` as processed.
    ///
    /// The ledger lock is taken before the swap and nothing is awaited
    /// between the swap and the ledger write, so an aborted unit never leaves
    /// a merged file unrecorded.
    async fn commit(&self, staged: StagedStore, source: &Path) -> Result<()> {
        let mut ledger = self.ledger.lock().await;
        if let Err(e) = staged.commit() {
            drop(ledger);
            self.store.restore_index(&*self.ctx.tools).await;
            return Err(e.into());
        }
        if let Err(e) = ledger.complete(source) {
            error!(project = %self.id, ?source, error = %e, "failed to record processed file");
        }
        Ok(())
    }

    /// Compute coverage for the current store, append it to the coverage log
    /// and emit it as one event.
    ///
    /// Callers must hold the merge lock so the store does not change
    /// underneath the pass.
    async fn coverage_pass(&self, timestamp: &str) -> Result<Vec<CoverageRecord>> {
        let records = coverage::compute_pass(
            &*self.ctx.coverage,
            self.store.path(),
            self.store.index(),
            timestamp,
        )
        .await?;

        self.coverage_log.append(&records)?;
        info!(project = %self.id, references = records.len(), %timestamp, "coverage pass recorded");

        self.ctx.events.emit(EngineEvent::CoverageUpdate {
            project_id: self.id.clone(),
            timestamp: timestamp.to_string(),
            coverage: records.clone(),
        });
        Ok(records)
    }

    /// Run the edge-triggered evaluation and persist the updated queries.
    ///
    /// Returns the saved configuration with the alerts that fired, or `None`
    /// when the query state could not be saved.
    async fn evaluate_alerts(
        &self,
        records: &[CoverageRecord],
    ) -> Option<(AlertInfo, Vec<FiredAlert>)> {
        let records = records.to_vec();
        let updated = update_blocking(Arc::clone(&self.config), move |info: &mut AlertInfo| {
            alert::evaluate(&mut info.queries, &records)
        })
        .await;
        match updated {
            Ok(evaluated) => Some(evaluated),
            Err(e) => {
                // The in-memory state is unchanged, so the same crossing is
                // evaluated again on the next pass.
                error!(project = %self.id, error = %e, "failed to persist query state");
                None
            }
        }
    }

    async fn dispatch_alerts(&self, info: &AlertInfo, fired: &[FiredAlert]) {
        for alert in fired {
            error!(project = %self.id, query = %alert.query, value = alert.value, "{}", alert.message);
            self.ctx.events.emit(EngineEvent::AlertFired {
                project_id: self.id.clone(),
                alert: alert.clone(),
            });
            self.dispatcher
                .dispatch(
                    &self.id,
                    &info.device,
                    &info.alert_notif_config,
                    &alert.message,
                    Severity::Warning,
                )
                .await;
        }
    }

    fn arrival_timestamp(&self, source: &Path) -> String {
        let when = self.ctx.fs.modified(source).unwrap_or_else(|e| {
            warn!(?source, error = %e, "no modification time; stamping with current time");
            SystemTime::now()
        });
        DateTime::<Local>::from(when).format(TIMESTAMP_FORMAT).to_string()
    }
}
