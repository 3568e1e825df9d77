// src/engine/events.rs

//! Structured events pushed to the real-time sink.

use std::fmt::Debug;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::alert::FiredAlert;
use crate::coverage::CoverageRecord;
use crate::types::ProjectId;

/// Lifecycle status reported for a project's watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WatcherStatus {
    Started,
    AlreadyRunning,
    Stopped,
    NotRunning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum EngineEvent {
    /// One coverage pass; every record shares `timestamp`.
    CoverageUpdate {
        project_id: ProjectId,
        timestamp: String,
        coverage: Vec<CoverageRecord>,
    },
    WatcherLifecycle {
        project_id: ProjectId,
        status: WatcherStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    AlertFired {
        project_id: ProjectId,
        alert: FiredAlert,
    },
}

impl EngineEvent {
    pub fn lifecycle(project_id: &str, status: WatcherStatus) -> Self {
        EngineEvent::WatcherLifecycle {
            project_id: project_id.to_string(),
            status,
            message: None,
        }
    }

    pub fn lifecycle_error(project_id: &str, message: impl Into<String>) -> Self {
        EngineEvent::WatcherLifecycle {
            project_id: project_id.to_string(),
            status: WatcherStatus::Error,
            message: Some(message.into()),
        }
    }

    pub fn project_id(&self) -> &str {
        match self {
            EngineEvent::CoverageUpdate { project_id, .. }
            | EngineEvent::WatcherLifecycle { project_id, .. }
            | EngineEvent::AlertFired { project_id, .. } => project_id,
        }
    }
}

/// Destination for engine events. Emitting never blocks and never fails the
/// caller.
pub trait EventSink: Send + Sync + Debug {
    fn emit(&self, event: EngineEvent);
}

/// Forwards events into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl ChannelEventSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: EngineEvent) {
        if self.tx.send(event).is_err() {
            debug!("event receiver dropped; discarding event");
        }
    }
}

/// Logs every event as a JSON payload.
#[derive(Debug, Clone, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: EngineEvent) {
        match serde_json::to_string(&event) {
            Ok(payload) => info!(project = %event.project_id(), %payload, "engine event"),
            Err(e) => debug!(error = %e, "failed to serialize engine event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_tag_and_camel_case_fields() {
        let event = EngineEvent::CoverageUpdate {
            project_id: "p1".into(),
            timestamp: "2024-03-01 10:00:00".into(),
            coverage: vec![CoverageRecord {
                timestamp: "2024-03-01 10:00:00".into(),
                reference: "geneA".into(),
                depth: 1.5,
                breadth: 50.0,
                read_count: 4,
            }],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "coverage_update");
        assert_eq!(json["projectId"], "p1");
        assert_eq!(json["coverage"][0]["read_count"], 4);

        let json = serde_json::to_value(EngineEvent::lifecycle("p1", WatcherStatus::AlreadyRunning))
            .unwrap();
        assert_eq!(json["event"], "watcher_lifecycle");
        assert_eq!(json["status"], "already_running");
        assert!(json.get("message").is_none());
    }

    #[test]
    fn channel_sink_survives_dropped_receiver() {
        let (sink, rx) = ChannelEventSink::new();
        drop(rx);
        sink.emit(EngineEvent::lifecycle("p1", WatcherStatus::Stopped));
    }
}
