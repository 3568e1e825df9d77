//! Recording implementations of the engine's outbound seams.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use nanocas::alert::{Channel, FiredAlert, NotificationSink};
use nanocas::coverage::CoverageRecord;
use nanocas::engine::{EngineEvent, EventSink, WatcherStatus};
use nanocas::errors::{NanocasError, Result};
use nanocas::types::Severity;

/// Keeps every emitted event in order.
#[derive(Debug, Clone, Default)]
pub struct RecordingEventSink {
    events: Arc<Mutex<Vec<EngineEvent>>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Coverage payloads of every `coverage_update`, oldest first.
    pub fn coverage_updates(&self) -> Vec<Vec<CoverageRecord>> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                EngineEvent::CoverageUpdate { coverage, .. } => Some(coverage),
                _ => None,
            })
            .collect()
    }

    pub fn alerts(&self) -> Vec<FiredAlert> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                EngineEvent::AlertFired { alert, .. } => Some(alert),
                _ => None,
            })
            .collect()
    }

    pub fn lifecycle(&self) -> Vec<WatcherStatus> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                EngineEvent::WatcherLifecycle { status, .. } => Some(status),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: EngineEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentNotification {
    pub channel: Channel,
    pub target: String,
    pub message: String,
    pub severity: Severity,
}

/// Records notifications; channels can be made to fail.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<SentNotification>>>,
    failing: Arc<Mutex<HashSet<Channel>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_channel(&self, channel: Channel) {
        self.failing.lock().unwrap().insert(channel);
    }

    /// Successfully delivered notifications.
    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingNotifier {
    async fn send(
        &self,
        channel: Channel,
        target: &str,
        message: &str,
        severity: Severity,
    ) -> Result<()> {
        if self.failing.lock().unwrap().contains(&channel) {
            return Err(NanocasError::Channel {
                channel: channel.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        self.sent.lock().unwrap().push(SentNotification {
            channel,
            target: target.to_string(),
            message: message.to_string(),
            severity,
        });
        Ok(())
    }
}
