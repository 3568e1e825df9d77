// src/engine/context.rs

use std::sync::Arc;

use crate::alert::{LogNotificationSink, NotificationSink};
use crate::config::Settings;
use crate::coverage::CoverageSource;
use crate::engine::events::EventSink;
use crate::exec::{AlignmentToolkit, ExternalToolkit};
use crate::fs::{FileSystem, RealFileSystem};
use crate::layout::ProjectLayout;

/// Collaborators shared by every project and job.
///
/// Production code builds this with [`EngineContext::production`]; tests
/// fill the fields with fakes.
#[derive(Debug, Clone)]
pub struct EngineContext {
    pub settings: Settings,
    pub fs: Arc<dyn FileSystem>,
    pub tools: Arc<dyn AlignmentToolkit>,
    pub coverage: Arc<dyn CoverageSource>,
    pub notifier: Arc<dyn NotificationSink>,
    pub events: Arc<dyn EventSink>,
}

impl EngineContext {
    pub fn production(settings: Settings, events: Arc<dyn EventSink>) -> Self {
        let toolkit = Arc::new(ExternalToolkit::new(&settings.tools));
        Self {
            settings,
            fs: Arc::new(RealFileSystem),
            tools: toolkit.clone(),
            coverage: toolkit,
            notifier: Arc::new(LogNotificationSink),
            events,
        }
    }

    pub fn layout(&self, project_id: &str) -> ProjectLayout {
        ProjectLayout::for_project(&self.settings.paths.projects_root(), project_id)
    }
}
