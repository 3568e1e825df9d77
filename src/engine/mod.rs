// src/engine/mod.rs

//! Ingestion engine for nanocas.
//!
//! This module ties together:
//! - the shared collaborators of all projects ([`context`])
//! - the per-project runtime that owns ledger, store and locks ([`project`])
//! - the registry of live watchers with its start/stop/status lifecycle
//!   ([`manager`])
//! - the structured events pushed to the real-time sink ([`events`])

pub mod context;
pub mod events;
pub mod manager;
pub mod project;

pub use context::EngineContext;
pub use events::{ChannelEventSink, EngineEvent, EventSink, TracingEventSink, WatcherStatus};
pub use manager::{StartStatus, StopStatus, WatcherManager};
pub use project::ProjectRuntime;
