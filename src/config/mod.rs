// src/config/mod.rs

//! Configuration loading and validation for nanocas.
//!
//! Responsibilities:
//! - Engine settings from TOML (`model.rs`).
//! - Per-project alert configuration from JSON (`project.rs`).
//! - Loading both from disk (`loader.rs`) and validating them (`validate.rs`).
//! - Holding a project's configuration for concurrent readers and writers
//!   (`store.rs`).

pub mod loader;
pub mod model;
pub mod project;
pub mod store;
pub mod validate;

pub use loader::{
    default_settings_path, load_alert_info, load_settings, load_settings_or_default,
};
pub use model::{RawSettings, Settings};
pub use project::{AlertInfo, EmailConfig, NotificationConfig, Query};
pub use store::{JsonConfigStore, MemoryConfigStore, ProjectConfigStore, update_blocking};
pub use validate::validate_alert_info;
