// src/config/loader.rs

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{RawSettings, Settings};
use crate::config::project::AlertInfo;
use crate::config::validate::validate_alert_info;
use crate::errors::{NanocasError, Result};

/// Load engine settings from a given path and return the raw `RawSettings`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_settings`] for that.
pub fn load_raw_settings(path: impl AsRef<Path>) -> Result<RawSettings> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let raw: RawSettings = toml::from_str(&contents)?;

    Ok(raw)
}

/// Load engine settings from path and validate them.
pub fn load_settings(path: impl AsRef<Path>) -> Result<Settings> {
    let raw = load_raw_settings(&path)?;
    Settings::try_from(raw)
}

/// Load settings, falling back to defaults when the file does not exist.
///
/// Only used for the implicit default path; an explicitly requested file
/// that is missing is reported as an error by [`load_settings`].
pub fn load_settings_or_default(path: impl AsRef<Path>) -> Result<Settings> {
    let path = path.as_ref();
    if !path.exists() {
        debug!(?path, "settings file not found; using defaults");
        return Ok(Settings::default());
    }
    load_settings(path)
}

/// Helper to resolve the default settings path (`Nanocas.toml` in the
/// current working directory).
pub fn default_settings_path() -> PathBuf {
    PathBuf::from("Nanocas.toml")
}

/// Read and validate a project's `alertinfo.cfg`.
///
/// Both a missing file and malformed JSON are configuration errors: the
/// project cannot be watched until the registry has written it correctly.
pub fn load_alert_info(path: impl AsRef<Path>) -> Result<AlertInfo> {
    let path = path.as_ref();
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(NanocasError::config(format!(
                "missing project configuration {}",
                path.display()
            )));
        }
        Err(e) => return Err(e.into()),
    };

    let info: AlertInfo = serde_json::from_str(&contents).map_err(|e| {
        NanocasError::config(format!("malformed project configuration {}: {e}", path.display()))
    })?;

    validate_alert_info(&info)?;
    Ok(info)
}
