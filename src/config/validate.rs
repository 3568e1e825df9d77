// src/config/validate.rs

use crate::config::model::{RawSettings, Settings};
use crate::config::project::AlertInfo;
use crate::errors::{NanocasError, Result};

impl TryFrom<RawSettings> for Settings {
    type Error = NanocasError;

    fn try_from(raw: RawSettings) -> std::result::Result<Self, Self::Error> {
        validate_raw_settings(&raw)?;
        Ok(Settings::new_unchecked(raw))
    }
}

fn validate_raw_settings(raw: &RawSettings) -> Result<()> {
    validate_stability(raw)?;
    validate_tools(raw)?;

    if raw.jobs.workers == 0 {
        return Err(NanocasError::config(
            "[jobs].workers must be >= 1 (got 0)",
        ));
    }

    Ok(())
}

fn validate_stability(raw: &RawSettings) -> Result<()> {
    let s = &raw.stability;

    if s.interval_ms == 0 {
        return Err(NanocasError::config(
            "[stability].interval_ms must be >= 1 (got 0)",
        ));
    }
    if s.timeout_secs == 0 {
        return Err(NanocasError::config(
            "[stability].timeout_secs must be >= 1 (got 0)",
        ));
    }
    if s.interval() > s.timeout() {
        return Err(NanocasError::config(format!(
            "[stability].interval_ms ({}) is longer than timeout_secs ({})",
            s.interval_ms, s.timeout_secs
        )));
    }

    Ok(())
}

fn validate_tools(raw: &RawSettings) -> Result<()> {
    for (key, value) in [
        ("minimap2", &raw.tools.minimap2),
        ("samtools", &raw.tools.samtools),
    ] {
        if value.trim().is_empty() {
            return Err(NanocasError::config(format!(
                "[tools].{key} must not be empty"
            )));
        }
    }
    Ok(())
}

/// Semantic checks on a project's alert configuration.
pub fn validate_alert_info(info: &AlertInfo) -> Result<()> {
    for (i, query) in info.queries.iter().enumerate() {
        if !query.threshold.is_finite() || query.threshold < 0.0 {
            return Err(NanocasError::config(format!(
                "query #{i} ('{}') has invalid threshold {}",
                query.name, query.threshold
            )));
        }
    }
    Ok(())
}
