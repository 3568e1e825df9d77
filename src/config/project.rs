// src/config/project.rs

//! Per-project configuration (`alertinfo.cfg`).
//!
//! The file is written by the external project registry and is JSON:
//!
//! ```json
//! {
//!   "projectId": "0b6c...",
//!   "device": "MN12345",
//!   "fileType": "FASTQ",
//!   "queries": [
//!     { "name": "blaKPC", "file": "/refs/kpc.fa", "threshold": "5",
//!       "header": "", "current_value": 0.0 }
//!   ],
//!   "alertNotifConfig": {
//!     "enableEmail": true,
//!     "emailConfig": { "sender": "...", "recipient": "...",
//!                      "smtpServer": "...", "smtpPort": 587, "password": "..." },
//!     "enableSMS": false,
//!     "smsRecipient": ""
//!   }
//! }
//! ```
//!
//! Keys this engine does not understand are kept in `extra` and written back
//! untouched, since the registry owns them.

use std::path::PathBuf;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::FileKind;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertInfo {
    #[serde(default)]
    pub project_id: String,

    /// Sequencing device to push alerts to; empty when none is configured.
    #[serde(default)]
    pub device: String,

    #[serde(default)]
    pub file_type: FileKind,

    #[serde(default)]
    pub queries: Vec<Query>,

    #[serde(default)]
    pub alert_notif_config: NotificationConfig,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A reference sequence of interest with an alert threshold.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Query {
    /// FASTA header of the reference, filled in by the database build job.
    /// Matched exactly against reference names in the cumulative store.
    #[serde(default)]
    pub header: String,

    /// Display name used in alert messages.
    #[serde(default)]
    pub name: String,

    /// Depth (x) at which the alert fires.
    #[serde(default, deserialize_with = "lenient_threshold")]
    pub threshold: f64,

    /// Depth observed in the most recent coverage pass, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_value: Option<f64>,

    /// Whether the last observation was at or above the threshold.
    #[serde(default)]
    pub triggered: bool,

    /// Source sequence file, consumed by the database build job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Query {
    pub fn new(name: impl Into<String>, threshold: f64) -> Self {
        Self {
            name: name.into(),
            threshold,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationConfig {
    #[serde(default)]
    pub enable_email: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_config: Option<EmailConfig>,

    #[serde(default, rename = "enableSMS")]
    pub enable_sms: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sms_recipient: Option<String>,
}

impl NotificationConfig {
    /// Recipient for SMS alerts when SMS is enabled and a number is present.
    pub fn sms_target(&self) -> Option<&str> {
        if !self.enable_sms {
            return None;
        }
        self.sms_recipient
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailConfig {
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub recipient: Option<String>,
    #[serde(default)]
    pub smtp_server: Option<String>,
    #[serde(default)]
    pub smtp_port: Option<u16>,
    #[serde(default)]
    pub password: Option<String>,
}

impl EmailConfig {
    /// All fields needed to deliver a message are present and non-empty.
    pub fn is_complete(&self) -> bool {
        let filled = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        filled(&self.sender)
            && filled(&self.recipient)
            && filled(&self.smtp_server)
            && self.smtp_port.is_some()
            && filled(&self.password)
    }
}

/// Thresholds arrive as JSON numbers or as numeric strings from the setup UI.
fn lenient_threshold<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(f64),
        Text(String),
    }

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::Text(s) if s.trim().is_empty() => Ok(0.0),
        NumberOrString::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|e| de::Error::custom(format!("invalid threshold {s:?}: {e}"))),
    }
}
