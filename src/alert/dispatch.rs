// src/alert/dispatch.rs

//! Delivery of alert messages to the configured channels.
//!
//! Each channel is attempted independently: a failing channel is logged and
//! does not keep the remaining channels from being tried.

use std::fmt::{self, Debug};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::project::NotificationConfig;
use crate::errors::Result;
use crate::types::Severity;

/// Subject line used for e-mail alerts.
pub const EMAIL_SUBJECT: &str = "nanoCAS Alert";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Message log of the sequencing device.
    DevicePush,
    Email,
    Sms,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::DevicePush => write!(f, "device-push"),
            Channel::Email => write!(f, "email"),
            Channel::Sms => write!(f, "sms"),
        }
    }
}

/// Transport for outgoing notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync + Debug {
    async fn send(
        &self,
        channel: Channel,
        target: &str,
        message: &str,
        severity: Severity,
    ) -> Result<()>;
}

/// Sink that only writes notifications to the log.
#[derive(Debug, Clone, Default)]
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn send(
        &self,
        channel: Channel,
        target: &str,
        message: &str,
        severity: Severity,
    ) -> Result<()> {
        match channel {
            Channel::Email => info!(
                %channel, to = target, subject = EMAIL_SUBJECT, level = severity.level(), "{message}"
            ),
            _ => info!(%channel, to = target, level = severity.level(), "{message}"),
        }
        Ok(())
    }
}

/// Outcome of delivering one message over one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchResult {
    pub channel: Channel,
    pub target: String,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AlertDispatcher {
    sink: Arc<dyn NotificationSink>,
}

impl AlertDispatcher {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink }
    }

    /// Channels (and their targets) a message should go out on.
    ///
    /// Enabled channels with incomplete settings are logged and left out.
    pub fn routes(device: &str, config: &NotificationConfig) -> Vec<(Channel, String)> {
        let mut routes = Vec::new();

        if !device.trim().is_empty() {
            routes.push((Channel::DevicePush, device.trim().to_string()));
        }

        if config.enable_email {
            match config.email_config.as_ref().filter(|c| c.is_complete()) {
                Some(email) => routes.push((
                    Channel::Email,
                    email.recipient.clone().unwrap_or_default(),
                )),
                None => error!("Email configuration is incomplete; skipping e-mail alert"),
            }
        }

        if config.enable_sms {
            match config.sms_target() {
                Some(target) => routes.push((Channel::Sms, target.to_string())),
                None => error!("SMS recipient phone number is missing; skipping SMS alert"),
            }
        }

        routes
    }

    /// Deliver `message` on every configured channel.
    pub async fn dispatch(
        &self,
        project_id: &str,
        device: &str,
        config: &NotificationConfig,
        message: &str,
        severity: Severity,
    ) -> Vec<DispatchResult> {
        let routes = Self::routes(device, config);
        let mut results = Vec::with_capacity(routes.len());

        for (channel, target) in routes {
            let start = Instant::now();
            let outcome = self.sink.send(channel, &target, message, severity).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            let error = match outcome {
                Ok(()) => {
                    info!(project = project_id, %channel, duration_ms, "alert delivered");
                    None
                }
                Err(e) => {
                    warn!(
                        project = project_id,
                        %channel,
                        error = %e,
                        duration_ms,
                        "alert delivery failed"
                    );
                    Some(e.to_string())
                }
            };

            results.push(DispatchResult {
                channel,
                target,
                success: error.is_none(),
                error,
            });
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::project::EmailConfig;
    use crate::errors::NanocasError;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct Recording {
        sent: Mutex<Vec<(Channel, String)>>,
        fail: Option<Channel>,
    }

    #[async_trait]
    impl NotificationSink for Recording {
        async fn send(&self, channel: Channel, target: &str, _: &str, _: Severity) -> Result<()> {
            self.sent.lock().unwrap().push((channel, target.to_string()));
            if self.fail == Some(channel) {
                return Err(NanocasError::Channel {
                    channel: channel.to_string(),
                    reason: "unreachable".into(),
                });
            }
            Ok(())
        }
    }

    fn full_config() -> NotificationConfig {
        NotificationConfig {
            enable_email: true,
            email_config: Some(EmailConfig {
                sender: Some("lab@example.org".into()),
                recipient: Some("oncall@example.org".into()),
                smtp_server: Some("smtp.example.org".into()),
                smtp_port: Some(587),
                password: Some("secret".into()),
            }),
            enable_sms: true,
            sms_recipient: Some("+15550100".into()),
        }
    }

    #[test]
    fn routes_skip_incomplete_channels() {
        let mut config = full_config();
        if let Some(email) = config.email_config.as_mut() {
            email.password = None;
        }
        config.sms_recipient = Some("  ".into());

        let routes = AlertDispatcher::routes("MN1", &config);
        assert_eq!(routes, vec![(Channel::DevicePush, "MN1".to_string())]);
        assert!(AlertDispatcher::routes("", &NotificationConfig::default()).is_empty());
    }

    #[tokio::test]
    async fn failing_channel_does_not_block_others() {
        let sink = Arc::new(Recording {
            fail: Some(Channel::Email),
            ..Recording::default()
        });
        let dispatcher = AlertDispatcher::new(sink.clone());

        let results = dispatcher
            .dispatch("p1", "MN1", &full_config(), "Alert", Severity::Warning)
            .await;

        assert_eq!(results.len(), 3);
        assert!(results[0].success);
        assert!(!results[1].success);
        assert!(results[2].success);
        assert_eq!(sink.sent.lock().unwrap().len(), 3);
    }
}
