//! Outbound notifications: renderable payloads and transports.

use crate::config::MessagingConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod alert;
pub mod mock;
pub mod slack;
pub mod twilio;

pub use alert::{FlightAlert, SpotPriceAlert};
pub use mock::RecordingDispatcher;
pub use slack::SlackDispatcher;
pub use twilio::TwilioDispatcher;

/// Per-transport send deadline.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Anything that can be rendered for a human.
pub trait Message: Send + Sync {
    /// Plain text for SMS and logs.
    fn render_plaintext(&self) -> String;

    /// Markdown-flavoured text for chat transports.
    fn render_rich(&self) -> String;
}

/// Where a notification should go. Empty fields are skipped by the transports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipients {
    pub sms_number: Option<String>,
    pub chat_channel_ids: Vec<String>,
    pub chat_user_ids: Vec<String>,
}

impl Recipients {
    pub fn has_chat(&self) -> bool {
        !self.chat_channel_ids.is_empty() || !self.chat_user_ids.is_empty()
    }

    /// Chat destinations, channels first.
    pub fn chat_targets(&self) -> impl Iterator<Item = &str> {
        self.chat_channel_ids
            .iter()
            .chain(self.chat_user_ids.iter())
            .map(|s| s.as_str())
    }
}

#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    #[error("{channel} request failed: {message}")]
    Network { channel: &'static str, message: String },
    #[error("{channel} returned HTTP {status}: {message}")]
    Http {
        channel: &'static str,
        status: u16,
        message: String,
    },
    #[error("{channel} rejected the message: {reason}")]
    Rejected { channel: &'static str, reason: String },
    #[error("{0} did not answer within the send timeout")]
    Timeout(&'static str),
    #[error("not delivered: {0}")]
    Undelivered(String),
    #[error("no messaging transport configured")]
    NoTransport,
}

#[async_trait]
pub trait Dispatcher: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Whether a successful send reaches a recipient. Local sinks such as
    /// the log never count as a delivery.
    fn delivers(&self) -> bool {
        true
    }

    async fn send(&self, message: &dyn Message, recipients: &Recipients)
        -> Result<(), DispatchError>;
}

/// Writes the plaintext rendering to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDispatcher;

#[async_trait]
impl Dispatcher for LogDispatcher {
    fn name(&self) -> &'static str {
        "log"
    }

    fn delivers(&self) -> bool {
        false
    }

    async fn send(
        &self,
        message: &dyn Message,
        _recipients: &Recipients,
    ) -> Result<(), DispatchError> {
        tracing::info!(message = %message.render_plaintext(), "notification");
        Ok(())
    }
}

/// Sends through every configured transport.
///
/// Every delivering transport is attempted. The send fails if any of them
/// failed, so the caller keeps the notification pending and tries again.
/// Log sinks are always written but never mask a failed delivery.
#[derive(Debug, Clone, Default)]
pub struct FanoutDispatcher {
    transports: Vec<Arc<dyn Dispatcher>>,
    timeout: Option<Duration>,
}

impl FanoutDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transport(mut self, transport: Arc<dyn Dispatcher>) -> Self {
        self.transports.push(transport);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn from_config(config: &MessagingConfig) -> Self {
        let mut fanout = Self::new();
        if config.log_stdout {
            fanout = fanout.with_transport(Arc::new(LogDispatcher));
        }
        if let Some(twilio) = &config.twilio {
            fanout = fanout.with_transport(Arc::new(TwilioDispatcher::new(twilio.clone())));
        }
        if let Some(slack) = &config.slack {
            fanout = fanout.with_transport(Arc::new(SlackDispatcher::new(slack.clone())));
        }
        fanout
    }

    pub fn len(&self) -> usize {
        self.transports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transports.is_empty()
    }
}

#[async_trait]
impl Dispatcher for FanoutDispatcher {
    fn name(&self) -> &'static str {
        "fanout"
    }

    async fn send(
        &self,
        message: &dyn Message,
        recipients: &Recipients,
    ) -> Result<(), DispatchError> {
        if self.transports.is_empty() {
            return Err(DispatchError::NoTransport);
        }
        let timeout = self.timeout.unwrap_or(SEND_TIMEOUT);
        let mut failures = Vec::new();

        for transport in &self.transports {
            let outcome = tokio::time::timeout(timeout, transport.send(message, recipients))
                .await
                .unwrap_or(Err(DispatchError::Timeout(transport.name())));
            if let Err(e) = outcome {
                tracing::warn!(transport = transport.name(), error = %e, "transport failed");
                if transport.delivers() {
                    failures.push(e.to_string());
                }
            }
        }

        if !failures.is_empty() {
            return Err(DispatchError::Undelivered(failures.join("; ")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Note(&'static str);

    impl Message for Note {
        fn render_plaintext(&self) -> String {
            self.0.to_string()
        }

        fn render_rich(&self) -> String {
            format!("*{}*", self.0)
        }
    }

    #[derive(Debug)]
    struct Stalled;

    #[async_trait]
    impl Dispatcher for Stalled {
        fn name(&self) -> &'static str {
            "stalled"
        }

        async fn send(&self, _: &dyn Message, _: &Recipients) -> Result<(), DispatchError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    #[derive(Debug)]
    struct BrokenLog;

    #[async_trait]
    impl Dispatcher for BrokenLog {
        fn name(&self) -> &'static str {
            "broken-log"
        }

        fn delivers(&self) -> bool {
            false
        }

        async fn send(&self, _: &dyn Message, _: &Recipients) -> Result<(), DispatchError> {
            Err(DispatchError::Rejected {
                channel: "broken-log",
                reason: "closed".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_log_sink_does_not_mask_failed_delivery() {
        let sms = Arc::new(RecordingDispatcher::new());
        sms.set_failing(true);
        let fanout = FanoutDispatcher::new()
            .with_transport(Arc::new(LogDispatcher))
            .with_transport(sms.clone());

        let err = fanout
            .send(&Note("UA2614 took off"), &Recipients::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Undelivered(_)));
        assert_eq!(sms.attempts(), 1);
        assert_eq!(sms.count(), 0);
    }

    #[tokio::test]
    async fn test_one_failed_transport_fails_the_send() {
        let ok = Arc::new(RecordingDispatcher::new());
        let broken = Arc::new(RecordingDispatcher::new());
        broken.set_failing(true);
        let fanout = FanoutDispatcher::new()
            .with_transport(broken.clone())
            .with_transport(ok.clone());

        let err = fanout
            .send(&Note("hi"), &Recipients::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Undelivered(_)));
        // The healthy transport is still attempted.
        assert_eq!(ok.count(), 1);
    }

    #[tokio::test]
    async fn test_all_delivered_is_success() {
        let sms = Arc::new(RecordingDispatcher::new());
        let chat = Arc::new(RecordingDispatcher::new());
        let fanout = FanoutDispatcher::new()
            .with_transport(Arc::new(LogDispatcher))
            .with_transport(sms.clone())
            .with_transport(chat.clone());
        fanout.send(&Note("hi"), &Recipients::default()).await.unwrap();
        assert_eq!(sms.count(), 1);
        assert_eq!(chat.count(), 1);
    }

    #[tokio::test]
    async fn test_failing_log_sink_is_ignored() {
        let sms = Arc::new(RecordingDispatcher::new());
        let fanout = FanoutDispatcher::new()
            .with_transport(Arc::new(BrokenLog))
            .with_transport(sms.clone());
        fanout.send(&Note("hi"), &Recipients::default()).await.unwrap();
        assert_eq!(sms.count(), 1);
    }

    #[tokio::test]
    async fn test_log_only_fanout_succeeds() {
        let fanout = FanoutDispatcher::new().with_transport(Arc::new(LogDispatcher));
        fanout.send(&Note("hi"), &Recipients::default()).await.unwrap();
    }

    #[tokio::test]
    async fn test_stalled_transport_times_out() {
        let ok = Arc::new(RecordingDispatcher::new());
        let fanout = FanoutDispatcher::new()
            .with_transport(Arc::new(Stalled))
            .with_transport(ok.clone())
            .with_timeout(Duration::from_millis(20));
        let err = fanout
            .send(&Note("hi"), &Recipients::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("stalled"));
        assert_eq!(ok.count(), 1);
    }

    #[tokio::test]
    async fn test_empty_fanout_is_an_error() {
        let fanout = FanoutDispatcher::new();
        assert!(fanout.is_empty());
        let err = fanout
            .send(&Note("hi"), &Recipients::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::NoTransport));
    }

    #[test]
    fn test_from_config_builds_enabled_transports() {
        let config = MessagingConfig {
            log_stdout: true,
            twilio: None,
            slack: Some(crate::config::SlackConfig {
                bot_token: "xoxb".to_string(),
            }),
            recipients: Recipients::default(),
        };
        assert_eq!(FanoutDispatcher::from_config(&config).len(), 2);
    }

    #[test]
    fn test_chat_targets_order() {
        let recipients = Recipients {
            sms_number: None,
            chat_channel_ids: vec!["C1".to_string()],
            chat_user_ids: vec!["U1".to_string()],
        };
        assert!(recipients.has_chat());
        assert_eq!(recipients.chat_targets().collect::<Vec<_>>(), vec!["C1", "U1"]);
    }
}
