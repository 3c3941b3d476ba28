//! Chat delivery through Slack's `chat.postMessage`.

use super::{DispatchError, Dispatcher, Message, Recipients};
use crate::config::SlackConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

const CHANNEL: &str = "slack";
const DEFAULT_BASE_URL: &str = "https://slack.com/api";

#[derive(Clone)]
pub struct SlackDispatcher {
    client: Client,
    base_url: String,
    config: SlackConfig,
}

impl std::fmt::Debug for SlackDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackDispatcher")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl SlackDispatcher {
    pub fn new(config: SlackConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            config,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn post(&self, target: &str, text: &str) -> Result<(), DispatchError> {
        let payload = serde_json::json!({
            "channel": target,
            "text": text,
            "mrkdwn": true,
        });
        let response = self
            .client
            .post(format!("{}/chat.postMessage", self.base_url))
            .bearer_auth(&self.config.bot_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| DispatchError::Network {
                channel: CHANNEL,
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DispatchError::Http {
                channel: CHANNEL,
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("").to_string(),
            });
        }
        let body = response
            .json::<Value>()
            .await
            .map_err(|e| DispatchError::Network {
                channel: CHANNEL,
                message: e.to_string(),
            })?;
        check_response(&body)
    }
}

/// Slack answers HTTP 200 with `{"ok": false, "error": ...}` on rejection.
fn check_response(body: &Value) -> Result<(), DispatchError> {
    if body.get("ok").and_then(|v| v.as_bool()) == Some(true) {
        return Ok(());
    }
    let reason = body
        .get("error")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown_error")
        .to_string();
    Err(DispatchError::Rejected {
        channel: CHANNEL,
        reason,
    })
}

#[async_trait]
impl Dispatcher for SlackDispatcher {
    fn name(&self) -> &'static str {
        CHANNEL
    }

    /// Posts to every channel and user. Fails if any post failed, after trying all.
    async fn send(
        &self,
        message: &dyn Message,
        recipients: &Recipients,
    ) -> Result<(), DispatchError> {
        let text = message.render_rich();
        let mut first_error = None;
        for target in recipients.chat_targets() {
            if let Err(e) = self.post(target, &text).await {
                tracing::warn!(target = %target, error = %e, "slack post failed");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
