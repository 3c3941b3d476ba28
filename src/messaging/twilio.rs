//! SMS delivery through Twilio's Messages API.

use super::{DispatchError, Dispatcher, Message, Recipients};
use crate::config::TwilioConfig;
use async_trait::async_trait;
use reqwest::Client;

const CHANNEL: &str = "twilio";
const DEFAULT_BASE_URL: &str = "https://api.twilio.com";

#[derive(Clone)]
pub struct TwilioDispatcher {
    client: Client,
    base_url: String,
    config: TwilioConfig,
}

impl std::fmt::Debug for TwilioDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwilioDispatcher")
            .field("base_url", &self.base_url)
            .field("account_sid", &self.config.account_sid)
            .field("from_number", &self.config.from_number)
            .finish_non_exhaustive()
    }
}

impl TwilioDispatcher {
    pub fn new(config: TwilioConfig) -> Self {
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

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url, self.config.account_sid
        )
    }
}

#[async_trait]
impl Dispatcher for TwilioDispatcher {
    fn name(&self) -> &'static str {
        CHANNEL
    }

    async fn send(
        &self,
        message: &dyn Message,
        recipients: &Recipients,
    ) -> Result<(), DispatchError> {
        let Some(to) = recipients.sms_number.as_deref() else {
            tracing::debug!("no SMS recipient, skipping twilio");
            return Ok(());
        };

        let body = message.render_plaintext();
        let form = [
            ("To", to),
            ("From", self.config.from_number.as_str()),
            ("Body", body.as_str()),
        ];
        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(|e| DispatchError::Network {
                channel: CHANNEL,
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(DispatchError::Http {
                channel: CHANNEL,
                status: status.as_u16(),
                message: error_message(&text),
            });
        }
        Ok(())
    }
}

/// Pull Twilio's `message` field out of an error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}
