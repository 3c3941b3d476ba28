//! Gemini exchange ticker client.

use super::nonce::NonceProvider;
use super::{status_error, DataSourceError, SpotPriceSource};
use crate::config::GeminiCredentials;
use crate::domain::Decimal;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde_json::Value;
use sha2::Sha384;
use std::sync::Arc;
use tracing::debug;

type HmacSha384 = Hmac<Sha384>;

/// Signed headers for one private-API style request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub api_key: String,
    pub payload: String,
    pub signature: String,
}

/// Build Gemini's auth headers: base64 of `{"request", "nonce"}` signed with
/// HMAC-SHA384 over the base64 text, hex encoded.
pub fn sign_request(
    credentials: &GeminiCredentials,
    request_path: &str,
    nonce: u64,
) -> Result<SignedHeaders, DataSourceError> {
    let body = serde_json::json!({
        "request": request_path,
        "nonce": nonce.to_string(),
    });
    let payload = STANDARD.encode(body.to_string());

    let mut mac = HmacSha384::new_from_slice(credentials.api_secret.as_bytes())
        .map_err(|e| DataSourceError::Other(format!("invalid API secret: {}", e)))?;
    mac.update(payload.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());

    Ok(SignedHeaders {
        api_key: credentials.api_key.clone(),
        payload,
        signature,
    })
}

#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: String,
    credentials: Option<GeminiCredentials>,
    nonce: Arc<dyn NonceProvider>,
}

impl GeminiClient {
    pub fn new(
        base_url: String,
        credentials: Option<GeminiCredentials>,
        nonce: Arc<dyn NonceProvider>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            nonce,
        }
    }
}

#[async_trait]
impl SpotPriceSource for GeminiClient {
    async fn fetch_spot_price(&self, symbol: &str) -> Result<Decimal, DataSourceError> {
        let path = format!("/v1/pubticker/{}", symbol.to_lowercase());
        debug!(symbol = %symbol, "fetching spot price");

        let mut request = self.client.get(format!("{}{}", self.base_url, path));
        if let Some(credentials) = &self.credentials {
            let signed = sign_request(credentials, &path, self.nonce.next_nonce())?;
            request = request
                .header("Content-Type", "text/plain")
                .header("Cache-Control", "no-cache")
                .header("X-GEMINI-APIKEY", signed.api_key)
                .header("X-GEMINI-PAYLOAD", signed.payload)
                .header("X-GEMINI-SIGNATURE", signed.signature);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, &format!("symbol {}", symbol)));
        }
        let body = response
            .json::<Value>()
            .await
            .map_err(|e| DataSourceError::ParseError(e.to_string()))?;
        parse_ticker(&body)
    }
}

pub(crate) fn parse_ticker(body: &Value) -> Result<Decimal, DataSourceError> {
    let last = body
        .get("last")
        .and_then(|v| v.as_str())
        .ok_or_else(|| DataSourceError::ParseError("Missing last field".to_string()))?;
    Decimal::from_str_canonical(last)
        .map_err(|e| DataSourceError::ParseError(format!("Invalid last: {}", e)))
}
