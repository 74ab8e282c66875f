//! HTTP client for the relay's exchange endpoints.

use crate::models::{ExchangeRequest, ExchangeResult};
use crate::relay::{RelayError, RelayTransport};
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use std::time::Duration;

/// Default per-request timeout, independent of the poll interval.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for a pairlink relay.
///
/// Pairing endpoints are unauthenticated: the new device has no account
/// key yet, and every payload is sealed before it leaves the device.
pub struct HttpRelayClient {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpRelayClient {
    /// Create a new relay client for `relay_url`.
    pub fn new(relay_url: &str, timeout: Duration) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::Network(e.to_string()))?;

        let base_url = Url::parse(relay_url.trim_end_matches('/'))
            .map_err(|e| RelayError::InvalidUrl(format!("{}: {}", relay_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(RelayError::InvalidUrl(relay_url.to_string()));
        }

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `{base}/exchange` or `{base}/exchange/{key_id}`, with `key_id`
    /// percent-encoded as a single path segment.
    fn exchange_url(&self, key_id: Option<&str>) -> Result<Url, RelayError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| RelayError::InvalidUrl(self.base_url.to_string()))?;
            segments.pop_if_empty().push("exchange");
            if let Some(key_id) = key_id {
                segments.push(key_id);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl RelayTransport for HttpRelayClient {
    async fn fetch_message(&self, key_id: &str) -> Result<Option<String>, RelayError> {
        let url = self.exchange_url(Some(key_id))?;
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RelayError::Network(e.to_string()))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_else(|_| "unknown".to_string());
            tracing::debug!("Relay GET /exchange failed {}: {}", status, body);
            return Err(RelayError::UnexpectedStatus(status.as_u16()));
        }

        let body: ExchangeResult = resp
            .json()
            .await
            .map_err(|e| RelayError::InvalidResponse(format!("Invalid exchange body: {}", e)))?;

        Ok(Some(body.encrypted_message))
    }

    async fn post_message(&self, key_id: &str, encrypted_message: &str) -> Result<(), RelayError> {
        let url = self.exchange_url(None)?;
        let request = ExchangeRequest {
            key_id: key_id.to_string(),
            encrypted_message: encrypted_message.to_string(),
        };

        let resp = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RelayError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_else(|_| "unknown".to_string());
            tracing::debug!("Relay POST /exchange failed {}: {}", status, body);
            return Err(RelayError::UnexpectedStatus(status.as_u16()));
        }

        Ok(())
    }
}
