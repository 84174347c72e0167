// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Hub transport boundary.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use tracing::debug;

use crate::config::AgentConfig;
use crate::error::HubError;
use crate::keys::KeySet;

use super::payloads::{StartupPayload, SyncPayload};

/// Operations the sync engine performs against the hub.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HubTransport: Send + Sync {
    /// Send the one-time startup handshake.
    async fn send_startup(&self, payload: &StartupPayload) -> Result<(), HubError>;

    /// Send drained counters.
    async fn send_sync(&self, payload: &SyncPayload) -> Result<(), HubError>;

    /// Upload one gzip-compressed request log file.
    async fn send_log(&self, uuid: &str, body: Vec<u8>) -> Result<(), HubError>;

    /// Fetch the complete key set.
    async fn fetch_keys(&self) -> Result<KeySet, HubError>;
}

/// HTTP transport to the hub.
pub struct HubClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HubClient {
    /// Create a client for `{hub_url}/v2/{client_id}/{env}`.
    pub fn new(config: &AgentConfig) -> Result<Self, HubError> {
        let timeout = config.sync.request_timeout();
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("apiscope/{}", crate::VERSION))
            .build()?;

        Ok(Self {
            client,
            base_url: Self::base_url(config),
            timeout,
        })
    }

    pub fn base_url(config: &AgentConfig) -> String {
        format!(
            "{}/v2/{}/{}",
            config.hub_url.trim_end_matches('/'),
            config.client_id.trim(),
            config.env
        )
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint)
    }

    async fn post_json<T: Serialize + ?Sized>(&self, endpoint: &str, body: &T) -> Result<(), HubError> {
        let body = serde_json::to_vec(body)?;
        let request = self
            .client
            .post(self.url(endpoint))
            .header("Content-Type", "application/json")
            .body(body);
        self.execute(endpoint, request).await.map(|_| ())
    }

    async fn execute(&self, endpoint: &str, request: RequestBuilder) -> Result<reqwest::Response, HubError> {
        let response = request.send().await.map_err(|e| self.map_error(e))?;
        let status = response.status();
        debug!(endpoint, status = status.as_u16(), "Hub responded");

        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::PAYMENT_REQUIRED {
            return Err(HubError::PaymentRequired);
        }

        let body = response.text().await.unwrap_or_default();
        let message = if body.trim().is_empty() {
            format!("{} returned {}", endpoint, status)
        } else {
            format!("{} returned {}: {}", endpoint, status, body.trim())
        };
        Err(HubError::api(message, status.as_u16()))
    }

    fn map_error(&self, err: reqwest::Error) -> HubError {
        if err.is_timeout() {
            HubError::Timeout(self.timeout.as_millis() as u64)
        } else {
            err.into()
        }
    }
}

#[async_trait]
impl HubTransport for HubClient {
    async fn send_startup(&self, payload: &StartupPayload) -> Result<(), HubError> {
        self.post_json("startup", payload).await
    }

    async fn send_sync(&self, payload: &SyncPayload) -> Result<(), HubError> {
        self.post_json("sync", payload).await
    }

    async fn send_log(&self, uuid: &str, body: Vec<u8>) -> Result<(), HubError> {
        let request = self
            .client
            .post(self.url("log"))
            .query(&[("uuid", uuid)])
            .header("Content-Type", "application/gzip")
            .body(body);
        self.execute("log", request).await.map(|_| ())
    }

    async fn fetch_keys(&self) -> Result<KeySet, HubError> {
        let response = self.execute("keys", self.client.get(self.url("keys"))).await?;
        let body = response.text().await.map_err(|e| self.map_error(e))?;
        serde_json::from_str(&body).map_err(|e| HubError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLIENT_ID: &str = "76b5cb91-a0a4-4ea0-a894-57d2b9fcb2c9";

    #[test]
    fn test_base_url() {
        let config = AgentConfig::new(CLIENT_ID, "prod").with_hub_url("https://hub.example.com/");
        assert_eq!(
            HubClient::base_url(&config),
            format!("https://hub.example.com/v2/{}/prod", CLIENT_ID)
        );
    }

    #[test]
    fn test_endpoint_urls() {
        let config = AgentConfig::new(CLIENT_ID, "dev");
        let client = HubClient::new(&config).unwrap();
        assert!(client.url("sync").ends_with(&format!("/v2/{}/dev/sync", CLIENT_ID)));
        assert!(client.url("sync").starts_with(crate::config::DEFAULT_HUB_URL));
    }

    #[tokio::test]
    async fn test_unreachable_hub_is_network_error() {
        let config = AgentConfig::new(CLIENT_ID, "dev").with_hub_url("http://127.0.0.1:9");
        let client = HubClient::new(&config).unwrap();

        let err = client.fetch_keys().await.unwrap_err();
        assert!(err.is_retryable());
    }
}
