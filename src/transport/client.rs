use super::Transport;
use crate::models::DEFAULT_BASE_URL;
use crate::request::RequestSpec;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use std::time::Duration;

/// reqwest-backed transport for the Kling REST API.
pub struct KlingHttpClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl KlingHttpClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::new_with_client(client, timeout))
    }

    pub fn new_with_client(client: Client, timeout: Duration) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Transport for KlingHttpClient {
    async fn execute(&self, request: RequestSpec, bearer: &str) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.base_url, request.path);
        tracing::debug!(method = %request.method, path = %request.path, "Sending request to Kling API");

        let mut builder = self
            .client
            .request(request.method.into(), &url)
            .timeout(self.timeout)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .bearer_auth(bearer);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            tracing::error!("Failed to send request to Kling API: {}", e);
            e
        })?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::error!("Kling API error (status {}): {}", status, body);
            return Err(Error::Transport(format!("status {}: {}", status, body)));
        }

        if body.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!("Failed to parse Kling API response: {}\nBody: {}", e, body);
            Error::Transport(format!("unparseable response: {}", e))
        })
    }
}
