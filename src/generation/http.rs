//! HTTP text generator
//!
//! Posts a [`GenerationRequest`] as JSON and exposes the response body as a
//! [`ChunkStream`]. Streamed and complete bodies go through the same path;
//! a complete body is simply a stream that yields everything at once.

use super::{ChunkStream, GenerationRequest, TextGenerator};
use crate::config::GenerationConfig;
use crate::error::{ParleyError, Result};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::time::Duration;

/// Generator backed by a remote HTTP endpoint
#[derive(Debug, Clone)]
pub struct HttpGenerator {
    client: reqwest::Client,
    endpoint: url::Url,
    api_key: Option<String>,
    headers: HashMap<String, String>,
}

impl HttpGenerator {
    /// Creates a generator from the generation configuration
    ///
    /// No network I/O happens here.
    ///
    /// # Errors
    ///
    /// Returns `ParleyError::Config` if the endpoint is not a valid URL, or
    /// an HTTP error if the client cannot be built.
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let endpoint = url::Url::parse(&config.endpoint).map_err(|e| {
            ParleyError::Config(format!("Invalid generation endpoint {}: {}", config.endpoint, e))
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(ParleyError::from)?;

        Ok(Self {
            client,
            endpoint,
            api_key: config.api_key.clone(),
            headers: config.headers.clone(),
        })
    }

    /// Endpoint requests are sent to
    pub fn endpoint(&self) -> &url::Url {
        &self.endpoint
    }
}

#[async_trait]
impl TextGenerator for HttpGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<ChunkStream> {
        let mut req = self
            .client
            .post(self.endpoint.clone())
            .header("Accept", "text/event-stream, application/json, text/plain")
            .json(request);

        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        for (k, v) in &self.headers {
            req = req.header(k.as_str(), v.as_str());
        }

        tracing::debug!(
            endpoint = %self.endpoint,
            history = request.history.len(),
            streaming = request.streaming,
            "Sending generation request"
        );

        let response = req
            .send()
            .await
            .map_err(|e| ParleyError::Generation(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%status, "Generation endpoint rejected request");
            return Err(ParleyError::Generation(format!("HTTP {}: {}", status, body)).into());
        }

        let stream = response.bytes_stream().map(|item| {
            item.map_err(|e| {
                anyhow::Error::from(ParleyError::Generation(format!(
                    "Failed to read response stream: {}",
                    e
                )))
            })
        });

        Ok(Box::pin(stream))
    }
}
