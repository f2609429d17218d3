//! Remote embeddings API provider
//!
//! Calls an OpenAI-compatible `POST /v1/embeddings` endpoint. Without an API
//! key the provider reports itself unavailable and never makes a request.

use super::provider::{require_text, EmbeddingProvider};
use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

/// OpenAI-compatible embedding provider
pub struct RemoteApiProvider {
    client: Client,
    api_key: Option<String>,
    model: String,
    dimensions: usize,
    base_url: String,
}

impl RemoteApiProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
            model: config.resolved_model(),
            dimensions: config.resolved_dimensions(),
            base_url: config.resolved_base_url(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Only the text-embedding-3 family accepts a `dimensions` parameter.
    fn supports_dimension_parameter(&self) -> bool {
        self.model.starts_with("text-embedding-3")
    }

    async fn request(&self, text: &str) -> Result<Vec<f32>> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            Error::ProviderUnavailable("remote provider has no API key".to_string())
        })?;

        let mut body = json!({
            "model": self.model,
            "input": text,
        });
        if self.supports_dimension_parameter() {
            body["dimensions"] = json!(self.dimensions);
        }

        let url = format!("{}/v1/embeddings", self.base_url);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::ProviderUnavailable(format!("{} unreachable: {}", url, e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::ProviderUnavailable(format!(
                "embeddings API {} - {}",
                status, text
            )));
        }

        let parsed: EmbeddingsResponse = resp
            .json()
            .await
            .map_err(|e| Error::ProviderUnavailable(format!("bad embeddings response: {}", e)))?;

        let vector = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                Error::ProviderUnavailable("embeddings response had no vector".to_string())
            })?;

        if vector.len() != self.dimensions {
            return Err(Error::Schema {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }
        Ok(vector)
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteApiProvider {
    async fn initialize(&self) -> Result<()> {
        if self.api_key.is_none() {
            return Err(Error::ProviderUnavailable(
                "remote provider has no API key".to_string(),
            ));
        }
        Ok(())
    }

    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let text = require_text(text)?;
        self.request(text).await
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "remote"
    }

    async fn is_available(&self) -> bool {
        if self.api_key.is_none() {
            return false;
        }
        match self.request("ping").await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!("Remote embedding probe failed: {}", e);
                false
            }
        }
    }
}
