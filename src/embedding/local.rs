//! Local model provider (Ollama-compatible HTTP runtime)
//!
//! The model is loaded lazily on first use: `initialize` checks that the
//! runtime is reachable, pulls the model when it is missing, and learns the
//! vector width from a probe embedding. The load happens once per process;
//! concurrent callers wait on the same attempt.

use super::provider::{require_text, EmbeddingProvider};
use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::OnceCell;

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct LegacyEmbedResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

/// Embedding provider backed by a locally running model server.
pub struct LocalModelProvider {
    client: Client,
    base_url: String,
    model: String,
    /// Width fixed by configuration; `None` means learn it from the model.
    pinned_dimensions: Option<usize>,
    dimensions: AtomicUsize,
    loaded: OnceCell<std::result::Result<(), String>>,
}

impl LocalModelProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.resolved_base_url(),
            model: config.resolved_model(),
            pinned_dimensions: config.dimensions,
            dimensions: AtomicUsize::new(config.resolved_dimensions()),
            loaded: OnceCell::new(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn model_matches(&self, name: &str) -> bool {
        let wanted = self.model.split(':').next().unwrap_or(&self.model);
        name == self.model || name.split(':').next() == Some(wanted)
    }

    async fn has_model(&self) -> Result<bool> {
        let url = format!("{}/api/tags", self.base_url);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::ProviderUnavailable(format!("{} unreachable: {}", url, e)))?;
        if !resp.status().is_success() {
            return Err(Error::ProviderUnavailable(format!(
                "model server returned {}",
                resp.status()
            )));
        }
        let tags: TagsResponse = resp
            .json()
            .await
            .map_err(|e| Error::ProviderUnavailable(format!("bad tags response: {}", e)))?;
        Ok(tags.models.iter().any(|m| self.model_matches(&m.name)))
    }

    async fn pull_model(&self) -> Result<()> {
        tracing::info!("Pulling embedding model '{}'", self.model);
        let url = format!("{}/api/pull", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&json!({ "name": self.model, "stream": false }))
            .timeout(Duration::from_secs(600))
            .send()
            .await
            .map_err(|e| Error::ProviderUnavailable(format!("model pull failed: {}", e)))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::ProviderUnavailable(format!(
                "model pull {} - {}",
                status, text
            )));
        }
        Ok(())
    }

    async fn load(&self) -> Result<()> {
        if !self.has_model().await? {
            self.pull_model().await?;
        }
        let probe = self.embed_raw("ping").await?;
        match self.pinned_dimensions {
            Some(expected) if expected != probe.len() => {
                return Err(Error::Schema {
                    expected,
                    actual: probe.len(),
                });
            }
            Some(_) => {}
            None => self.dimensions.store(probe.len(), Ordering::SeqCst),
        }
        tracing::info!(
            "Local embedding model '{}' ready ({} dimensions)",
            self.model,
            probe.len()
        );
        Ok(())
    }

    async fn ensure_loaded(&self) -> Result<()> {
        let outcome = self
            .loaded
            .get_or_init(|| async { self.load().await.map_err(|e| e.to_string()) })
            .await;
        outcome.clone().map_err(Error::ProviderUnavailable)
    }

    /// Embed without the load gate. Tries the batch endpoint first and falls
    /// back to the older single-prompt one.
    async fn embed_raw(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embed", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&json!({ "model": self.model, "input": text }))
            .send()
            .await
            .map_err(|e| Error::ProviderUnavailable(format!("{} unreachable: {}", url, e)))?;

        if resp.status().is_success() {
            let parsed: EmbedResponse = resp
                .json()
                .await
                .map_err(|e| Error::ProviderUnavailable(format!("bad embed response: {}", e)))?;
            if let Some(vector) = parsed.embeddings.into_iter().next().filter(|v| !v.is_empty()) {
                return Ok(vector);
            }
        }

        let url = format!("{}/api/embeddings", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&json!({ "model": self.model, "prompt": text }))
            .send()
            .await
            .map_err(|e| Error::ProviderUnavailable(format!("{} unreachable: {}", url, e)))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::ProviderUnavailable(format!(
                "model server {} - {}",
                status, text
            )));
        }
        let parsed: LegacyEmbedResponse = resp
            .json()
            .await
            .map_err(|e| Error::ProviderUnavailable(format!("bad embed response: {}", e)))?;
        if parsed.embedding.is_empty() {
            return Err(Error::ProviderUnavailable(
                "model server returned an empty vector".to_string(),
            ));
        }
        Ok(parsed.embedding)
    }
}

#[async_trait]
impl EmbeddingProvider for LocalModelProvider {
    async fn initialize(&self) -> Result<()> {
        self.ensure_loaded().await
    }

    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let text = require_text(text)?;
        self.ensure_loaded().await?;
        let vector = self.embed_raw(text).await?;
        let expected = self.dimensions();
        if vector.len() != expected {
            return Err(Error::Schema {
                expected,
                actual: vector.len(),
            });
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dimensions.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "local"
    }

    async fn is_available(&self) -> bool {
        match self.ensure_loaded().await {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!("Local embedding model unavailable: {}", e);
                false
            }
        }
    }
}
