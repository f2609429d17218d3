//! Configuration-driven provider selection
//!
//! Selection runs once per process:
//!
//! ```text
//! Unconfigured ──select──▶ Probing ──available──▶ Ready
//!                                 └─unavailable─▶ Fallback (NoneProvider)
//! ```
//!
//! A registry never changes provider after selection. Reconfiguring means
//! building a new registry.

use super::local::LocalModelProvider;
use super::provider::{EmbeddingProvider, NoneProvider};
use super::remote::RemoteApiProvider;
use crate::config::{EmbeddingConfig, ProviderKind};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Selection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryState {
    Unconfigured,
    Probing,
    Ready,
    Fallback,
}

impl std::fmt::Display for RegistryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unconfigured => write!(f, "unconfigured"),
            Self::Probing => write!(f, "probing"),
            Self::Ready => write!(f, "ready"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

/// Holds the single active embedding provider.
#[derive(Clone)]
pub struct EmbeddingRegistry {
    requested: ProviderKind,
    state: RegistryState,
    provider: Arc<dyn EmbeddingProvider>,
    fallback_reason: Option<String>,
}

impl std::fmt::Debug for EmbeddingRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingRegistry")
            .field("requested", &self.requested)
            .field("state", &self.state)
            .field("provider", &self.provider.name())
            .field("fallback_reason", &self.fallback_reason)
            .finish()
    }
}

impl EmbeddingRegistry {
    /// Registry that has not selected anything; serves the no-op provider.
    pub fn unconfigured() -> Self {
        Self {
            requested: ProviderKind::None,
            state: RegistryState::Unconfigured,
            provider: Arc::new(NoneProvider),
            fallback_reason: None,
        }
    }

    /// Build and probe the configured provider.
    ///
    /// Never fails on an unreachable provider: the registry falls back to
    /// `NoneProvider` and records why. Only construction errors (e.g. an
    /// HTTP client that cannot be built) are returned.
    pub async fn select(config: &EmbeddingConfig) -> Result<Self> {
        let probe_timeout = Duration::from_secs(config.probe_timeout_secs);
        let provider: Arc<dyn EmbeddingProvider> = match config.provider {
            ProviderKind::None => {
                tracing::info!("No embedding provider configured; semantic search disabled");
                return Ok(Self {
                    requested: ProviderKind::None,
                    state: RegistryState::Ready,
                    provider: Arc::new(NoneProvider),
                    fallback_reason: None,
                });
            }
            ProviderKind::Remote => Arc::new(RemoteApiProvider::new(config)?),
            ProviderKind::Local => Arc::new(LocalModelProvider::new(config)?),
        };
        Ok(Self::with_provider(config.provider, provider, probe_timeout).await)
    }

    /// Probe an already-built provider and settle the registry state.
    pub async fn with_provider(
        requested: ProviderKind,
        provider: Arc<dyn EmbeddingProvider>,
        probe_timeout: Duration,
    ) -> Self {
        let mut registry = Self {
            requested,
            state: RegistryState::Probing,
            provider,
            fallback_reason: None,
        };
        tracing::debug!(
            "Probing embedding provider '{}' (timeout {:?})",
            registry.provider.name(),
            probe_timeout
        );

        let reason = match tokio::time::timeout(probe_timeout, registry.provider.is_available())
            .await
        {
            Ok(true) => None,
            Ok(false) => Some(format!(
                "provider '{}' reported unavailable",
                registry.provider.name()
            )),
            Err(_) => Some(format!(
                "provider '{}' probe timed out after {:?}",
                registry.provider.name(),
                probe_timeout
            )),
        };

        match reason {
            None => {
                tracing::info!(
                    "Embedding provider '{}' ready ({} dimensions)",
                    registry.provider.name(),
                    registry.provider.dimensions()
                );
                registry.state = RegistryState::Ready;
            }
            Some(reason) => {
                tracing::warn!("{}; falling back to no-op embeddings", reason);
                registry.provider = Arc::new(NoneProvider);
                registry.state = RegistryState::Fallback;
                registry.fallback_reason = Some(reason);
            }
        }
        registry
    }

    pub fn provider(&self) -> Arc<dyn EmbeddingProvider> {
        self.provider.clone()
    }

    /// Name of the active provider (`"none"` after fallback).
    pub fn name(&self) -> &str {
        self.provider.name()
    }

    pub fn requested(&self) -> ProviderKind {
        self.requested
    }

    pub fn state(&self) -> RegistryState {
        self.state
    }

    pub fn fallback_reason(&self) -> Option<&str> {
        self.fallback_reason.as_deref()
    }

    pub fn is_fallback(&self) -> bool {
        self.state == RegistryState::Fallback
    }

    /// Whether embeddings from this registry carry any semantic signal.
    pub fn has_signal(&self) -> bool {
        self.state == RegistryState::Ready && self.requested != ProviderKind::None
    }

    pub fn dimensions(&self) -> usize {
        self.provider.dimensions()
    }

    pub async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        self.provider.generate_embedding(text).await
    }
}

impl Default for EmbeddingRegistry {
    fn default() -> Self {
        Self::unconfigured()
    }
}
