//! Pluggable embedding provider interface
//!
//! Every text→vector backend implements `EmbeddingProvider`. The registry
//! holds exactly one of them for the life of the process.

use crate::error::{Error, Result};
use async_trait::async_trait;

/// Name reported by the no-op provider.
pub const NONE_PROVIDER_NAME: &str = "none";

/// Pluggable text embedding backend.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Prepare the backend (load a model, check credentials). Safe to call
    /// more than once.
    async fn initialize(&self) -> Result<()>;

    /// Embed non-empty text.
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>>;

    /// Length of the vectors this provider produces.
    fn dimensions(&self) -> usize;

    /// Short provider name used in logs and diagnostics.
    fn name(&self) -> &str;

    /// Cheap probe. A `true` here is a hint, not a guarantee.
    async fn is_available(&self) -> bool;
}

/// Reject blank input before any provider work.
pub(crate) fn require_text(text: &str) -> Result<&str> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation(
            "embedding input must not be empty".to_string(),
        ));
    }
    Ok(trimmed)
}

/// Provider that produces no semantic signal.
///
/// Always available; every embedding is the fixed one-dimensional zero
/// vector, which callers treat as "no signal" rather than a real vector.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoneProvider;

impl NoneProvider {
    pub fn sentinel() -> Vec<f32> {
        vec![0.0]
    }
}

#[async_trait]
impl EmbeddingProvider for NoneProvider {
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        require_text(text)?;
        Ok(Self::sentinel())
    }

    fn dimensions(&self) -> usize {
        1
    }

    fn name(&self) -> &str {
        NONE_PROVIDER_NAME
    }

    async fn is_available(&self) -> bool {
        true
    }
}
