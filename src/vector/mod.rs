//! Vector storage
//!
//! Callers always address entries by record id. Backends that need their
//! own id shape map to and from it internally.
//!
//! - `FlatVectorStore`: in-process map, one JSON document on disk,
//!   brute-force cosine search
//! - `QdrantVectorStore`: remote index over the Qdrant REST API with native
//!   candidate filtering

pub mod flat;
pub mod qdrant;
pub mod similarity;

pub use flat::FlatVectorStore;
pub use qdrant::QdrantVectorStore;
pub use similarity::cosine_similarity;

use crate::config::VectorStoreConfig;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

/// Free-form metadata stored beside a vector
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// One ranked search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredEntry {
    pub id: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Search parameters
#[derive(Debug, Clone, Default)]
pub struct VectorQuery {
    /// Restrict results to these record ids
    pub candidates: Option<HashSet<String>>,
    /// Maximum number of hits (all matches when unset)
    pub limit: Option<usize>,
}

impl VectorQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn candidates(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.candidates = Some(ids.into_iter().collect());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub(crate) fn admits(&self, id: &str) -> bool {
        self.candidates.as_ref().map_or(true, |c| c.contains(id))
    }
}

/// Uniform interface over vector backends
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace the vector for `id`.
    async fn upsert(&self, id: &str, vector: Vec<f32>, metadata: Metadata) -> Result<()>;

    /// Rank stored vectors against `vector`, highest similarity first.
    async fn search(&self, vector: &[f32], query: &VectorQuery) -> Result<Vec<ScoredEntry>>;

    /// Remove the vector for `id`. Returns whether an entry existed.
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Fetch the stored vector for `id`.
    async fn get(&self, id: &str) -> Result<Option<Vec<f32>>>;

    async fn is_available(&self) -> bool;

    /// Whether `search` honours `VectorQuery::candidates` natively.
    fn supports_filtering(&self) -> bool {
        true
    }

    fn name(&self) -> &str;

    /// Number of stored vectors.
    async fn len(&self) -> Result<usize>;
}

/// Build the configured backend.
pub async fn open_store(
    config: &VectorStoreConfig,
    data_dir: &Path,
) -> Result<Arc<dyn VectorStore>> {
    match config {
        VectorStoreConfig::Flat { .. } => {
            let path = config
                .flat_path(data_dir)
                .unwrap_or_else(|| data_dir.join("vectors.json"));
            Ok(Arc::new(FlatVectorStore::open(path).await?))
        }
        VectorStoreConfig::Qdrant {
            url,
            api_key,
            collection,
            timeout_secs,
        } => Ok(Arc::new(QdrantVectorStore::new(
            url,
            api_key.clone(),
            collection,
            *timeout_secs,
        )?)),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::Error;
    use tempfile::TempDir;

    /// Store whose every call fails as if the network were down.
    pub(crate) struct DownStore;

    #[async_trait]
    impl VectorStore for DownStore {
        async fn upsert(&self, _id: &str, _vector: Vec<f32>, _metadata: Metadata) -> Result<()> {
            Err(Error::StoreUnavailable("network down".into()))
        }

        async fn search(&self, _vector: &[f32], _query: &VectorQuery) -> Result<Vec<ScoredEntry>> {
            Err(Error::StoreUnavailable("network down".into()))
        }

        async fn delete(&self, _id: &str) -> Result<bool> {
            Err(Error::StoreUnavailable("network down".into()))
        }

        async fn get(&self, _id: &str) -> Result<Option<Vec<f32>>> {
            Err(Error::StoreUnavailable("network down".into()))
        }

        async fn is_available(&self) -> bool {
            false
        }

        fn name(&self) -> &str {
            "down"
        }

        async fn len(&self) -> Result<usize> {
            Err(Error::StoreUnavailable("network down".into()))
        }
    }

    #[test]
    fn test_query_admits_all_without_candidates() {
        let query = VectorQuery::new().limit(3);
        assert!(query.admits("anything"));
        let query = VectorQuery::new().candidates(vec!["a".to_string()]);
        assert!(query.admits("a"));
        assert!(!query.admits("b"));
    }

    #[tokio::test]
    async fn test_open_default_flat_store() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&VectorStoreConfig::default(), dir.path())
            .await
            .unwrap();
        assert_eq!(store.name(), "flat");
        store.upsert("a", vec![1.0, 0.0], Metadata::new()).await.unwrap();
        assert!(dir.path().join("vectors.json").exists());
    }

    #[tokio::test]
    async fn test_open_qdrant_store() {
        let config = VectorStoreConfig::Qdrant {
            url: "http://127.0.0.1:9".to_string(),
            api_key: None,
            collection: "test".to_string(),
            timeout_secs: 1,
        };
        let store = open_store(&config, Path::new("/tmp")).await.unwrap();
        assert_eq!(store.name(), "qdrant");
        assert!(store.supports_filtering());
    }
}
