//! Flat file-backed vector store
//!
//! Every vector lives in memory and is written to one JSON document on each
//! mutation:
//!
//! ```text
//! ~/.experiential/vectors.json
//! { "embeddings": { "src-...": { "vector": [...], "metadata": {...} } } }
//! ```
//!
//! Search compares the query against every admitted entry. The first stored
//! vector fixes the dimensionality of the store.

use super::{cosine_similarity, Metadata, ScoredEntry, VectorQuery, VectorStore};
use crate::error::{Error, Result};
use crate::persist::{ensure_parent, load_json, save_json};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FlatEntry {
    vector: Vec<f32>,
    #[serde(default)]
    metadata: Metadata,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct FlatDocument {
    #[serde(default)]
    embeddings: BTreeMap<String, FlatEntry>,
}

impl FlatDocument {
    /// Width shared by stored vectors, ignoring `except`.
    fn dimensions_except(&self, except: &str) -> Option<usize> {
        self.embeddings
            .iter()
            .find(|(id, _)| id.as_str() != except)
            .map(|(_, e)| e.vector.len())
    }
}

/// In-process vector store with brute-force cosine search
pub struct FlatVectorStore {
    path: Option<PathBuf>,
    state: Arc<RwLock<FlatDocument>>,
}

impl FlatVectorStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        ensure_parent(&path).await?;
        let document: FlatDocument = load_json(&path).await?.unwrap_or_default();
        tracing::debug!(
            "Loaded {} vectors from {}",
            document.embeddings.len(),
            path.display()
        );
        Ok(Self {
            path: Some(path),
            state: Arc::new(RwLock::new(document)),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Arc::new(RwLock::new(FlatDocument::default())),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Dimensionality fixed by the stored vectors, if any.
    pub async fn dimensions(&self) -> Option<usize> {
        self.state
            .read()
            .await
            .embeddings
            .values()
            .next()
            .map(|e| e.vector.len())
    }

    async fn persist(&self, document: &FlatDocument) -> Result<()> {
        match &self.path {
            Some(path) => save_json(path, document).await,
            None => Ok(()),
        }
    }
}

#[async_trait]
impl VectorStore for FlatVectorStore {
    async fn upsert(&self, id: &str, vector: Vec<f32>, metadata: Metadata) -> Result<()> {
        if vector.is_empty() {
            return Err(Error::Validation("vector must not be empty".to_string()));
        }

        let mut state = self.state.write().await;
        if let Some(expected) = state.dimensions_except(id) {
            if expected != vector.len() {
                return Err(Error::Schema {
                    expected,
                    actual: vector.len(),
                });
            }
        }

        let mut next = state.clone();
        next.embeddings
            .insert(id.to_string(), FlatEntry { vector, metadata });
        self.persist(&next).await?;
        *state = next;
        Ok(())
    }

    async fn search(&self, vector: &[f32], query: &VectorQuery) -> Result<Vec<ScoredEntry>> {
        let state = self.state.read().await;

        let mut hits = Vec::new();
        for (id, entry) in state.embeddings.iter().filter(|(id, _)| query.admits(id)) {
            if entry.vector.len() != vector.len() {
                return Err(Error::Schema {
                    expected: entry.vector.len(),
                    actual: vector.len(),
                });
            }
            hits.push(ScoredEntry {
                id: id.clone(),
                score: cosine_similarity(&entry.vector, vector)?,
                metadata: entry.metadata.clone(),
            });
        }

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        if let Some(limit) = query.limit {
            hits.truncate(limit);
        }
        Ok(hits)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        if !state.embeddings.contains_key(id) {
            return Ok(false);
        }
        let mut next = state.clone();
        next.embeddings.remove(id);
        self.persist(&next).await?;
        *state = next;
        Ok(true)
    }

    async fn get(&self, id: &str) -> Result<Option<Vec<f32>>> {
        Ok(self
            .state
            .read()
            .await
            .embeddings
            .get(id)
            .map(|e| e.vector.clone()))
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "flat"
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.state.read().await.embeddings.len())
    }
}
